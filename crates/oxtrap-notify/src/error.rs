/// Errors that can occur while opening receiver sessions or delivering traps.
///
/// All variants are scoped to a single receiver: the dispatcher records
/// them per receiver and carries on with the rest of the list.
///
/// # Examples
///
/// ```rust
/// use oxtrap_notify::error::DispatchError;
///
/// let err = DispatchError::ReceiverNotFound("r9".to_string());
/// assert!(err.to_string().contains("r9"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// No open session exists for the receiver id.
    #[error("Notify: receiver '{0}' not found")]
    ReceiverNotFound(String),

    /// The receiver's host name did not resolve to any address.
    #[error("Notify: receiver '{receiver}' endpoint {endpoint} did not resolve")]
    Resolve { receiver: String, endpoint: String },

    /// Opening the receiver's socket failed.
    #[error("Notify: failed to open session for receiver '{receiver}': {source}")]
    SessionOpen {
        receiver: String,
        #[source]
        source: std::io::Error,
    },

    /// The trap could not be encoded.
    #[error("Notify: failed to encode trap for receiver '{receiver}': {source}")]
    Encode {
        receiver: String,
        #[source]
        source: crate::pdu::PduError,
    },

    /// The send on an open session failed.
    #[error("Notify: failed to send trap to receiver '{receiver}': {source}")]
    Transport {
        receiver: String,
        #[source]
        source: std::io::Error,
    },
}

impl DispatchError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, DispatchError::ReceiverNotFound(_))
    }
}

/// Convenience `Result` alias for dispatch operations.
pub type Result<T> = std::result::Result<T, DispatchError>;
