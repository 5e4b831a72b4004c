//! Trap delivery to configured receivers.
//!
//! A [`SessionOpener`] opens one [`TrapSession`] per receiver at startup.
//! The sessions are held in a [`registry::ReceiverRegistry`] and the
//! [`dispatcher::TrapDispatcher`] fans each trap out to the receivers a rule
//! names, recording a per-receiver outcome. The built-in transport is
//! SNMPv2c over UDP ([`sessions::udp`]).

pub mod dispatcher;
pub mod error;
pub mod pdu;
pub mod registry;
pub mod sessions;


use async_trait::async_trait;
use oxtrap_common::types::Receiver;

pub use dispatcher::{DispatchReport, ReceiverOutcome, TrapDispatcher};
pub use error::DispatchError;
pub use pdu::TrapMessage;
pub use registry::ReceiverRegistry;

/// An open session to a single trap receiver.
///
/// Sessions are shared by every rule task, so `send` takes `&self`.
/// Dropping a session releases its socket.
#[async_trait]
pub trait TrapSession: Send + Sync {
    /// Sends one notification to this receiver.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Encode`] or [`DispatchError::Transport`]
    /// when the trap could not be handed to the network.
    async fn send(&self, message: &TrapMessage) -> error::Result<()>;

    /// Receiver id this session belongs to.
    fn receiver_id(&self) -> &str;

    /// Human-readable destination, used in logs.
    fn endpoint(&self) -> String;
}

/// Creates [`TrapSession`]s for configured receivers.
#[async_trait]
pub trait SessionOpener: Send + Sync {
    /// Opens the session for `receiver`.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Resolve`] or [`DispatchError::SessionOpen`]
    /// when the receiver cannot be reached locally.
    async fn open(&self, receiver: &Receiver) -> error::Result<Box<dyn TrapSession>>;
}
