use crate::{SessionOpener, TrapSession};
use oxtrap_common::types::Receiver;
use std::collections::HashMap;

/// Open receiver sessions keyed by receiver id.
///
/// Populated once at startup and only read afterwards; a receiver whose
/// session failed to open stays absent until the process restarts.
///
/// # Examples
///
/// ```
/// use oxtrap_notify::registry::ReceiverRegistry;
///
/// let mut registry = ReceiverRegistry::new();
/// assert!(registry.resolve("r1").is_none());
/// assert_eq!(registry.close_all(), 0);
/// ```
pub struct ReceiverRegistry {
    sessions: HashMap<String, Box<dyn TrapSession>>,
}

impl ReceiverRegistry {
    pub fn new() -> Self {
        Self {
            sessions: HashMap::new(),
        }
    }

    /// Opens one session per receiver. Failures are logged and skipped so
    /// the remaining receivers still open.
    pub async fn open(receivers: &[Receiver], opener: &dyn SessionOpener) -> Self {
        let mut registry = Self::new();
        for receiver in receivers {
            match opener.open(receiver).await {
                Ok(session) => {
                    tracing::info!(
                        receiver = %receiver.id,
                        endpoint = %session.endpoint(),
                        "Receiver session opened"
                    );
                    registry.insert(receiver.id.clone(), session);
                }
                Err(e) => {
                    tracing::error!(
                        receiver = %receiver.id,
                        endpoint = %receiver.endpoint(),
                        error = %e,
                        "Failed to open receiver session, receiver disabled until restart"
                    );
                }
            }
        }
        registry
    }

    /// Registers `session` under the configured receiver id.
    pub fn insert(&mut self, id: String, session: Box<dyn TrapSession>) {
        if session.receiver_id() != id {
            tracing::debug!(
                receiver = %id,
                session_id = session.receiver_id(),
                "Session reports a different receiver id"
            );
        }
        if self.sessions.insert(id.clone(), session).is_some() {
            tracing::warn!(receiver = %id, "Replaced existing receiver session");
        }
    }

    pub fn resolve(&self, id: &str) -> Option<&dyn TrapSession> {
        self.sessions.get(id).map(|s| s.as_ref())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Drops every session and returns how many were open.
    pub fn close_all(&mut self) -> usize {
        let closed = self.sessions.len();
        for (id, _session) in self.sessions.drain() {
            tracing::info!(receiver = %id, "Closed receiver session");
        }
        closed
    }
}

impl Default for ReceiverRegistry {
    fn default() -> Self {
        Self::new()
    }
}
