use crate::error::DispatchError;
use crate::pdu::TrapMessage;
use crate::registry::ReceiverRegistry;
use oxtrap_common::types::{Severity, TrapPayload, TrapValue};
use oxtrap_common::Oid;

/// Delivery result for one receiver of one trap.
#[derive(Debug)]
pub struct ReceiverOutcome {
    pub receiver_id: String,
    pub result: Result<(), DispatchError>,
}

impl ReceiverOutcome {
    pub fn is_delivered(&self) -> bool {
        self.result.is_ok()
    }
}

/// Per-receiver outcomes of a single trap, in the order the receivers
/// were listed.
#[derive(Debug)]
pub struct DispatchReport {
    pub oid: Oid,
    pub outcomes: Vec<ReceiverOutcome>,
}

impl DispatchReport {
    pub fn delivered(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_delivered()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.delivered()
    }

    pub fn all_delivered(&self) -> bool {
        self.outcomes.iter().all(ReceiverOutcome::is_delivered)
    }

    pub fn outcome(&self, receiver_id: &str) -> Option<&ReceiverOutcome> {
        self.outcomes.iter().find(|o| o.receiver_id == receiver_id)
    }
}

/// Sends traps through the sessions of a [`ReceiverRegistry`].
pub struct TrapDispatcher {
    registry: ReceiverRegistry,
}

impl TrapDispatcher {
    pub fn new(registry: ReceiverRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ReceiverRegistry {
        &self.registry
    }

    /// Builds a payload stamped with the current time and sends it.
    pub async fn send_trap(
        &self,
        receiver_ids: &[String],
        oid: &Oid,
        value: TrapValue,
        severity: Option<Severity>,
    ) -> DispatchReport {
        let payload = TrapPayload::new(oid.clone(), value, severity);
        self.send_payload(receiver_ids, &payload).await
    }

    /// Sends `payload` to each receiver in turn. A missing or failing
    /// receiver is recorded and the next one is tried.
    pub async fn send_payload(&self, receiver_ids: &[String], payload: &TrapPayload) -> DispatchReport {
        let message = TrapMessage::from_payload(payload);
        let mut outcomes = Vec::with_capacity(receiver_ids.len());

        for receiver_id in receiver_ids {
            let result = match self.registry.resolve(receiver_id) {
                Some(session) => session.send(&message).await,
                None => Err(DispatchError::ReceiverNotFound(receiver_id.clone())),
            };

            match &result {
                Ok(()) => tracing::debug!(
                    receiver = %receiver_id,
                    oid = %payload.oid,
                    value = %payload.value,
                    severity = ?payload.severity,
                    "Trap sent"
                ),
                Err(e) => tracing::error!(
                    receiver = %receiver_id,
                    oid = %payload.oid,
                    error = %e,
                    "Failed to send trap"
                ),
            }

            outcomes.push(ReceiverOutcome {
                receiver_id: receiver_id.clone(),
                result,
            });
        }

        DispatchReport {
            oid: payload.oid.clone(),
            outcomes,
        }
    }

    /// Closes every receiver session. Safe to call repeatedly.
    pub fn close(&mut self) -> usize {
        self.registry.close_all()
    }
}
