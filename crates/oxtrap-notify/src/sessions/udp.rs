use crate::error::{DispatchError, Result};
use crate::pdu::{encode_v2c_trap, TrapMessage};
use crate::{SessionOpener, TrapSession};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use oxtrap_common::types::Receiver;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::net::{lookup_host, UdpSocket};

/// SNMPv2c session bound to one receiver over a connected UDP socket.
pub struct UdpSession {
    receiver_id: String,
    community: String,
    peer: SocketAddr,
    socket: UdpSocket,
    next_request_id: AtomicU32,
    opened_at: DateTime<Utc>,
}

impl UdpSession {
    pub async fn connect(receiver: &Receiver) -> Result<Self> {
        let endpoint = receiver.endpoint();
        let session_error = |source: std::io::Error| DispatchError::SessionOpen {
            receiver: receiver.id.clone(),
            source,
        };

        let peer = lookup_host(endpoint.as_str())
            .await
            .map_err(session_error)?
            .next()
            .ok_or_else(|| DispatchError::Resolve {
                receiver: receiver.id.clone(),
                endpoint: endpoint.clone(),
            })?;

        let local: SocketAddr = if peer.is_ipv4() {
            SocketAddr::from(([0u8; 4], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };

        let socket = UdpSocket::bind(local).await.map_err(session_error)?;
        socket.connect(peer).await.map_err(session_error)?;

        Ok(Self {
            receiver_id: receiver.id.clone(),
            community: receiver.community.clone(),
            peer,
            socket,
            next_request_id: AtomicU32::new(1),
            opened_at: Utc::now(),
        })
    }

    fn request_id(&self) -> i32 {
        let id = self.next_request_id.fetch_add(1, Ordering::Relaxed) & 0x7fff_ffff;
        id as i32
    }

    /// Hundredths of a second since the session was opened, wrapping like
    /// `sysUpTime`.
    fn uptime_ticks(&self, at: DateTime<Utc>) -> u32 {
        let millis = (at - self.opened_at).num_milliseconds().max(0);
        (millis / 10) as u32
    }
}

#[async_trait]
impl TrapSession for UdpSession {
    async fn send(&self, message: &TrapMessage) -> Result<()> {
        let datagram = encode_v2c_trap(
            self.community.as_bytes(),
            self.request_id(),
            self.uptime_ticks(message.timestamp),
            message,
        )
        .map_err(|source| DispatchError::Encode {
            receiver: self.receiver_id.clone(),
            source,
        })?;

        self.socket
            .send(&datagram)
            .await
            .map_err(|source| DispatchError::Transport {
                receiver: self.receiver_id.clone(),
                source,
            })?;

        tracing::trace!(
            receiver = %self.receiver_id,
            peer = %self.peer,
            bytes = datagram.len(),
            "Datagram sent"
        );
        Ok(())
    }

    fn receiver_id(&self) -> &str {
        &self.receiver_id
    }

    fn endpoint(&self) -> String {
        self.peer.to_string()
    }
}

/// Opens [`UdpSession`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct UdpSessionOpener;

#[async_trait]
impl SessionOpener for UdpSessionOpener {
    async fn open(&self, receiver: &Receiver) -> Result<Box<dyn TrapSession>> {
        let session = UdpSession::connect(receiver).await?;
        Ok(Box::new(session))
    }
}
