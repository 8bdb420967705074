//! Datagram Transport
//!
//! Sends each envelope as a single bincode-encoded UDP datagram. Delivery is
//! best effort, so every send reports [`Reliability::Unreliable`].

use super::types::{Inbox, Reliability, Transport};
use crate::error::TransportError;
use crate::membership::directory::NodeDirectory;
use crate::membership::types::NodeId;
use crate::protocol::types::Envelope;

use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;

/// Largest payload a single UDP datagram can carry.
pub const MAX_DATAGRAM: usize = 65_507;

pub struct UdpTransport {
    socket: Arc<UdpSocket>,
    directory: Arc<NodeDirectory>,
}

impl UdpTransport {
    pub async fn bind(
        bind_addr: SocketAddr,
        directory: Arc<NodeDirectory>,
    ) -> Result<Arc<Self>, TransportError> {
        let socket = UdpSocket::bind(bind_addr).await?;
        tracing::info!("UDP transport bound to {}", socket.local_addr()?);

        Ok(Arc::new(Self {
            socket: Arc::new(socket),
            directory,
        }))
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.socket.local_addr()?)
    }

    /// Spawns the receive loop that decodes datagrams into `inbox`.
    pub fn spawn_receiver(self: &Arc<Self>, inbox: Inbox) -> tokio::task::JoinHandle<()> {
        let transport = self.clone();
        tokio::spawn(async move {
            transport.receive_loop(inbox).await;
        })
    }

    async fn receive_loop(&self, inbox: Inbox) {
        let mut buf = vec![0u8; 65_536];

        loop {
            match self.socket.recv_from(&mut buf).await {
                Ok((len, src)) => match bincode::deserialize::<Envelope>(&buf[..len]) {
                    Ok(envelope) => {
                        if inbox.send(envelope).is_err() {
                            tracing::info!("Inbox closed, stopping UDP receiver");
                            return;
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Failed to deserialize datagram from {}: {}", src, e);
                    }
                },
                Err(e) => {
                    tracing::error!("Failed to receive UDP packet: {}", e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn send(
        &self,
        target: &NodeId,
        envelope: &Envelope,
    ) -> Result<Reliability, TransportError> {
        let node = self
            .directory
            .get_member(target)
            .ok_or_else(|| TransportError::UnknownNode(target.clone()))?;

        let encoded = bincode::serialize(envelope)?;
        if encoded.len() > MAX_DATAGRAM {
            return Err(TransportError::FrameTooLarge {
                size: encoded.len(),
                limit: MAX_DATAGRAM,
            });
        }

        self.socket.send_to(&encoded, node.udp_addr).await?;
        tracing::trace!(
            "Sent {:?} ({} bytes) to {:?} over UDP",
            envelope.frame.kind(),
            encoded.len(),
            target
        );
        Ok(Reliability::Unreliable)
    }
}
