//! In-process connector.
//!
//! Each `connect()` creates a pair of channels and hands the daemon-side end to
//! whoever holds the acceptor receiver.

use super::{Connection, Connector};
use crate::config::{ClientConfig, ClientDefaults};
use crate::{ChiaError, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Daemon-side end of an in-process connection.
#[derive(Debug)]
pub struct MemoryPeer {
    /// Frames sent by the client.
    pub from_client: mpsc::Receiver<String>,
    /// Frames delivered to the client.
    pub to_client: mpsc::Sender<String>,
}

#[derive(Debug, Clone)]
pub struct MemoryConnector {
    acceptor: mpsc::UnboundedSender<MemoryPeer>,
    connections: Arc<AtomicUsize>,
}

impl MemoryConnector {
    /// Create a connector and the receiver on which new peers arrive.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MemoryPeer>) {
        let (acceptor, peers) = mpsc::unbounded_channel();
        (
            Self {
                acceptor,
                connections: Arc::new(AtomicUsize::new(0)),
            },
            peers,
        )
    }

    /// Number of connections opened through this connector.
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, config: &ClientConfig) -> Result<Connection> {
        let (outbound, from_client) = mpsc::channel(ClientDefaults::CHANNEL_CAPACITY);
        let (to_client, inbound) = mpsc::channel(ClientDefaults::CHANNEL_CAPACITY);

        self.acceptor
            .send(MemoryPeer {
                from_client,
                to_client,
            })
            .map_err(|_| ChiaError::Connection {
                message: format!("No in-process daemon is listening for {}", config.url),
            })?;

        let count = self.connections.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("In-process connection #{} opened for {}", count, config.url);

        Ok(Connection { outbound, inbound })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_hands_peer_to_acceptor() {
        let (connector, mut peers) = MemoryConnector::new();
        let config = ClientConfig::new("ws://memory");

        let mut connection = connector.connect(&config).await.unwrap();
        let mut peer = peers.recv().await.unwrap();

        connection.outbound.send("ping".to_string()).await.unwrap();
        assert_eq!(peer.from_client.recv().await.as_deref(), Some("ping"));

        peer.to_client.send("pong".to_string()).await.unwrap();
        assert_eq!(connection.inbound.recv().await.as_deref(), Some("pong"));

        assert_eq!(connector.connection_count(), 1);
    }

    #[tokio::test]
    async fn test_connect_without_acceptor_fails() {
        let (connector, peers) = MemoryConnector::new();
        drop(peers);

        let result = connector.connect(&ClientConfig::new("ws://memory")).await;
        assert!(matches!(result, Err(ChiaError::Connection { .. })));
        assert_eq!(connector.connection_count(), 0);
    }
}
