//! Transport to the Chia daemon.
//!
//! A [`Connector`] opens one bidirectional text channel to the daemon and hands
//! back a [`Connection`]: an outbound sender and an inbound receiver of raw
//! JSON frames. The [`Client`] builds request/response correlation and push
//! listeners on top of that pair.
//!
//! # Connectors
//!
//! - [`WebSocketConnector`]: `ws://` or `wss://` with an optional client identity
//! - [`MemoryConnector`]: in-process pair, used by tests and embedders

pub mod client;
pub mod memory;
pub mod message;
pub mod websocket;

pub use client::{Client, ConnectionState, MessageCallback};
pub use memory::{MemoryConnector, MemoryPeer};
pub use message::Message;
pub use websocket::WebSocketConnector;

use crate::config::ClientConfig;
use crate::Result;
use tokio::sync::mpsc;

/// One open channel to the daemon, as raw JSON text frames.
#[derive(Debug)]
pub struct Connection {
    pub outbound: mpsc::Sender<String>,
    pub inbound: mpsc::Receiver<String>,
}

/// Opens connections to the daemon.
#[async_trait::async_trait]
pub trait Connector: Send + Sync + std::fmt::Debug + 'static {
    async fn connect(&self, config: &ClientConfig) -> Result<Connection>;
}
