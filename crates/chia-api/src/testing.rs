//! In-process daemon double.
//!
//! [`MockDaemon`] accepts connections from a [`MemoryConnector`], answers
//! commands with registered handlers and can push events to every connected
//! client. Useful for exercising queries and subscriptions without a running
//! Chia daemon.

use crate::config::ClientConfig;
use crate::transport::message::{Message, STATE_CHANGED};
use crate::transport::{MemoryConnector, MemoryPeer};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

/// Handler returning the response `data`, or an error message.
pub type CommandHandler =
    Arc<dyn Fn(&Value) -> std::result::Result<Value, String> + Send + Sync + 'static>;

type RouteKey = (String, String);

#[derive(Default)]
struct DaemonState {
    handlers: Mutex<HashMap<RouteKey, CommandHandler>>,
    ignored: Mutex<HashSet<RouteKey>>,
    peers: Mutex<Vec<mpsc::Sender<String>>>,
    received: Mutex<Vec<Message>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Scriptable stand-in for the Chia daemon.
#[derive(Clone)]
pub struct MockDaemon {
    connector: MemoryConnector,
    state: Arc<DaemonState>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl MockDaemon {
    /// Start accepting connections. Must be called inside a tokio runtime.
    pub fn start() -> Self {
        let (connector, mut peers) = MemoryConnector::new();
        let state = Arc::new(DaemonState::default());
        let (shutdown, _) = watch::channel(false);
        let shutdown = Arc::new(shutdown);

        let accept_state = state.clone();
        let accept_shutdown = shutdown.clone();
        tokio::spawn(async move {
            while let Some(peer) = peers.recv().await {
                lock(&accept_state.peers).push(peer.to_client.clone());
                tokio::spawn(serve_peer(
                    peer,
                    accept_state.clone(),
                    accept_shutdown.subscribe(),
                ));
            }
        });

        let daemon = Self {
            connector,
            state,
            shutdown,
        };
        daemon.on_command("daemon", "register_service", |_| Ok(json!({})));
        daemon
    }

    /// A client config whose connector opens connections to this daemon.
    pub fn config(&self) -> ClientConfig {
        ClientConfig::new("ws://mock-daemon").with_connector(Arc::new(self.connector.clone()))
    }

    pub fn connector(&self) -> &MemoryConnector {
        &self.connector
    }

    pub fn connection_count(&self) -> usize {
        self.connector.connection_count()
    }

    /// Answer `command` sent to `destination` with `handler`.
    ///
    /// Object results get `success: true` added; errors become
    /// `{success: false, error}`.
    pub fn on_command(
        &self,
        destination: &str,
        command: &str,
        handler: impl Fn(&Value) -> std::result::Result<Value, String> + Send + Sync + 'static,
    ) {
        lock(&self.state.handlers).insert(
            (destination.to_string(), command.to_string()),
            Arc::new(handler),
        );
    }

    /// Record `command` but never answer it.
    pub fn ignore_command(&self, destination: &str, command: &str) {
        lock(&self.state.ignored).insert((destination.to_string(), command.to_string()));
    }

    /// Requests received for `command`, in arrival order.
    pub fn received(&self, command: &str) -> Vec<Message> {
        lock(&self.state.received)
            .iter()
            .filter(|message| message.command == command)
            .cloned()
            .collect()
    }

    /// Push `command` from `origin` to every connected client.
    pub async fn push(&self, origin: &str, command: &str, data: Value) {
        let message = Message::event(origin, "wallet_ui", command, data);
        let text = match serde_json::to_string(&message) {
            Ok(text) => text,
            Err(e) => {
                warn!("Failed to encode push: {}", e);
                return;
            }
        };

        let peers: Vec<mpsc::Sender<String>> = lock(&self.state.peers).clone();
        for peer in peers {
            let _ = peer.send(text.clone()).await;
        }
    }

    /// Push a `state_changed` message with `data.state = state`.
    pub async fn push_state_changed(&self, origin: &str, state: &str, data: Value) {
        let mut data = match data {
            Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        data.insert("state".to_string(), Value::String(state.to_string()));
        self.push(origin, STATE_CHANGED, Value::Object(data)).await;
    }

    /// Drop every connection from the daemon side.
    pub fn disconnect_all(&self) {
        lock(&self.state.peers).clear();
        self.shutdown.send_replace(true);
    }
}

async fn serve_peer(
    mut peer: MemoryPeer,
    state: Arc<DaemonState>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let text = tokio::select! {
            text = peer.from_client.recv() => match text {
                Some(text) => text,
                None => break,
            },
            _ = shutdown.changed() => break,
        };

        let request: Message = match serde_json::from_str(&text) {
            Ok(request) => request,
            Err(e) => {
                warn!("Mock daemon received malformed frame: {}", e);
                continue;
            }
        };
        lock(&state.received).push(request.clone());

        let key = (request.destination.clone(), request.command.clone());
        if lock(&state.ignored).contains(&key) {
            debug!("Mock daemon ignoring {}", request.command);
            continue;
        }

        let handler = lock(&state.handlers).get(&key).cloned();
        let data = match handler {
            Some(handler) => match handler(&request.data) {
                Ok(Value::Object(mut map)) => {
                    map.entry("success").or_insert(Value::Bool(true));
                    Value::Object(map)
                }
                Ok(other) => other,
                Err(error) => json!({"success": false, "error": error}),
            },
            None => json!({
                "success": false,
                "error": format!("Unknown command: {}", request.command),
            }),
        };

        let response = request.response(data);
        let Ok(text) = serde_json::to_string(&response) else {
            continue;
        };
        if peer.to_client.send(text).await.is_err() {
            break;
        }
    }
}
