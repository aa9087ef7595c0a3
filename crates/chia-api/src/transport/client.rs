//! Shared daemon client.
//!
//! Correlates requests with their acknowledgements by `request_id` and fans
//! unsolicited pushes out to registered listeners. One background task owns the
//! inbound half of the connection; callers only ever touch the outbound sender
//! and the shared pending/listener tables.
//!
//! # Thread Safety
//!
//! The pending-request map and the listener list sit behind `std::sync::Mutex`
//! and are never held across an await, so the client can be shared through an
//! `Arc` by any number of tasks.

use super::message::Message;
use crate::config::ClientConfig;
use crate::services::Invocable;
use crate::subscription::{EventCallback, Unsubscribe};
use crate::{ChiaError, Result};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Callback receiving every push message delivered to this client.
pub type MessageCallback = Arc<dyn Fn(&Message) + Send + Sync + 'static>;

/// Lifecycle of the shared connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected,
}

struct Shared {
    pending: Mutex<HashMap<String, oneshot::Sender<Message>>>,
    listeners: Mutex<Vec<(u64, MessageCallback)>>,
    state: watch::Sender<ConnectionState>,
}

impl Shared {
    fn lock_pending(&self) -> MutexGuard<'_, HashMap<String, oneshot::Sender<Message>>> {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_listeners(&self) -> MutexGuard<'_, Vec<(u64, MessageCallback)>> {
        self.listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Deliver a push to every listener, each behind its own panic boundary.
    fn dispatch(&self, message: &Message) {
        let listeners: Vec<MessageCallback> = self
            .lock_listeners()
            .iter()
            .map(|(_, callback)| callback.clone())
            .collect();

        for callback in listeners {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| callback(message))) {
                error!(
                    "Listener panicked while handling {} from {}: {}",
                    message.command,
                    message.origin,
                    panic_message(panic.as_ref())
                );
            }
        }
    }
}

/// Client bound to one daemon connection.
pub struct Client {
    origin: String,
    url: String,
    outbound: mpsc::Sender<String>,
    shared: Arc<Shared>,
    next_listener_id: AtomicU64,
    request_timeout: Duration,
    reader: JoinHandle<()>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("origin", &self.origin)
            .field("url", &self.url)
            .field("state", &self.state())
            .finish()
    }
}

impl Client {
    /// Open the connection described by `config` and register with the daemon.
    pub async fn connect(config: &ClientConfig) -> Result<Self> {
        let connection = config.connector.connect(config).await?;
        let (state, _) = watch::channel(ConnectionState::Connecting);

        let shared = Arc::new(Shared {
            pending: Mutex::new(HashMap::new()),
            listeners: Mutex::new(Vec::new()),
            state,
        });

        let reader = tokio::spawn(Self::read_loop(connection.inbound, shared.clone()));

        let client = Self {
            origin: config.service_name.clone(),
            url: config.url.clone(),
            outbound: connection.outbound,
            shared,
            next_listener_id: AtomicU64::new(1),
            request_timeout: config.request_timeout,
            reader,
        };

        client
            .call(
                "daemon",
                "register_service",
                json!({ "service": client.origin }),
            )
            .await?;

        client.shared.state.send_replace(ConnectionState::Connected);
        info!("Registered {} with daemon at {}", client.origin, client.url);

        Ok(client)
    }

    async fn read_loop(mut inbound: mpsc::Receiver<String>, shared: Arc<Shared>) {
        while let Some(text) = inbound.recv().await {
            let message: Message = match serde_json::from_str(&text) {
                Ok(message) => message,
                Err(e) => {
                    warn!("Ignoring malformed daemon message: {}", e);
                    continue;
                }
            };

            if message.ack {
                let waiter = shared.lock_pending().remove(&message.request_id);
                match waiter {
                    Some(waiter) => {
                        let _ = waiter.send(message);
                    }
                    None => debug!(
                        "Response for unknown request {} ({})",
                        message.request_id, message.command
                    ),
                }
                continue;
            }

            shared.dispatch(&message);
        }

        shared.state.send_replace(ConnectionState::Disconnected);
        // Dropping the senders fails every waiting call with `Disconnected`.
        let orphaned = std::mem::take(&mut *shared.lock_pending());
        info!(
            "Daemon connection closed ({} pending requests failed)",
            orphaned.len()
        );
    }

    /// Send `command` to `destination` and wait for its acknowledgement.
    ///
    /// Returns the response `data`. A response with `success: false` becomes
    /// [`ChiaError::Remote`].
    pub async fn call(&self, destination: &str, command: &str, data: Value) -> Result<Value> {
        if self.state() == ConnectionState::Disconnected {
            return Err(ChiaError::Disconnected);
        }

        let request = Message::request(&self.origin, destination, command, data);
        let request_id = request.request_id.clone();
        let payload = serde_json::to_string(&request)?;

        let (tx, rx) = oneshot::channel();
        self.shared.lock_pending().insert(request_id.clone(), tx);

        // The reader may have drained the table between the check and the insert.
        if self.state() == ConnectionState::Disconnected {
            self.shared.lock_pending().remove(&request_id);
            return Err(ChiaError::Disconnected);
        }

        debug!("Sending {} to {} ({})", command, destination, request_id);

        if self.outbound.send(payload).await.is_err() {
            self.shared.lock_pending().remove(&request_id);
            return Err(ChiaError::Disconnected);
        }

        let response = match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => return Err(ChiaError::Disconnected),
            Err(_) => {
                self.shared.lock_pending().remove(&request_id);
                return Err(ChiaError::Timeout(self.request_timeout));
            }
        };

        if let Some(message) = response.remote_error() {
            return Err(ChiaError::Remote {
                command: command.to_string(),
                message,
            });
        }

        Ok(response.data)
    }

    /// Register a callback for every push message.
    pub fn add_listener(&self, callback: MessageCallback) -> Unsubscribe {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.shared.lock_listeners().push((id, callback));

        let shared = Arc::downgrade(&self.shared);
        Unsubscribe::new(move || {
            if let Some(shared) = shared.upgrade() {
                shared.lock_listeners().retain(|(listener_id, _)| *listener_id != id);
            }
        })
    }

    pub fn listener_count(&self) -> usize {
        self.shared.lock_listeners().len()
    }

    pub fn pending_count(&self) -> usize {
        self.shared.lock_pending().len()
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Operations reachable with `client: true`.
#[async_trait::async_trait]
impl Invocable for Client {
    fn target_name(&self) -> &str {
        "client"
    }

    async fn invoke(&self, command: &str, args: &[Value]) -> Result<Value> {
        match command {
            "getState" => Ok(json!({
                "state": self.state(),
                "url": self.url,
            })),
            "call" => {
                let destination = arg_str(args, 0, "destination")?;
                let daemon_command = arg_str(args, 1, "command")?;
                let data = args.get(2).cloned().unwrap_or_else(|| json!({}));
                self.call(destination, daemon_command, data).await
            }
            _ => Err(ChiaError::UnknownCommand {
                target: self.target_name().to_string(),
                command: command.to_string(),
            }),
        }
    }

    async fn subscribe(
        &self,
        event: &str,
        _args: &[Value],
        callback: EventCallback,
    ) -> Result<Unsubscribe> {
        match event {
            "onMessage" => Ok(self.add_listener(Arc::new(move |message: &Message| {
                match serde_json::to_value(message) {
                    Ok(value) => callback(value),
                    Err(e) => warn!("Failed to serialize push message: {}", e),
                }
            }))),
            "onStateChange" => {
                let mut changes = self.state_changes();
                let task = tokio::spawn(async move {
                    while changes.changed().await.is_ok() {
                        let state = *changes.borrow_and_update();
                        callback(json!({ "state": state }));
                    }
                });
                Ok(Unsubscribe::new(move || task.abort()))
            }
            _ => Err(ChiaError::UnknownCommand {
                target: self.target_name().to_string(),
                command: event.to_string(),
            }),
        }
    }
}

fn arg_str<'a>(args: &'a [Value], index: usize, name: &str) -> Result<&'a str> {
    args.get(index)
        .and_then(Value::as_str)
        .ok_or_else(|| ChiaError::InvalidParams {
            message: format!("Argument {} ({}) must be a string", index, name),
        })
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
