//! Transport adapter between query endpoints and the daemon services.
//!
//! A [`RequestDescriptor`] names a target (the shared client or one service),
//! a command or event, positional arguments and, for subscriptions, a
//! callback. [`BaseQuery::execute`] resolves the target through the
//! [`ServiceRegistry`], runs the request and wraps the outcome in a
//! [`QueryResult`]. Failures of every kind land in `QueryResult::result`;
//! nothing is retried here.

use crate::registry::ServiceRegistry;
use crate::services::{Invocable, ServiceHandle};
use crate::subscription::{EventCallback, Unsubscribe};
use crate::{ChiaError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// What a request is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    /// The shared connection itself (`client: true`).
    Client,
    Service(ServiceHandle),
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Client => write!(f, "client"),
            Target::Service(handle) => write!(f, "{}", handle),
        }
    }
}

/// One request to run through [`BaseQuery`].
#[derive(Clone)]
pub struct RequestDescriptor {
    pub command: String,
    pub target: Target,
    pub args: Vec<Value>,
    /// Present for subscriptions: receives every matching push.
    pub callback: Option<EventCallback>,
}

impl RequestDescriptor {
    pub fn service(handle: ServiceHandle, command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            target: Target::Service(handle),
            args: Vec::new(),
            callback: None,
        }
    }

    pub fn client(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            target: Target::Client,
            args: Vec::new(),
            callback: None,
        }
    }

    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    pub fn args(mut self, values: impl IntoIterator<Item = Value>) -> Self {
        self.args.extend(values);
        self
    }

    /// Turn the request into a subscription delivering to `callback`.
    pub fn with_callback(mut self, callback: EventCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    pub fn is_subscription(&self) -> bool {
        self.callback.is_some()
    }
}

impl fmt::Debug for RequestDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestDescriptor")
            .field("command", &self.command)
            .field("target", &self.target)
            .field("args", &self.args)
            .field("subscription", &self.is_subscription())
            .finish()
    }
}

/// Successful outcome of a request.
#[derive(Debug)]
pub enum Reply {
    /// Command result, `Null` when the service returned nothing.
    Data(Value),
    /// Release handle of an established subscription.
    Subscription(Unsubscribe),
}

/// Request metadata attached to every result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryMeta {
    pub timestamp: DateTime<Utc>,
    pub command: String,
    pub args: Vec<Value>,
}

#[derive(Debug)]
pub struct QueryResult {
    pub result: Result<Reply>,
    pub meta: QueryMeta,
}

impl QueryResult {
    /// The command result, or an error if this was a subscription.
    pub fn into_data(self) -> Result<Value> {
        match self.result? {
            Reply::Data(value) => Ok(value),
            Reply::Subscription(_) => Err(ChiaError::Other(format!(
                "{} returned a subscription, not data",
                self.meta.command
            ))),
        }
    }

    pub fn into_subscription(self) -> Result<Unsubscribe> {
        match self.result? {
            Reply::Subscription(unsubscribe) => Ok(unsubscribe),
            Reply::Data(_) => Err(ChiaError::Other(format!(
                "{} returned data, not a subscription",
                self.meta.command
            ))),
        }
    }
}

/// Subscribe-only view of the transport.
#[async_trait::async_trait]
pub trait EventSource: Send + Sync {
    async fn subscribe(
        &self,
        target: Target,
        event: &str,
        args: Vec<Value>,
        callback: EventCallback,
    ) -> Result<Unsubscribe>;
}

/// Executes request descriptors against the registry's shared connection.
#[derive(Debug, Clone)]
pub struct BaseQuery {
    registry: Arc<ServiceRegistry>,
}

impl BaseQuery {
    pub fn new(registry: Arc<ServiceRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    /// Run one request: one round trip, including for subscriptions.
    pub async fn execute(&self, request: RequestDescriptor) -> QueryResult {
        let meta = QueryMeta {
            timestamp: Utc::now(),
            command: request.command.clone(),
            args: request.args.clone(),
        };

        let result = self.run(request).await;
        if let Err(e) = &result {
            debug!("{} failed: {}", meta.command, e);
        }

        QueryResult { result, meta }
    }

    async fn run(&self, request: RequestDescriptor) -> Result<Reply> {
        let target = self.resolve(request.target).await?;

        match request.callback {
            Some(callback) => target
                .subscribe(&request.command, &request.args, callback)
                .await
                .map(Reply::Subscription),
            None => target
                .invoke(&request.command, &request.args)
                .await
                .map(Reply::Data),
        }
    }

    async fn resolve(&self, target: Target) -> Result<Arc<dyn Invocable>> {
        let invocable: Arc<dyn Invocable> = match target {
            Target::Client => self.registry.client().await?,
            Target::Service(handle) => self.registry.service(handle).await?,
        };
        Ok(invocable)
    }
}

#[async_trait::async_trait]
impl EventSource for BaseQuery {
    async fn subscribe(
        &self,
        target: Target,
        event: &str,
        args: Vec<Value>,
        callback: EventCallback,
    ) -> Result<Unsubscribe> {
        let request = RequestDescriptor {
            command: event.to_string(),
            target,
            args,
            callback: Some(callback),
        };
        self.execute(request).await.into_subscription()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockDaemon;
    use serde_json::json;
    use tokio::sync::mpsc;

    fn configured(daemon: &MockDaemon) -> BaseQuery {
        let registry = Arc::new(ServiceRegistry::new());
        registry.initialize_config(daemon.config());
        BaseQuery::new(registry)
    }

    #[tokio::test]
    async fn test_execute_without_config_reports_error_with_meta() {
        let query = BaseQuery::new(Arc::new(ServiceRegistry::new()));
        let result = query
            .execute(RequestDescriptor::service(ServiceHandle::Wallet, "getWalletBalance").arg(1))
            .await;

        assert!(matches!(result.result, Err(ChiaError::NotInitialized)));
        assert_eq!(result.meta.command, "getWalletBalance");
        assert_eq!(result.meta.args, vec![json!(1)]);
    }

    #[tokio::test]
    async fn test_execute_command() {
        let daemon = MockDaemon::start();
        daemon.on_command("chia_wallet", "get_wallets", |_| {
            Ok(json!({"wallets": [{"id": 1}]}))
        });
        let query = configured(&daemon);

        let data = query
            .execute(RequestDescriptor::service(ServiceHandle::Wallet, "getWallets"))
            .await
            .into_data()
            .unwrap();
        assert_eq!(data["wallets"][0]["id"], 1);
    }

    #[tokio::test]
    async fn test_execute_remote_error_is_in_result() {
        let daemon = MockDaemon::start();
        daemon.on_command("chia_full_node", "get_block", |_| Err("Block not found".into()));
        let query = configured(&daemon);

        let result = query
            .execute(RequestDescriptor::service(ServiceHandle::FullNode, "getBlock").arg("0xabc"))
            .await;
        match result.result {
            Err(ChiaError::Remote { message, .. }) => assert_eq!(message, "Block not found"),
            other => panic!("Expected Remote error, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_execute_client_target() {
        let daemon = MockDaemon::start();
        let query = configured(&daemon);

        let state = query
            .execute(RequestDescriptor::client("getState"))
            .await
            .into_data()
            .unwrap();
        assert_eq!(state["state"], "connected");
    }

    #[tokio::test]
    async fn test_subscribe_through_event_source() {
        let daemon = MockDaemon::start();
        let query = configured(&daemon);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let unsubscribe = EventSource::subscribe(
            &query,
            Target::Service(ServiceHandle::Wallet),
            "onSyncChanged",
            Vec::new(),
            Arc::new(move |data| {
                let _ = tx.send(data);
            }),
        )
        .await
        .unwrap();

        daemon
            .push_state_changed("chia_wallet", "sync_changed", json!({"synced": true}))
            .await;
        let data = rx.recv().await.unwrap();
        assert_eq!(data["synced"], true);
        assert!(unsubscribe.unsubscribe());
    }

    #[tokio::test]
    async fn test_subscribe_unknown_event_fails() {
        let daemon = MockDaemon::start();
        let query = configured(&daemon);

        let result = query
            .execute(
                RequestDescriptor::service(ServiceHandle::Farmer, "onSomethingElse")
                    .with_callback(Arc::new(|_| {})),
            )
            .await;
        assert!(matches!(result.result, Err(ChiaError::UnknownCommand { .. })));
    }
}
