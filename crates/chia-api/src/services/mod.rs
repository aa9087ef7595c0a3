//! Daemon services and their command/event tables.
//!
//! A [`ServiceHandle`] names one backend subsystem. Each service exposes a
//! static table of camelCase commands (mapped to daemon commands with named
//! parameters) and a table of push events it can deliver. A
//! [`ServiceInstance`] binds a handle to the shared [`Client`] and executes
//! those tables.

mod daemon;
mod farmer;
mod full_node;
mod harvester;
mod plotter;
mod wallet;

use crate::subscription::{EventCallback, Unsubscribe};
use crate::transport::message::{Message, STATE_CHANGED};
use crate::transport::{Client, ConnectionState};
use crate::{ChiaError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::debug;

/// Something commands and subscriptions can be issued against.
///
/// Implemented by the shared [`Client`] (for `client: true` requests) and by
/// every [`ServiceInstance`].
#[async_trait::async_trait]
pub trait Invocable: Send + Sync {
    fn target_name(&self) -> &str;

    /// Run `command` with positional arguments and return its result.
    async fn invoke(&self, command: &str, args: &[Value]) -> Result<Value>;

    /// Start delivering `event` pushes to `callback`.
    async fn subscribe(
        &self,
        event: &str,
        args: &[Value],
        callback: EventCallback,
    ) -> Result<Unsubscribe>;
}

/// Logical backend subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceHandle {
    Wallet,
    FullNode,
    Farmer,
    Harvester,
    Plotter,
    Daemon,
}

impl ServiceHandle {
    pub const ALL: [ServiceHandle; 6] = [
        ServiceHandle::Wallet,
        ServiceHandle::FullNode,
        ServiceHandle::Farmer,
        ServiceHandle::Harvester,
        ServiceHandle::Plotter,
        ServiceHandle::Daemon,
    ];

    /// Name the daemon routes messages by.
    pub fn service_name(&self) -> &'static str {
        match self {
            ServiceHandle::Wallet => "chia_wallet",
            ServiceHandle::FullNode => "chia_full_node",
            ServiceHandle::Farmer => "chia_farmer",
            ServiceHandle::Harvester => "chia_harvester",
            ServiceHandle::Plotter => "chia_plotter",
            ServiceHandle::Daemon => "daemon",
        }
    }

    /// Parse either the short name (`full_node`) or the daemon name (`chia_full_node`).
    pub fn parse(s: &str) -> Option<Self> {
        let lowered = s.to_lowercase();
        let short = lowered.strip_prefix("chia_").unwrap_or(&lowered);
        match short {
            "wallet" => Some(ServiceHandle::Wallet),
            "full_node" | "fullnode" => Some(ServiceHandle::FullNode),
            "farmer" => Some(ServiceHandle::Farmer),
            "harvester" => Some(ServiceHandle::Harvester),
            "plotter" => Some(ServiceHandle::Plotter),
            "daemon" => Some(ServiceHandle::Daemon),
            _ => None,
        }
    }

    pub fn commands(&self) -> &'static [CommandSpec] {
        match self {
            ServiceHandle::Wallet => wallet::COMMANDS,
            ServiceHandle::FullNode => full_node::COMMANDS,
            ServiceHandle::Farmer => farmer::COMMANDS,
            ServiceHandle::Harvester => harvester::COMMANDS,
            ServiceHandle::Plotter => plotter::COMMANDS,
            ServiceHandle::Daemon => daemon::COMMANDS,
        }
    }

    pub fn events(&self) -> &'static [EventSpec] {
        match self {
            ServiceHandle::Wallet => wallet::EVENTS,
            ServiceHandle::FullNode => full_node::EVENTS,
            ServiceHandle::Farmer => farmer::EVENTS,
            ServiceHandle::Harvester => harvester::EVENTS,
            ServiceHandle::Plotter => plotter::EVENTS,
            ServiceHandle::Daemon => daemon::EVENTS,
        }
    }

    pub fn command(&self, name: &str) -> Option<&'static CommandSpec> {
        self.commands().iter().find(|spec| spec.name == name)
    }

    pub fn event(&self, name: &str) -> Option<&'static EventSpec> {
        self.events().iter().find(|spec| spec.name == name)
    }
}

impl std::fmt::Display for ServiceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.service_name())
    }
}

/// One command a service accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandSpec {
    /// camelCase name used in request descriptors.
    pub name: &'static str,
    /// Daemon command.
    pub rpc: &'static str,
    /// Names of the `data` fields filled from positional arguments.
    pub params: &'static [&'static str],
    /// Route to this service instead of the owning one.
    pub destination: Option<&'static str>,
}

impl CommandSpec {
    pub const fn new(name: &'static str, rpc: &'static str, params: &'static [&'static str]) -> Self {
        Self {
            name,
            rpc,
            params,
            destination: None,
        }
    }

    pub const fn via(mut self, destination: &'static str) -> Self {
        self.destination = Some(destination);
        self
    }

    /// Build the daemon `data` object from positional arguments.
    ///
    /// `null` arguments are omitted. A command without named parameters accepts
    /// one object argument, passed through as-is.
    pub fn build_data(&self, args: &[Value]) -> Result<Value> {
        if self.params.is_empty() {
            return match args {
                [] | [Value::Null] => Ok(json!({})),
                [object @ Value::Object(_)] => Ok(object.clone()),
                _ => Err(ChiaError::InvalidParams {
                    message: format!(
                        "{} takes a single object argument, got {} arguments",
                        self.name,
                        args.len()
                    ),
                }),
            };
        }

        if args.len() > self.params.len() {
            return Err(ChiaError::InvalidParams {
                message: format!(
                    "{} takes at most {} arguments ({}), got {}",
                    self.name,
                    self.params.len(),
                    self.params.join(", "),
                    args.len()
                ),
            });
        }

        let data: Map<String, Value> = self
            .params
            .iter()
            .zip(args)
            .filter(|(_, value)| !value.is_null())
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect();

        Ok(Value::Object(data))
    }
}

/// Which pushes an event subscription matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventTrigger {
    /// `state_changed` push whose `data.state` equals the value.
    StateChanged(&'static str),
    /// Push with this command name.
    Command(&'static str),
}

impl EventTrigger {
    pub fn matches(&self, message: &Message) -> bool {
        match self {
            EventTrigger::StateChanged(state) => {
                message.command == STATE_CHANGED && message.state() == Some(*state)
            }
            EventTrigger::Command(command) => message.command == *command,
        }
    }
}

/// One push event a service can deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventSpec {
    pub name: &'static str,
    pub trigger: EventTrigger,
}

impl EventSpec {
    pub const fn state(name: &'static str, state: &'static str) -> Self {
        Self {
            name,
            trigger: EventTrigger::StateChanged(state),
        }
    }

    pub const fn command(name: &'static str, command: &'static str) -> Self {
        Self {
            name,
            trigger: EventTrigger::Command(command),
        }
    }
}

/// A service bound to the shared client.
#[derive(Debug)]
pub struct ServiceInstance {
    handle: ServiceHandle,
    client: Arc<Client>,
}

impl ServiceInstance {
    pub fn new(handle: ServiceHandle, client: Arc<Client>) -> Self {
        Self { handle, client }
    }

    pub fn handle(&self) -> ServiceHandle {
        self.handle
    }

    pub fn client(&self) -> &Arc<Client> {
        &self.client
    }

    fn unknown(&self, command: &str) -> ChiaError {
        ChiaError::UnknownCommand {
            target: self.handle.service_name().to_string(),
            command: command.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl Invocable for ServiceInstance {
    fn target_name(&self) -> &str {
        self.handle.service_name()
    }

    async fn invoke(&self, command: &str, args: &[Value]) -> Result<Value> {
        let spec = self
            .handle
            .command(command)
            .ok_or_else(|| self.unknown(command))?;
        let data = spec.build_data(args)?;
        let destination = spec.destination.unwrap_or(self.handle.service_name());

        self.client.call(destination, spec.rpc, data).await
    }

    async fn subscribe(
        &self,
        event: &str,
        _args: &[Value],
        callback: EventCallback,
    ) -> Result<Unsubscribe> {
        let spec = self.handle.event(event).ok_or_else(|| self.unknown(event))?;

        if self.client.state() == ConnectionState::Disconnected {
            return Err(ChiaError::Disconnected);
        }

        let origin = self.handle.service_name();
        let trigger = spec.trigger;
        debug!("Subscribing to {} from {}", event, origin);

        Ok(self.client.add_listener(Arc::new(move |message: &Message| {
            if message.origin == origin && trigger.matches(message) {
                callback(message.data.clone());
            }
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockDaemon;
    use std::collections::HashSet;
    use tokio::sync::mpsc;

    #[test]
    fn test_parse_roundtrip() {
        for handle in ServiceHandle::ALL {
            assert_eq!(ServiceHandle::parse(handle.service_name()), Some(handle));
        }
        assert_eq!(ServiceHandle::parse("full_node"), Some(ServiceHandle::FullNode));
        assert_eq!(ServiceHandle::parse("timelord"), None);
    }

    #[test]
    fn test_command_and_event_names_are_unique() {
        for handle in ServiceHandle::ALL {
            let commands: HashSet<_> = handle.commands().iter().map(|c| c.name).collect();
            assert_eq!(commands.len(), handle.commands().len(), "{}", handle);
            let events: HashSet<_> = handle.events().iter().map(|e| e.name).collect();
            assert_eq!(events.len(), handle.events().len(), "{}", handle);
        }
    }

    #[test]
    fn test_build_data_positional() {
        let spec = CommandSpec::new("getTransactions", "get_transactions", &["wallet_id", "start", "end"]);
        let data = spec.build_data(&[json!(1), Value::Null, json!(50)]).unwrap();
        assert_eq!(data, json!({"wallet_id": 1, "end": 50}));

        let result = spec.build_data(&[json!(1), json!(2), json!(3), json!(4)]);
        assert!(matches!(result, Err(ChiaError::InvalidParams { .. })));
    }

    #[test]
    fn test_build_data_object_passthrough() {
        let spec = CommandSpec::new("startPlotting", "start_plotting", &[]);
        let data = spec.build_data(&[json!({"k": 32, "n": 1})]).unwrap();
        assert_eq!(data, json!({"k": 32, "n": 1}));
        assert_eq!(spec.build_data(&[]).unwrap(), json!({}));
        assert!(spec.build_data(&[json!(32)]).is_err());
    }

    #[test]
    fn test_trigger_matching() {
        let coin_added = Message::event(
            "chia_wallet",
            "wallet_ui",
            STATE_CHANGED,
            json!({"state": "coin_added", "wallet_id": 1}),
        );
        assert!(EventTrigger::StateChanged("coin_added").matches(&coin_added));
        assert!(!EventTrigger::StateChanged("coin_removed").matches(&coin_added));
        assert!(!EventTrigger::Command("coin_added").matches(&coin_added));

        let block = Message::event("chia_full_node", "wallet_ui", "block", json!({}));
        assert!(EventTrigger::Command("block").matches(&block));
    }

    #[tokio::test]
    async fn test_invoke_routes_to_service() {
        let daemon = MockDaemon::start();
        daemon.on_command("chia_wallet", "get_wallet_balance", |data| {
            Ok(json!({"wallet_balance": {"wallet_id": data["wallet_id"], "confirmed_wallet_balance": 10}}))
        });
        let client = Arc::new(Client::connect(&daemon.config()).await.unwrap());
        let wallet = ServiceInstance::new(ServiceHandle::Wallet, client);

        let data = wallet.invoke("getWalletBalance", &[json!(3)]).await.unwrap();
        assert_eq!(data["wallet_balance"]["wallet_id"], 3);

        let result = wallet.invoke("getBalance", &[]).await;
        assert!(matches!(result, Err(ChiaError::UnknownCommand { .. })));
    }

    #[tokio::test]
    async fn test_plotter_commands_go_through_daemon() {
        let daemon = MockDaemon::start();
        daemon.on_command("daemon", "stop_plotting", |_| Ok(json!({})));
        let client = Arc::new(Client::connect(&daemon.config()).await.unwrap());
        let plotter = ServiceInstance::new(ServiceHandle::Plotter, client);

        plotter.invoke("stopPlotting", &[json!("abc")]).await.unwrap();
        let sent = daemon.received("stop_plotting");
        assert_eq!(sent[0].destination, "daemon");
        assert_eq!(sent[0].data, json!({"id": "abc"}));
    }

    #[tokio::test]
    async fn test_subscribe_filters_by_origin_and_state() {
        let daemon = MockDaemon::start();
        let client = Arc::new(Client::connect(&daemon.config()).await.unwrap());
        let wallet = ServiceInstance::new(ServiceHandle::Wallet, client.clone());

        let (tx, mut rx) = mpsc::unbounded_channel();
        let unsubscribe = wallet
            .subscribe(
                "onCoinAdded",
                &[],
                Arc::new(move |data| {
                    let _ = tx.send(data);
                }),
            )
            .await
            .unwrap();

        daemon
            .push_state_changed("chia_full_node", "coin_added", json!({"wallet_id": 9}))
            .await;
        daemon
            .push_state_changed("chia_wallet", "coin_removed", json!({"wallet_id": 8}))
            .await;
        daemon
            .push_state_changed("chia_wallet", "coin_added", json!({"wallet_id": 1}))
            .await;

        let data = rx.recv().await.unwrap();
        assert_eq!(data["wallet_id"], 1);
        assert!(rx.try_recv().is_err());

        unsubscribe.unsubscribe();
        assert_eq!(client.listener_count(), 0);
    }
}
