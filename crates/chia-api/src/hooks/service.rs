//! Desired-state reconciliation for daemon-managed services.
//!
//! A [`ServiceReconciler`] polls whether a service is running and compares the
//! answer with the desired state on every observation. Whenever they differ and
//! no start or stop is already in flight, it issues exactly one corrective
//! action in the background and keeps polling. A service that dies after being
//! started is therefore started again on a later observation.

use crate::api::ChiaApi;
use crate::config::ClientDefaults;
use crate::{ChiaError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DesiredState {
    KeepRunning,
    KeepStopped,
    /// Observe only.
    #[default]
    Unmanaged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    Unknown,
    Running,
    Stopped,
    Starting,
    Stopping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Correction {
    Start,
    Stop,
}

/// Start, stop and check daemon services.
#[async_trait::async_trait]
pub trait ServiceControl: Send + Sync + 'static {
    async fn is_running(&self, service: &str) -> Result<bool>;
    async fn start(&self, service: &str) -> Result<()>;
    async fn stop(&self, service: &str) -> Result<()>;
}

#[async_trait::async_trait]
impl ServiceControl for ChiaApi {
    async fn is_running(&self, service: &str) -> Result<bool> {
        let running = self
            .fetch("isServiceRunning", &json!({ "service": service }))
            .await?;
        Ok(running.as_bool().unwrap_or(false))
    }

    async fn start(&self, service: &str) -> Result<()> {
        self.mutate("startService", json!({ "service": service }))
            .await
            .map(|_| ())
    }

    async fn stop(&self, service: &str) -> Result<()> {
        self.mutate("stopService", json!({ "service": service }))
            .await
            .map(|_| ())
    }
}

pub struct ServiceReconciler<C: ServiceControl> {
    control: Arc<C>,
    service: String,
    desired: DesiredState,
    poll_interval: Duration,
    in_flight: Option<(Correction, JoinHandle<Result<()>>)>,
}

impl<C: ServiceControl> ServiceReconciler<C> {
    pub fn new(control: Arc<C>, service: impl Into<String>, desired: DesiredState) -> Self {
        Self {
            control,
            service: service.into(),
            desired,
            poll_interval: ClientDefaults::SERVICE_POLL_INTERVAL,
            in_flight: None,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn desired(&self) -> DesiredState {
        self.desired
    }

    pub fn set_desired(&mut self, desired: DesiredState) {
        self.desired = desired;
    }

    pub fn in_flight(&self) -> Option<Correction> {
        self.in_flight.as_ref().map(|(correction, _)| *correction)
    }

    /// The action an observation calls for, if any.
    pub fn decide(&self, running: bool) -> Option<Correction> {
        if self.in_flight.is_some() {
            return None;
        }
        match (self.desired, running) {
            (DesiredState::KeepRunning, false) => Some(Correction::Start),
            (DesiredState::KeepStopped, true) => Some(Correction::Stop),
            _ => None,
        }
    }

    /// Observe the service once and correct it if needed.
    pub async fn tick(&mut self) -> Result<ServiceStatus> {
        self.collect_finished().await;

        let running = self.control.is_running(&self.service).await?;
        if let Some(correction) = self.decide(running) {
            info!("{:?} {} (desired {:?})", correction, self.service, self.desired);
            self.spawn_correction(correction);
        }

        Ok(match (self.in_flight(), running) {
            (Some(Correction::Start), false) => ServiceStatus::Starting,
            (Some(Correction::Stop), true) => ServiceStatus::Stopping,
            (_, true) => ServiceStatus::Running,
            (_, false) => ServiceStatus::Stopped,
        })
    }

    fn spawn_correction(&mut self, correction: Correction) {
        let control = self.control.clone();
        let service = self.service.clone();
        let task = tokio::spawn(async move {
            match correction {
                Correction::Start => control.start(&service).await,
                Correction::Stop => control.stop(&service).await,
            }
        });
        self.in_flight = Some((correction, task));
    }

    async fn collect_finished(&mut self) {
        let finished = self
            .in_flight
            .as_ref()
            .is_some_and(|(_, task)| task.is_finished());
        if !finished {
            return;
        }

        if let Some((correction, task)) = self.in_flight.take() {
            match task.await {
                Ok(Ok(())) => debug!("{:?} {} completed", correction, self.service),
                Ok(Err(e)) => warn!("{:?} {} failed: {}", correction, self.service, e),
                Err(e) => error!("{:?} {} task failed: {}", correction, self.service, e),
            }
        }
    }

    /// Run the reconciliation loop in the background.
    pub fn spawn(mut self) -> ReconcilerHandle {
        let (desired_tx, mut desired_rx) = watch::channel(self.desired);
        let (status_tx, status_rx) = watch::channel(ServiceStatus::Unknown);

        let task = tokio::spawn(async move {
            loop {
                match self.tick().await {
                    Ok(status) => {
                        status_tx.send_replace(status);
                    }
                    Err(e) => {
                        warn!("Failed to poll {}: {}", self.service, e);
                        status_tx.send_replace(ServiceStatus::Unknown);
                    }
                }

                tokio::select! {
                    _ = tokio::time::sleep(self.poll_interval) => {}
                    changed = desired_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        self.desired = *desired_rx.borrow_and_update();
                    }
                }
            }
        });

        ReconcilerHandle {
            desired: desired_tx,
            status: status_rx,
            task,
        }
    }
}

/// Control side of a spawned reconciler. Stops the loop on drop.
#[derive(Debug)]
pub struct ReconcilerHandle {
    desired: watch::Sender<DesiredState>,
    status: watch::Receiver<ServiceStatus>,
    task: JoinHandle<()>,
}

impl ReconcilerHandle {
    pub fn set_desired(&self, desired: DesiredState) {
        self.desired.send_replace(desired);
    }

    pub fn status(&self) -> ServiceStatus {
        *self.status.borrow()
    }

    pub fn status_changes(&self) -> watch::Receiver<ServiceStatus> {
        self.status.clone()
    }
}

impl Drop for ReconcilerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Parse `running` / `stopped` / `unmanaged`.
impl std::str::FromStr for DesiredState {
    type Err = ChiaError;

    fn from_str(s: &str) -> Result<Self> {
        serde_json::from_value(Value::String(match s {
            "running" => "keep_running".to_string(),
            "stopped" => "keep_stopped".to_string(),
            other => other.to_string(),
        }))
        .map_err(|_| ChiaError::InvalidParams {
            message: format!("Unknown desired state: {}", s),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::sync::Notify;

    #[derive(Default)]
    struct FakeControl {
        running: AtomicBool,
        starts: AtomicUsize,
        stops: AtomicUsize,
        release: Notify,
    }

    #[async_trait::async_trait]
    impl ServiceControl for FakeControl {
        async fn is_running(&self, _service: &str) -> Result<bool> {
            Ok(self.running.load(Ordering::SeqCst))
        }

        async fn start(&self, _service: &str) -> Result<()> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            self.release.notified().await;
            self.running.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn stop(&self, _service: &str) -> Result<()> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            self.running.store(false, Ordering::SeqCst);
            Ok(())
        }
    }

    async fn settle(reconciler: &ServiceReconciler<FakeControl>) {
        while reconciler
            .in_flight
            .as_ref()
            .is_some_and(|(_, task)| !task.is_finished())
        {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_start_issued_once_while_in_flight() {
        let control = Arc::new(FakeControl::default());
        let mut reconciler =
            ServiceReconciler::new(control.clone(), "chia_wallet", DesiredState::KeepRunning);

        assert_eq!(reconciler.tick().await.unwrap(), ServiceStatus::Starting);
        tokio::task::yield_now().await;
        assert_eq!(reconciler.tick().await.unwrap(), ServiceStatus::Starting);
        assert_eq!(reconciler.tick().await.unwrap(), ServiceStatus::Starting);
        assert_eq!(control.starts.load(Ordering::SeqCst), 1);

        control.release.notify_one();
        settle(&reconciler).await;
        assert_eq!(reconciler.tick().await.unwrap(), ServiceStatus::Running);
        assert_eq!(reconciler.in_flight(), None);
        assert_eq!(control.starts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_level_triggered_restart() {
        let control = Arc::new(FakeControl::default());
        control.running.store(true, Ordering::SeqCst);
        let mut reconciler =
            ServiceReconciler::new(control.clone(), "chia_wallet", DesiredState::KeepRunning);

        assert_eq!(reconciler.tick().await.unwrap(), ServiceStatus::Running);
        assert_eq!(control.starts.load(Ordering::SeqCst), 0);

        control.running.store(false, Ordering::SeqCst);
        assert_eq!(reconciler.tick().await.unwrap(), ServiceStatus::Starting);
        assert_eq!(control.starts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_keep_stopped_and_unmanaged() {
        let control = Arc::new(FakeControl::default());
        control.running.store(true, Ordering::SeqCst);
        let mut reconciler =
            ServiceReconciler::new(control.clone(), "chia_farmer", DesiredState::Unmanaged);

        assert_eq!(reconciler.tick().await.unwrap(), ServiceStatus::Running);
        assert_eq!(control.stops.load(Ordering::SeqCst), 0);

        reconciler.set_desired(DesiredState::KeepStopped);
        reconciler.tick().await.unwrap();
        settle(&reconciler).await;
        assert_eq!(reconciler.tick().await.unwrap(), ServiceStatus::Stopped);
        assert_eq!(control.stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_decide() {
        let control = Arc::new(FakeControl::default());
        let reconciler = ServiceReconciler::new(control, "chia_wallet", DesiredState::KeepRunning);
        assert_eq!(reconciler.decide(false), Some(Correction::Start));
        assert_eq!(reconciler.decide(true), None);
    }

    #[test]
    fn test_parse_desired_state() {
        assert_eq!("running".parse::<DesiredState>().unwrap(), DesiredState::KeepRunning);
        assert_eq!("stopped".parse::<DesiredState>().unwrap(), DesiredState::KeepStopped);
        assert_eq!("unmanaged".parse::<DesiredState>().unwrap(), DesiredState::Unmanaged);
        assert!("sometimes".parse::<DesiredState>().is_err());
    }
}
