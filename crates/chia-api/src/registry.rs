//! Process-wide connection and service registry.
//!
//! Owns the client configuration slot, the single shared [`Client`] and at
//! most one [`ServiceInstance`] per [`ServiceHandle`]. Everything is created
//! lazily on first use.
//!
//! # Thread Safety
//!
//! Client construction happens under an async lock held across the connect,
//! so concurrent first callers wait for the one connection instead of opening
//! their own. Instances are created under a plain mutex; creation never awaits.

use crate::config::ClientConfig;
use crate::services::{ServiceHandle, ServiceInstance};
use crate::transport::Client;
use crate::{ChiaError, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tracing::{debug, info};

#[derive(Debug, Default)]
pub struct ServiceRegistry {
    config: RwLock<Option<ClientConfig>>,
    client: tokio::sync::Mutex<Option<Arc<Client>>>,
    services: Mutex<HashMap<ServiceHandle, Arc<ServiceInstance>>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the configuration used for the next connection.
    ///
    /// An already established connection is kept until [`shutdown`](Self::shutdown).
    pub fn initialize_config(&self, config: ClientConfig) {
        info!("Client configuration set for {}", config.url);
        *self
            .config
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(config);
    }

    pub fn is_configured(&self) -> bool {
        self.config
            .read()
            .map(|config| config.is_some())
            .unwrap_or(false)
    }

    fn config(&self) -> Result<ClientConfig> {
        self.config
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
            .ok_or(ChiaError::NotInitialized)
    }

    /// The shared client, connecting on first use.
    pub async fn client(&self) -> Result<Arc<Client>> {
        let config = self.config()?;

        let mut slot = self.client.lock().await;
        if let Some(client) = slot.as_ref() {
            return Ok(client.clone());
        }

        debug!("Opening daemon connection to {}", config.url);
        let client = Arc::new(Client::connect(&config).await?);
        *slot = Some(client.clone());
        Ok(client)
    }

    /// The instance for `handle`, creating it (and the client) on first use.
    pub async fn service(&self, handle: ServiceHandle) -> Result<Arc<ServiceInstance>> {
        let client = self.client().await?;

        let mut services = self.lock_services();
        let instance = services
            .entry(handle)
            .or_insert_with(|| {
                debug!("Creating service instance for {}", handle);
                Arc::new(ServiceInstance::new(handle, client))
            })
            .clone();
        Ok(instance)
    }

    /// Number of service instances created so far.
    pub fn service_count(&self) -> usize {
        self.lock_services().len()
    }

    /// Drop the client and every service instance.
    ///
    /// The next access reconnects with the stored configuration.
    pub async fn shutdown(&self) {
        let client = self.client.lock().await.take();
        self.lock_services().clear();
        if let Some(client) = client {
            info!("Closing daemon connection to {}", client.url());
        }
    }

    fn lock_services(&self) -> MutexGuard<'_, HashMap<ServiceHandle, Arc<ServiceInstance>>> {
        self.services
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
