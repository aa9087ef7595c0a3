//! Chia API - Query, subscription and cache-invalidation layer for the Chia daemon.
//!
//! This crate talks to the Chia daemon over its WebSocket API and exposes every
//! service behind it (wallet, full node, farmer, harvester, plotter, daemon) as
//! named endpoints with a shared result cache. Cached queries stay fresh by
//! subscribing to the events their service pushes and either patching the
//! cached data in place or refetching it.
//!
//! # Example
//!
//! ```rust,ignore
//! use chia_api::{ChiaApi, ClientConfig};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> chia_api::Result<()> {
//!     let api = ChiaApi::new();
//!     api.initialize_config(ClientConfig::from_chia_root("/home/farmer/.chia/mainnet")?);
//!
//!     // One-shot request
//!     let wallets = api.fetch("getWallets", &json!({})).await?;
//!     println!("{}", wallets);
//!
//!     // Cached query kept current by wallet events
//!     let balance = api.query("getWalletBalance", json!({ "wallet_id": 1 }))?;
//!     balance.settled().await;
//!     println!("{:?}", balance.data());
//!
//!     Ok(())
//! }
//! ```

pub mod base_query;
pub mod cache;
pub mod config;
pub mod endpoints;
pub mod error;
pub mod hooks;
pub mod invalidation;
pub mod registry;
pub mod services;
pub mod subscription;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod transport;

mod api;

// Re-export commonly used types
pub use api::{ChiaApi, ChiaApiBuilder, QuerySubscription};
pub use base_query::{
    BaseQuery, EventSource, QueryMeta, QueryResult, Reply, RequestDescriptor, Target,
};
pub use cache::{CacheEntry, CacheTag, QueryCache, QueryKey, QueryState, QueryStatus};
pub use config::{ClientConfig, ClientDefaults};
pub use endpoints::{Endpoint, EndpointKind, Tag};
pub use error::{ChiaError, Result};
pub use invalidation::{
    on_cache_entry_added_invalidate, Invalidation, InvalidationAction, LifecycleContext,
    LifecycleReport, RefetchArgs, RefetchDispatch, RefetchTarget, SkipRule, UpdateRule,
};
pub use registry::ServiceRegistry;
pub use services::ServiceHandle;
pub use subscription::{EventCallback, Unsubscribe};
