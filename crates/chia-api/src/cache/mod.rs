//! Query cache.
//!
//! Entries are keyed by endpoint name plus canonical arguments and carry their
//! fetch state and lifecycle phase. Consumers acquire and release entries; an
//! entry left without subscribers is removed after a grace period, which is
//! what ends its invalidation subscriptions.

mod entry;
mod store;

pub use entry::{CacheEntry, EntryPhase, QueryState, QueryStatus, RemovedBeforeLoad};
pub use store::QueryCache;

use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// Identity of one cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct QueryKey {
    pub endpoint: String,
    /// Arguments serialized with object keys in sorted order.
    pub args_canonical: String,
}

impl QueryKey {
    pub fn new(endpoint: impl Into<String>, args: &Value) -> Self {
        Self {
            endpoint: endpoint.into(),
            // serde_json maps are ordered by key, so equal arguments serialize equally.
            args_canonical: args.to_string(),
        }
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.endpoint, self.args_canonical)
    }
}

/// A tag provided by an entry or named by an invalidation.
///
/// Without an id the tag stands for every entity of its kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheTag {
    pub kind: String,
    pub id: Option<Value>,
}

impl CacheTag {
    pub fn kind(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: None,
        }
    }

    pub fn with_id(kind: impl Into<String>, id: Value) -> Self {
        Self {
            kind: kind.into(),
            id: Some(id),
        }
    }

    /// Whether invalidating `other` reaches an entry providing `self`.
    pub fn matches(&self, other: &CacheTag) -> bool {
        if self.kind != other.kind {
            return false;
        }
        match (&self.id, &other.id) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        }
    }
}
