use super::{CacheTag, QueryKey};
use crate::ChiaError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStatus {
    #[default]
    Uninitialized,
    Pending,
    Fulfilled,
    Rejected,
}

/// Observable state of one cache entry.
#[derive(Debug, Clone, Default)]
pub struct QueryState {
    /// Last successful result, kept across later failures.
    pub data: Option<Value>,
    /// Error of the most recent fetch, cleared on success.
    pub error: Option<Arc<ChiaError>>,
    pub status: QueryStatus,
    pub is_fetching: bool,
    pub fulfilled_at: Option<DateTime<Utc>>,
}

impl QueryState {
    /// First fetch still running.
    pub fn is_loading(&self) -> bool {
        self.data.is_none() && self.is_fetching
    }

    pub fn is_success(&self) -> bool {
        self.status == QueryStatus::Fulfilled
    }

    pub fn is_error(&self) -> bool {
        self.status == QueryStatus::Rejected
    }

    /// A fetch has completed, successfully or not.
    pub fn is_settled(&self) -> bool {
        !self.is_fetching && self.status != QueryStatus::Uninitialized
    }
}

/// Lifecycle of a cache entry. Only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EntryPhase {
    Created,
    Loaded,
    Removed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cache entry was removed before its data loaded")]
pub struct RemovedBeforeLoad;

/// One cached query result and its lifecycle signals.
#[derive(Debug)]
pub struct CacheEntry {
    key: QueryKey,
    args: Value,
    provides: Vec<CacheTag>,
    state: watch::Sender<QueryState>,
    phase: watch::Sender<EntryPhase>,
    latest_fetch: AtomicU64,
}

impl CacheEntry {
    pub(crate) fn new(key: QueryKey, args: Value, provides: Vec<CacheTag>) -> Self {
        let (state, _) = watch::channel(QueryState::default());
        let (phase, _) = watch::channel(EntryPhase::Created);
        Self {
            key,
            args,
            provides,
            state,
            phase,
            latest_fetch: AtomicU64::new(0),
        }
    }

    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    pub fn args(&self) -> &Value {
        &self.args
    }

    pub fn provides(&self) -> &[CacheTag] {
        &self.provides
    }

    pub fn snapshot(&self) -> QueryState {
        self.state.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<QueryState> {
        self.state.subscribe()
    }

    pub fn phase(&self) -> EntryPhase {
        *self.phase.borrow()
    }

    /// Resolves once the first fetch succeeded.
    ///
    /// Fails if the entry is removed first.
    pub async fn cache_data_loaded(&self) -> Result<(), RemovedBeforeLoad> {
        let mut phase = self.phase.subscribe();
        let reached = phase
            .wait_for(|phase| *phase != EntryPhase::Created)
            .await
            .map(|phase| *phase)
            .unwrap_or(EntryPhase::Removed);

        match reached {
            EntryPhase::Loaded => Ok(()),
            _ => Err(RemovedBeforeLoad),
        }
    }

    /// Resolves once the entry has been removed from the cache.
    pub async fn cache_entry_removed(&self) {
        let mut phase = self.phase.subscribe();
        let _ = phase.wait_for(|phase| *phase == EntryPhase::Removed).await;
    }

    /// Mutate the cached data in place.
    ///
    /// Does nothing (and returns `false`) while there is no data.
    pub fn update_cached_data(&self, mutate: impl FnOnce(&mut Value)) -> bool {
        self.state.send_if_modified(|state| match state.data.as_mut() {
            Some(draft) => {
                mutate(draft);
                true
            }
            None => false,
        })
    }

    /// Mark a fetch as started and return its id.
    pub(crate) fn begin_fetch(&self) -> u64 {
        let id = self.latest_fetch.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.send_modify(|state| {
            state.is_fetching = true;
            if state.status == QueryStatus::Uninitialized {
                state.status = QueryStatus::Pending;
            }
        });
        id
    }

    /// Store the outcome of fetch `id`. Outcomes of superseded fetches are dropped.
    pub(crate) fn complete_fetch(&self, id: u64, outcome: crate::Result<Value>) {
        if self.latest_fetch.load(Ordering::SeqCst) != id {
            debug!("Dropping superseded result for {}", self.key);
            return;
        }

        let succeeded = outcome.is_ok();
        self.state.send_modify(|state| {
            state.is_fetching = false;
            match outcome {
                Ok(data) => {
                    state.data = Some(data);
                    state.error = None;
                    state.status = QueryStatus::Fulfilled;
                    state.fulfilled_at = Some(Utc::now());
                }
                Err(e) => {
                    state.error = Some(Arc::new(e));
                    state.status = QueryStatus::Rejected;
                }
            }
        });

        if succeeded {
            self.phase.send_if_modified(|phase| {
                if *phase == EntryPhase::Created {
                    *phase = EntryPhase::Loaded;
                    true
                } else {
                    false
                }
            });
        }
    }

    pub(crate) fn mark_removed(&self) {
        self.phase.send_replace(EntryPhase::Removed);
    }
}
