//! Push-driven cache invalidation.
//!
//! An endpoint declares a list of [`Invalidation`] descriptors. For every cache
//! entry of that endpoint, [`on_cache_entry_added_invalidate`] waits for the
//! first successful load, opens one push subscription per descriptor and keeps
//! them open until the entry is removed. Each push either patches the cached
//! data in place or forces a refetch of some entry.
//!
//! # Lifecycle
//!
//! 1. Wait for `cache_data_loaded`. An entry removed before loading never subscribes.
//! 2. Subscribe all descriptors concurrently. A failed subscription is logged and
//!    recorded; the others stay active.
//! 3. Handle pushes as they arrive, in delivery order, without coalescing.
//! 4. On `cache_entry_removed`, release every handle. Each release runs inside
//!    its own panic boundary so one failure cannot leak the rest.
//!
//! Handles live in a [`SubscriptionScope`], which also releases them if the
//! lifecycle task is cancelled.

use crate::base_query::{EventSource, Target};
use crate::cache::CacheEntry;
use crate::services::ServiceHandle;
use crate::subscription::{EventCallback, Unsubscribe};
use crate::transport::client::panic_message;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use tracing::{debug, error, warn};

/// Custom update: `(draft, payload, args)`.
pub type UpdateFn = Arc<dyn Fn(&mut Value, &Value, &Value) + Send + Sync + 'static>;

/// Custom skip predicate: `(draft, payload, args) -> skip`.
pub type SkipFn = Arc<dyn Fn(&Value, &Value, &Value) -> bool + Send + Sync + 'static>;

/// How a push patches the cached data.
#[derive(Clone)]
pub enum UpdateRule {
    /// The payload becomes the data.
    Replace,
    /// `payload[field]` becomes the data, if present.
    ReplaceWithField(String),
    /// Payload object fields are written over the data object.
    Merge,
    Custom(UpdateFn),
}

impl UpdateRule {
    pub fn apply(&self, draft: &mut Value, payload: &Value, args: &Value) {
        match self {
            UpdateRule::Replace => *draft = payload.clone(),
            UpdateRule::ReplaceWithField(field) => {
                if let Some(value) = payload.get(field) {
                    *draft = value.clone();
                }
            }
            UpdateRule::Merge => match (draft.as_object_mut(), payload.as_object()) {
                (Some(target), Some(source)) => {
                    for (key, value) in source {
                        target.insert(key.clone(), value.clone());
                    }
                }
                _ => *draft = payload.clone(),
            },
            UpdateRule::Custom(update) => update(draft, payload, args),
        }
    }
}

impl fmt::Debug for UpdateRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateRule::Replace => write!(f, "Replace"),
            UpdateRule::ReplaceWithField(field) => write!(f, "ReplaceWithField({:?})", field),
            UpdateRule::Merge => write!(f, "Merge"),
            UpdateRule::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

/// When a push is ignored for an entry.
#[derive(Clone)]
pub enum SkipRule {
    /// Skip unless `payload[event_field]` equals `args[arg_field]`.
    FieldMismatch {
        event_field: String,
        arg_field: String,
    },
    Custom(SkipFn),
}

impl SkipRule {
    pub fn field_mismatch(event_field: impl Into<String>, arg_field: impl Into<String>) -> Self {
        SkipRule::FieldMismatch {
            event_field: event_field.into(),
            arg_field: arg_field.into(),
        }
    }

    pub fn should_skip(&self, draft: &Value, payload: &Value, args: &Value) -> bool {
        match self {
            SkipRule::FieldMismatch {
                event_field,
                arg_field,
            } => match (payload.get(event_field), args.get(arg_field)) {
                (Some(event), Some(arg)) => !loosely_equal(event, arg),
                _ => true,
            },
            SkipRule::Custom(skip) => skip(draft, payload, args),
        }
    }
}

impl fmt::Debug for SkipRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipRule::FieldMismatch {
                event_field,
                arg_field,
            } => f
                .debug_struct("FieldMismatch")
                .field("event_field", event_field)
                .field("arg_field", arg_field)
                .finish(),
            SkipRule::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

/// Ids travel as numbers in some payloads and as strings in others.
fn loosely_equal(a: &Value, b: &Value) -> bool {
    if a == b {
        return true;
    }
    match (a, b) {
        (Value::String(s), Value::Number(n)) | (Value::Number(n), Value::String(s)) => {
            *s == n.to_string()
        }
        _ => false,
    }
}

/// Arguments for a forced refetch.
#[derive(Debug, Clone, PartialEq)]
pub enum RefetchArgs {
    /// The arguments of the entry that received the push.
    Same,
    Fixed(Value),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RefetchTarget {
    pub endpoint: String,
    pub args: RefetchArgs,
}

impl RefetchTarget {
    pub fn same(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            args: RefetchArgs::Same,
        }
    }

    pub fn fixed(endpoint: impl Into<String>, args: Value) -> Self {
        Self {
            endpoint: endpoint.into(),
            args: RefetchArgs::Fixed(args),
        }
    }
}

#[derive(Debug, Clone)]
pub enum InvalidationAction {
    Update(UpdateRule),
    Refetch(RefetchTarget),
}

/// One push subscription kept open for the lifetime of a cache entry.
#[derive(Debug, Clone)]
pub struct Invalidation {
    pub source: Target,
    pub event: String,
    pub action: InvalidationAction,
    pub skip: Option<SkipRule>,
}

impl Invalidation {
    pub fn update(source: Target, event: impl Into<String>, rule: UpdateRule) -> Self {
        Self {
            source,
            event: event.into(),
            action: InvalidationAction::Update(rule),
            skip: None,
        }
    }

    pub fn refetch(source: Target, event: impl Into<String>, target: RefetchTarget) -> Self {
        Self {
            source,
            event: event.into(),
            action: InvalidationAction::Refetch(target),
            skip: None,
        }
    }

    /// Shorthand for a service push that refetches `endpoint` with the same arguments.
    pub fn service_refetch(
        handle: ServiceHandle,
        event: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self::refetch(Target::Service(handle), event, RefetchTarget::same(endpoint))
    }

    pub fn skip_if(mut self, rule: SkipRule) -> Self {
        self.skip = Some(rule);
        self
    }

    fn label(&self) -> String {
        format!("{}.{}", self.source, self.event)
    }
}

/// Issues forced refetches on behalf of a lifecycle task.
///
/// Implementations run the refetch in the background and return immediately.
pub trait RefetchDispatch: Send + Sync {
    fn force_refetch(&self, endpoint: &str, args: Value);
}

/// Collaborators of one lifecycle task.
#[derive(Clone)]
pub struct LifecycleContext {
    pub entry: Arc<CacheEntry>,
    pub source: Arc<dyn EventSource>,
    pub refetch: Arc<dyn RefetchDispatch>,
}

/// Outcome of a finished lifecycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LifecycleReport {
    pub subscribed: usize,
    /// Labels of descriptors whose subscription could not be set up.
    pub failed: Vec<String>,
    pub released: usize,
}

/// Subscription handles owned by one lifecycle, released together.
#[derive(Debug, Default)]
pub struct SubscriptionScope {
    handles: Vec<(String, Unsubscribe)>,
}

impl SubscriptionScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, label: impl Into<String>, handle: Unsubscribe) {
        self.handles.push((label.into(), handle));
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Release every handle and return how many releases completed.
    pub fn release_all(&mut self) -> usize {
        let mut released = 0;
        for (label, handle) in self.handles.drain(..) {
            match catch_unwind(AssertUnwindSafe(|| handle.unsubscribe())) {
                Ok(true) => released += 1,
                Ok(false) => debug!("Subscription {} was already released", label),
                Err(panic) => error!(
                    "Releasing subscription {} panicked: {}",
                    label,
                    panic_message(panic.as_ref())
                ),
            }
        }
        released
    }
}

impl Drop for SubscriptionScope {
    fn drop(&mut self) {
        if !self.handles.is_empty() {
            self.release_all();
        }
    }
}

/// Keep `descriptors` subscribed for the lifetime of `ctx.entry`.
pub async fn on_cache_entry_added_invalidate(
    ctx: LifecycleContext,
    descriptors: &[Invalidation],
) -> LifecycleReport {
    let key = ctx.entry.key().clone();

    if ctx.entry.cache_data_loaded().await.is_err() {
        debug!("{} removed before loading; no subscriptions opened", key);
        return LifecycleReport::default();
    }

    // Handles enter the scope as they resolve; an abort mid-setup releases them.
    let mut scope = SubscriptionScope::new();
    let mut report = LifecycleReport::default();

    let mut setups: FuturesUnordered<_> = descriptors
        .iter()
        .map(|descriptor| {
            let callback = event_handler(
                Arc::downgrade(&ctx.entry),
                descriptor.clone(),
                ctx.refetch.clone(),
            );
            let source = ctx.source.clone();
            async move {
                let result = source
                    .subscribe(descriptor.source, &descriptor.event, Vec::new(), callback)
                    .await;
                (descriptor.label(), result)
            }
        })
        .collect();

    while let Some((label, result)) = setups.next().await {
        match result {
            Ok(handle) => scope.push(label, handle),
            Err(e) => {
                warn!("Failed to subscribe {} for {}: {}", label, key, e);
                report.failed.push(label);
            }
        }
    }
    report.subscribed = scope.len();
    debug!("{} holds {} subscriptions", key, report.subscribed);

    ctx.entry.cache_entry_removed().await;

    report.released = scope.release_all();
    debug!("{} released {} subscriptions", key, report.released);
    report
}

fn event_handler(
    entry: Weak<CacheEntry>,
    descriptor: Invalidation,
    refetch: Arc<dyn RefetchDispatch>,
) -> EventCallback {
    Arc::new(move |payload: Value| {
        let Some(entry) = entry.upgrade() else {
            return;
        };
        let args = entry.args();

        if let Some(skip) = &descriptor.skip {
            let draft = entry.snapshot().data.unwrap_or(Value::Null);
            if skip.should_skip(&draft, &payload, args) {
                debug!("Skipping {} for {}", descriptor.event, entry.key());
                return;
            }
        }

        match &descriptor.action {
            InvalidationAction::Update(rule) => {
                entry.update_cached_data(|draft| rule.apply(draft, &payload, args));
            }
            InvalidationAction::Refetch(target) => {
                let args = match &target.args {
                    RefetchArgs::Same => args.clone(),
                    RefetchArgs::Fixed(args) => args.clone(),
                };
                refetch.force_refetch(&target.endpoint, args);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::QueryKey;
    use crate::{ChiaError, Result};
    use serde_json::json;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeSource {
        callbacks: Mutex<Vec<(String, EventCallback)>>,
        failing: HashSet<String>,
        panicking: HashSet<String>,
        hanging: HashSet<String>,
        subscribed: AtomicUsize,
        released: Arc<AtomicUsize>,
    }

    impl FakeSource {
        fn failing(events: &[&str]) -> Self {
            Self {
                failing: events.iter().map(|e| e.to_string()).collect(),
                ..Default::default()
            }
        }

        fn emit(&self, event: &str, payload: Value) {
            let callbacks: Vec<EventCallback> = self
                .callbacks
                .lock()
                .unwrap()
                .iter()
                .filter(|(name, _)| name == event)
                .map(|(_, callback)| callback.clone())
                .collect();
            for callback in callbacks {
                callback(payload.clone());
            }
        }
    }

    #[async_trait::async_trait]
    impl EventSource for FakeSource {
        async fn subscribe(
            &self,
            _target: Target,
            event: &str,
            _args: Vec<Value>,
            callback: EventCallback,
        ) -> Result<Unsubscribe> {
            if self.failing.contains(event) {
                return Err(ChiaError::Disconnected);
            }
            if self.hanging.contains(event) {
                std::future::pending::<()>().await;
            }
            self.callbacks
                .lock()
                .unwrap()
                .push((event.to_string(), callback));
            self.subscribed.fetch_add(1, Ordering::SeqCst);

            let released = self.released.clone();
            let panics = self.panicking.contains(event);
            Ok(Unsubscribe::new(move || {
                if panics {
                    panic!("release failed");
                }
                released.fetch_add(1, Ordering::SeqCst);
            }))
        }
    }

    #[derive(Default)]
    struct FakeRefetch {
        calls: Mutex<Vec<(String, Value)>>,
    }

    impl RefetchDispatch for FakeRefetch {
        fn force_refetch(&self, endpoint: &str, args: Value) {
            self.calls.lock().unwrap().push((endpoint.to_string(), args));
        }
    }

    fn loaded_entry(args: Value, data: Value) -> Arc<CacheEntry> {
        let entry = Arc::new(CacheEntry::new(
            QueryKey::new("getWalletBalance", &args),
            args,
            Vec::new(),
        ));
        let id = entry.begin_fetch();
        entry.complete_fetch(id, Ok(data));
        entry
    }

    async fn wait_for_subscriptions(source: &FakeSource, count: usize) {
        while source.subscribed.load(Ordering::SeqCst) < count {
            tokio::task::yield_now().await;
        }
    }

    const WALLET: Target = Target::Service(ServiceHandle::Wallet);

    #[tokio::test]
    async fn test_update_then_release_once_per_subscription() {
        let entry = loaded_entry(json!({"wallet_id": 1}), json!({"confirmed": 0}));
        let source = Arc::new(FakeSource::default());
        let refetch = Arc::new(FakeRefetch::default());
        let descriptors = vec![
            Invalidation::update(WALLET, "onCoinAdded", UpdateRule::Merge),
            Invalidation::refetch(
                WALLET,
                "onCoinRemoved",
                RefetchTarget::same("getWalletBalance"),
            ),
        ];

        let ctx = LifecycleContext {
            entry: entry.clone(),
            source: source.clone(),
            refetch: refetch.clone(),
        };
        let task = tokio::spawn(async move { on_cache_entry_added_invalidate(ctx, &descriptors).await });

        wait_for_subscriptions(&source, 2).await;
        source.emit("onCoinAdded", json!({"confirmed": 5}));
        assert_eq!(entry.snapshot().data, Some(json!({"confirmed": 5})));

        source.emit("onCoinRemoved", json!({}));
        source.emit("onCoinRemoved", json!({}));
        assert_eq!(refetch.calls.lock().unwrap().len(), 2);
        assert_eq!(
            refetch.calls.lock().unwrap()[0],
            ("getWalletBalance".to_string(), json!({"wallet_id": 1}))
        );

        entry.mark_removed();
        let report = task.await.unwrap();
        assert_eq!(report.subscribed, 2);
        assert_eq!(report.released, 2);
        assert_eq!(source.released.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_skip_on_id_mismatch() {
        let entry = loaded_entry(json!({"wallet_id": 1}), json!({"confirmed": 0}));
        let source = Arc::new(FakeSource::default());
        let refetch = Arc::new(FakeRefetch::default());
        let skip = SkipRule::field_mismatch("wallet_id", "wallet_id");
        let descriptors = vec![
            Invalidation::update(WALLET, "onCoinAdded", UpdateRule::Replace)
                .skip_if(skip.clone()),
            Invalidation::refetch(
                WALLET,
                "onTransactionUpdate",
                RefetchTarget::same("getWalletBalance"),
            )
            .skip_if(skip),
        ];

        let ctx = LifecycleContext {
            entry: entry.clone(),
            source: source.clone(),
            refetch: refetch.clone(),
        };
        let task = tokio::spawn(async move { on_cache_entry_added_invalidate(ctx, &descriptors).await });
        wait_for_subscriptions(&source, 2).await;

        source.emit("onCoinAdded", json!({"wallet_id": 2, "confirmed": 9}));
        source.emit("onTransactionUpdate", json!({"wallet_id": 2}));
        assert_eq!(entry.snapshot().data, Some(json!({"confirmed": 0})));
        assert!(refetch.calls.lock().unwrap().is_empty());

        source.emit("onTransactionUpdate", json!({"wallet_id": "1"}));
        assert_eq!(refetch.calls.lock().unwrap().len(), 1);

        entry.mark_removed();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_partial_subscribe_failure_keeps_others() {
        let entry = loaded_entry(json!({}), json!({"height": 1}));
        let source = Arc::new(FakeSource::failing(&["onSyncChanged"]));
        let descriptors = vec![
            Invalidation::update(WALLET, "onNewPeak", UpdateRule::Merge),
            Invalidation::update(WALLET, "onSyncChanged", UpdateRule::Merge),
        ];

        let ctx = LifecycleContext {
            entry: entry.clone(),
            source: source.clone(),
            refetch: Arc::new(FakeRefetch::default()),
        };
        let task = tokio::spawn(async move { on_cache_entry_added_invalidate(ctx, &descriptors).await });
        wait_for_subscriptions(&source, 1).await;

        source.emit("onNewPeak", json!({"height": 2}));
        assert_eq!(entry.snapshot().data, Some(json!({"height": 2})));

        entry.mark_removed();
        let report = task.await.unwrap();
        assert_eq!(report.subscribed, 1);
        assert_eq!(report.failed, vec!["chia_wallet.onSyncChanged".to_string()]);
        assert_eq!(report.released, 1);
    }

    #[tokio::test]
    async fn test_removed_before_load_never_subscribes() {
        let entry = Arc::new(CacheEntry::new(
            QueryKey::new("getWallets", &Value::Null),
            Value::Null,
            Vec::new(),
        ));
        let source = Arc::new(FakeSource::default());
        let descriptors = vec![Invalidation::update(
            WALLET,
            "onWalletCreated",
            UpdateRule::Replace,
        )];

        entry.mark_removed();
        let ctx = LifecycleContext {
            entry,
            source: source.clone(),
            refetch: Arc::new(FakeRefetch::default()),
        };
        let report = on_cache_entry_added_invalidate(ctx, &descriptors).await;

        assert_eq!(report, LifecycleReport::default());
        assert_eq!(source.subscribed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_abort_during_setup_releases_open_subscriptions() {
        let entry = loaded_entry(json!({"wallet_id": 1}), json!({"confirmed": 0}));
        let source = Arc::new(FakeSource {
            hanging: ["onSyncChanged".to_string()].into_iter().collect(),
            ..Default::default()
        });
        let descriptors = vec![
            Invalidation::update(WALLET, "onCoinAdded", UpdateRule::Merge),
            Invalidation::update(WALLET, "onSyncChanged", UpdateRule::Merge),
        ];

        let ctx = LifecycleContext {
            entry,
            source: source.clone(),
            refetch: Arc::new(FakeRefetch::default()),
        };
        let task = tokio::spawn(async move { on_cache_entry_added_invalidate(ctx, &descriptors).await });
        wait_for_subscriptions(&source, 1).await;

        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());
        assert_eq!(source.subscribed.load(Ordering::SeqCst), 1);
        assert_eq!(source.released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_field_mismatch_coerces_numbers_only() {
        let rule = SkipRule::field_mismatch("wallet_id", "wallet_id");
        let draft = Value::Null;

        assert!(!rule.should_skip(&draft, &json!({"wallet_id": "1"}), &json!({"wallet_id": 1})));
        assert!(!rule.should_skip(&draft, &json!({"wallet_id": 1}), &json!({"wallet_id": "1"})));
        assert!(rule.should_skip(&draft, &json!({"wallet_id": "null"}), &json!({"wallet_id": null})));
        assert!(rule.should_skip(&draft, &json!({"wallet_id": "true"}), &json!({"wallet_id": true})));
        assert!(rule.should_skip(&draft, &json!({}), &json!({"wallet_id": 1})));
    }

    #[test]
    fn test_panicking_release_does_not_leak_others() {
        let released = Arc::new(AtomicUsize::new(0));
        let mut scope = SubscriptionScope::new();
        for label in ["first", "second", "third"] {
            let counter = released.clone();
            let panics = label == "second";
            scope.push(
                label,
                Unsubscribe::new(move || {
                    if panics {
                        panic!("release failed");
                    }
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            );
        }

        assert_eq!(scope.release_all(), 2);
        assert_eq!(released.load(Ordering::SeqCst), 2);
        assert!(scope.is_empty());
    }

    #[test]
    fn test_dropping_scope_releases() {
        let released = Arc::new(AtomicUsize::new(0));
        {
            let mut scope = SubscriptionScope::new();
            let counter = released.clone();
            scope.push("only", Unsubscribe::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }));
        }
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_update_rules() {
        let mut draft = json!({"a": 1, "b": 2});
        UpdateRule::Merge.apply(&mut draft, &json!({"b": 3}), &Value::Null);
        assert_eq!(draft, json!({"a": 1, "b": 3}));

        UpdateRule::ReplaceWithField("wallets".into()).apply(
            &mut draft,
            &json!({"wallets": [1]}),
            &Value::Null,
        );
        assert_eq!(draft, json!([1]));

        let append: UpdateFn = Arc::new(|draft, payload, _| {
            if let Some(list) = draft.as_array_mut() {
                list.push(payload.clone());
            }
        });
        UpdateRule::Custom(append).apply(&mut draft, &json!(2), &Value::Null);
        assert_eq!(draft, json!([1, 2]));
    }
}
