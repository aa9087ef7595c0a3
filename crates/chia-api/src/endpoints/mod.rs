//! Declarative endpoint sets.
//!
//! An [`Endpoint`] names one query or mutation: which target and command it
//! runs, how its JSON arguments map onto positional command arguments, how the
//! response is reshaped, which cache tags it provides or invalidates and which
//! pushes keep its cache entries fresh.
//!
//! Endpoint arguments are a JSON object keyed by parameter name (or an array of
//! positional values, passed through unchanged). Missing parameters fall back to
//! the endpoint's defaults and trailing gaps are dropped.

mod client;
mod daemon;
mod farmer;
mod full_node;
mod harvester;
mod plotter;
mod wallet;

use crate::base_query::{RequestDescriptor, Target};
use crate::cache::CacheTag;
use crate::invalidation::Invalidation;
use crate::services::ServiceHandle;
use crate::Result;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Response reshaping applied before data enters the cache.
pub type TransformFn = Arc<dyn Fn(Value) -> Result<Value> + Send + Sync + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointKind {
    Query,
    Mutation,
}

/// Tag template, resolved against an entry's arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tag {
    pub kind: &'static str,
    /// Argument whose value becomes the tag id.
    pub id_arg: Option<&'static str>,
}

impl Tag {
    pub const fn kind(kind: &'static str) -> Self {
        Self { kind, id_arg: None }
    }

    pub const fn by(kind: &'static str, id_arg: &'static str) -> Self {
        Self {
            kind,
            id_arg: Some(id_arg),
        }
    }

    pub fn resolve(&self, args: &Value) -> CacheTag {
        match self.id_arg.and_then(|name| args.get(name)) {
            Some(id) if !id.is_null() => CacheTag::with_id(self.kind, id.clone()),
            _ => CacheTag::kind(self.kind),
        }
    }
}

#[derive(Clone)]
pub struct Endpoint {
    pub name: &'static str,
    pub kind: EndpointKind,
    pub target: Target,
    pub command: &'static str,
    pub params: &'static [&'static str],
    pub defaults: Vec<(&'static str, Value)>,
    pub provides: Vec<Tag>,
    pub invalidates: Vec<Tag>,
    pub invalidations: Vec<Invalidation>,
    transform: Option<TransformFn>,
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("target", &self.target)
            .field("command", &self.command)
            .field("params", &self.params)
            .field("provides", &self.provides)
            .field("invalidates", &self.invalidates)
            .field("invalidations", &self.invalidations.len())
            .finish()
    }
}

impl Endpoint {
    pub fn query(name: &'static str, target: Target, command: &'static str) -> Self {
        Self::new(name, EndpointKind::Query, target, command)
    }

    pub fn mutation(name: &'static str, target: Target, command: &'static str) -> Self {
        Self::new(name, EndpointKind::Mutation, target, command)
    }

    fn new(name: &'static str, kind: EndpointKind, target: Target, command: &'static str) -> Self {
        Self {
            name,
            kind,
            target,
            command,
            params: &[],
            defaults: Vec::new(),
            provides: Vec::new(),
            invalidates: Vec::new(),
            invalidations: Vec::new(),
            transform: None,
        }
    }

    pub fn params(mut self, params: &'static [&'static str]) -> Self {
        self.params = params;
        self
    }

    /// Value used for `param` when the caller leaves it out.
    pub fn default_arg(mut self, param: &'static str, value: Value) -> Self {
        self.defaults.push((param, value));
        self
    }

    pub fn transform(mut self, transform: TransformFn) -> Self {
        self.transform = Some(transform);
        self
    }

    /// Keep only `response[field]` (`null` when absent).
    pub fn pick(self, field: &'static str) -> Self {
        self.transform(Arc::new(move |mut response: Value| {
            Ok(response
                .get_mut(field)
                .map(Value::take)
                .unwrap_or(Value::Null))
        }))
    }

    pub fn provides(mut self, tag: Tag) -> Self {
        self.provides.push(tag);
        self
    }

    pub fn invalidates(mut self, tag: Tag) -> Self {
        self.invalidates.push(tag);
        self
    }

    pub fn invalidate_on(mut self, invalidation: Invalidation) -> Self {
        self.invalidations.push(invalidation);
        self
    }

    /// Rewrite a bare scalar as `{first_param: scalar}` so cache keys, tags
    /// and the request all see the same named argument. Other shapes pass
    /// through unchanged.
    pub fn normalize_args(&self, args: Value) -> Value {
        match (self.params.first(), args) {
            (Some(first), scalar @ (Value::Bool(_) | Value::Number(_) | Value::String(_))) => {
                let mut named = serde_json::Map::new();
                named.insert((*first).to_string(), scalar);
                Value::Object(named)
            }
            (_, args) => args,
        }
    }

    /// Build the request for one set of arguments.
    pub fn request(&self, args: &Value) -> RequestDescriptor {
        let descriptor = RequestDescriptor {
            command: self.command.to_string(),
            target: self.target,
            args: Vec::new(),
            callback: None,
        };
        descriptor.args(self.positional_args(args))
    }

    fn positional_args(&self, args: &Value) -> Vec<Value> {
        if let Value::Array(values) = args {
            return values.clone();
        }
        if !self.params.is_empty() && !matches!(args, Value::Object(_) | Value::Null) {
            return self.positional_args(&self.normalize_args(args.clone()));
        }

        if self.params.is_empty() {
            return match args {
                Value::Null => Vec::new(),
                other => vec![other.clone()],
            };
        }

        let mut positional: Vec<Value> = self
            .params
            .iter()
            .map(|param| {
                args.get(*param)
                    .filter(|value| !value.is_null())
                    .or_else(|| self.default_for(param))
                    .cloned()
                    .unwrap_or(Value::Null)
            })
            .collect();

        while positional.last().is_some_and(Value::is_null) {
            positional.pop();
        }
        positional
    }

    fn default_for(&self, param: &str) -> Option<&Value> {
        self.defaults
            .iter()
            .find(|(name, _)| *name == param)
            .map(|(_, value)| value)
    }

    pub fn apply_transform(&self, response: Value) -> Result<Value> {
        match &self.transform {
            Some(transform) => transform(response),
            None => Ok(response),
        }
    }

    pub fn provided_tags(&self, args: &Value) -> Vec<CacheTag> {
        self.provides.iter().map(|tag| tag.resolve(args)).collect()
    }

    pub fn invalidated_tags(&self, args: &Value) -> Vec<CacheTag> {
        self.invalidates.iter().map(|tag| tag.resolve(args)).collect()
    }
}

pub(crate) fn service(handle: ServiceHandle) -> Target {
    Target::Service(handle)
}

pub fn wallet() -> Vec<Endpoint> {
    wallet::endpoints()
}

pub fn full_node() -> Vec<Endpoint> {
    full_node::endpoints()
}

pub fn farmer() -> Vec<Endpoint> {
    farmer::endpoints()
}

pub fn harvester() -> Vec<Endpoint> {
    harvester::endpoints()
}

pub fn plotter() -> Vec<Endpoint> {
    plotter::endpoints()
}

pub fn daemon() -> Vec<Endpoint> {
    daemon::endpoints()
}

pub fn client() -> Vec<Endpoint> {
    client::endpoints()
}

/// Every endpoint of every set.
pub fn all() -> Vec<Endpoint> {
    let mut endpoints = wallet();
    endpoints.extend(full_node());
    endpoints.extend(farmer());
    endpoints.extend(harvester());
    endpoints.extend(plotter());
    endpoints.extend(daemon());
    endpoints.extend(client());
    endpoints
}
