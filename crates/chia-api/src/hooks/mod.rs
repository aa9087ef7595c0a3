//! Client-side aggregation built on top of base queries.
//!
//! - [`plots`]: merge per-harvester plot lists
//! - [`timestamp`]: rolling maximum over recent records
//! - [`throttle`]: rate-limit change notifications of a query
//! - [`service`]: keep a daemon service running or stopped

pub mod plots;
pub mod service;
pub mod throttle;
pub mod timestamp;

pub use plots::{merge_harvesters, HarvesterPlot, PlotFile, PlotsSummary};
pub use service::{
    Correction, DesiredState, ReconcilerHandle, ServiceControl, ServiceReconciler, ServiceStatus,
};
pub use throttle::{throttle, ThrottleOptions, ThrottleState};
pub use timestamp::LatestTimestamp;
