//! Plotting commands.
//!
//! Plotting is run by the daemon itself, so every command is routed to
//! `daemon` while queue updates arrive with origin `chia_plotter`.

use super::{CommandSpec, EventSpec};

pub(super) const COMMANDS: &[CommandSpec] = &[
    CommandSpec::new("registerService", "register_service", &["service"]).via("daemon"),
    CommandSpec::new("getPlotters", "get_plotters", &[]).via("daemon"),
    CommandSpec::new("startPlotting", "start_plotting", &[]).via("daemon"),
    CommandSpec::new("stopPlotting", "stop_plotting", &["id"]).via("daemon"),
];

pub(super) const EVENTS: &[EventSpec] = &[
    EventSpec::state("onQueueChanged", "state_changed"),
    EventSpec::state("onLogChanged", "log_changed"),
];
