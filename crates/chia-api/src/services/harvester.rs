//! `chia_harvester` commands and pushes.

use super::{CommandSpec, EventSpec};

pub(super) const COMMANDS: &[CommandSpec] = &[
    CommandSpec::new("getPlots", "get_plots", &[]),
    CommandSpec::new("getPlotDirectories", "get_plot_directories", &[]),
    CommandSpec::new("addPlotDirectory", "add_plot_directory", &["dirname"]),
    CommandSpec::new("removePlotDirectory", "remove_plot_directory", &["dirname"]),
    CommandSpec::new("deletePlot", "delete_plot", &["filename"]),
    CommandSpec::new("refreshPlots", "refresh_plots", &[]),
];

pub(super) const EVENTS: &[EventSpec] = &[
    EventSpec::command("onRefreshPlots", "get_plots"),
    EventSpec::command("onConnections", "get_connections"),
];
