//! Harvester queries and mutations.

use super::{service, Endpoint, Tag};
use crate::invalidation::{Invalidation, UpdateRule};
use crate::services::ServiceHandle::Harvester;

pub(super) fn endpoints() -> Vec<Endpoint> {
    vec![
        Endpoint::query("getPlots", service(Harvester), "getPlots")
            .provides(Tag::kind("Plots"))
            .invalidate_on(Invalidation::update(
                service(Harvester),
                "onRefreshPlots",
                UpdateRule::Merge,
            )),
        Endpoint::query("getPlotDirectories", service(Harvester), "getPlotDirectories")
            .pick("directories")
            .provides(Tag::kind("PlotDirectories")),
        Endpoint::mutation("addPlotDirectory", service(Harvester), "addPlotDirectory")
            .params(&["dirname"])
            .invalidates(Tag::kind("PlotDirectories"))
            .invalidates(Tag::kind("Plots")),
        Endpoint::mutation("removePlotDirectory", service(Harvester), "removePlotDirectory")
            .params(&["dirname"])
            .invalidates(Tag::kind("PlotDirectories"))
            .invalidates(Tag::kind("Plots")),
        Endpoint::mutation("deletePlot", service(Harvester), "deletePlot")
            .params(&["filename"])
            .invalidates(Tag::kind("Plots")),
        Endpoint::mutation("refreshPlots", service(Harvester), "refreshPlots")
            .invalidates(Tag::kind("Plots")),
        Endpoint::query("getHarvesterConnections", service(Harvester), "getConnections")
            .pick("connections")
            .provides(Tag::kind("HarvesterConnections"))
            .invalidate_on(Invalidation::update(
                service(Harvester),
                "onConnections",
                UpdateRule::ReplaceWithField("connections".into()),
            )),
    ]
}
