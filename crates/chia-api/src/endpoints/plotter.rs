//! Plotter queue queries and mutations. All plotter traffic goes through the daemon.

use super::{service, Endpoint, Tag};
use crate::invalidation::{Invalidation, UpdateRule};
use crate::services::ServiceHandle::Plotter;
use serde_json::json;

pub(super) fn endpoints() -> Vec<Endpoint> {
    vec![
        // Registering as the plotter consumer returns the current queue.
        Endpoint::query("getPlotQueue", service(Plotter), "registerService")
            .params(&["service"])
            .default_arg("service", json!("chia_plotter"))
            .pick("queue")
            .provides(Tag::kind("PlotQueue"))
            .invalidate_on(Invalidation::update(
                service(Plotter),
                "onQueueChanged",
                UpdateRule::ReplaceWithField("queue".into()),
            )),
        Endpoint::query("getPlotters", service(Plotter), "getPlotters")
            .pick("plotters")
            .provides(Tag::kind("Plotters")),
        Endpoint::mutation("startPlotting", service(Plotter), "startPlotting")
            .invalidates(Tag::kind("PlotQueue")),
        Endpoint::mutation("stopPlotting", service(Plotter), "stopPlotting")
            .params(&["id"])
            .invalidates(Tag::kind("PlotQueue")),
    ]
}
