//! Farmer queries and mutations.

use super::{service, Endpoint, Tag};
use crate::invalidation::{Invalidation, UpdateRule};
use crate::services::ServiceHandle::Farmer;

pub(super) fn endpoints() -> Vec<Endpoint> {
    vec![
        Endpoint::query("getHarvesters", service(Farmer), "getHarvesters")
            .pick("harvesters")
            .provides(Tag::kind("Harvesters"))
            .invalidate_on(Invalidation::service_refetch(Farmer, "onHarvesterUpdate", "getHarvesters"))
            .invalidate_on(Invalidation::service_refetch(Farmer, "onHarvesterRemoved", "getHarvesters")),
        Endpoint::query("getSignagePoints", service(Farmer), "getSignagePoints")
            .pick("signage_points")
            .provides(Tag::kind("SignagePoints"))
            .invalidate_on(Invalidation::service_refetch(Farmer, "onNewSignagePoint", "getSignagePoints")),
        Endpoint::query("getRewardTargets", service(Farmer), "getRewardTargets")
            .params(&["search_for_private_key"])
            .provides(Tag::kind("RewardTargets")),
        Endpoint::mutation("setRewardTargets", service(Farmer), "setRewardTargets")
            .params(&["farmer_target", "pool_target"])
            .invalidates(Tag::kind("RewardTargets")),
        Endpoint::query("getPoolState", service(Farmer), "getPoolState")
            .pick("pool_state")
            .provides(Tag::kind("PoolState"))
            .invalidate_on(Invalidation::service_refetch(Farmer, "onNewFarmingInfo", "getPoolState")),
        Endpoint::query("getFarmerConnections", service(Farmer), "getConnections")
            .pick("connections")
            .provides(Tag::kind("FarmerConnections"))
            .invalidate_on(Invalidation::update(
                service(Farmer),
                "onConnections",
                UpdateRule::ReplaceWithField("connections".into()),
            )),
    ]
}
