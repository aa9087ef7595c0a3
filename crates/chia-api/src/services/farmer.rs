//! `chia_farmer` commands and pushes.

use super::{CommandSpec, EventSpec};

pub(super) const COMMANDS: &[CommandSpec] = &[
    CommandSpec::new("getHarvesters", "get_harvesters", &[]),
    CommandSpec::new("getSignagePoints", "get_signage_points", &[]),
    CommandSpec::new("getRewardTargets", "get_reward_targets", &["search_for_private_key"]),
    CommandSpec::new("setRewardTargets", "set_reward_targets", &["farmer_target", "pool_target"]),
    CommandSpec::new("getPoolState", "get_pool_state", &[]),
    CommandSpec::new("getConnections", "get_connections", &[]),
];

pub(super) const EVENTS: &[EventSpec] = &[
    EventSpec::command("onNewSignagePoint", "new_signage_point"),
    EventSpec::command("onNewFarmingInfo", "new_farming_info"),
    EventSpec::command("onHarvesterUpdate", "harvester_update"),
    EventSpec::command("onHarvesterRemoved", "harvester_removed"),
    EventSpec::command("onConnections", "get_connections"),
];
