//! Full node queries and mutations.

use super::{service, Endpoint, Tag};
use crate::invalidation::{Invalidation, UpdateRule};
use crate::services::ServiceHandle::FullNode;

pub(super) fn endpoints() -> Vec<Endpoint> {
    vec![
        Endpoint::query("getBlockchainState", service(FullNode), "getBlockchainState")
            .pick("blockchain_state")
            .provides(Tag::kind("BlockchainState"))
            .invalidate_on(Invalidation::update(
                service(FullNode),
                "onBlockchainState",
                UpdateRule::ReplaceWithField("blockchain_state".into()),
            )),
        Endpoint::query("getBlockRecords", service(FullNode), "getBlockRecords")
            .params(&["start", "end"])
            .pick("block_records")
            .provides(Tag::kind("BlockRecords"))
            .invalidate_on(Invalidation::service_refetch(
                FullNode,
                "onBlockchainState",
                "getBlockRecords",
            )),
        Endpoint::query("getBlockRecord", service(FullNode), "getBlockRecord")
            .params(&["header_hash"])
            .pick("block_record")
            .provides(Tag::by("BlockRecords", "header_hash")),
        Endpoint::query("getBlock", service(FullNode), "getBlock")
            .params(&["header_hash"])
            .pick("block")
            .provides(Tag::by("Blocks", "header_hash")),
        Endpoint::query("getFullNodeConnections", service(FullNode), "getConnections")
            .pick("connections")
            .provides(Tag::kind("FullNodeConnections"))
            .invalidate_on(Invalidation::update(
                service(FullNode),
                "onConnections",
                UpdateRule::ReplaceWithField("connections".into()),
            )),
        Endpoint::mutation("openFullNodeConnection", service(FullNode), "openConnection")
            .params(&["host", "port"])
            .invalidates(Tag::kind("FullNodeConnections")),
        Endpoint::mutation("closeFullNodeConnection", service(FullNode), "closeConnection")
            .params(&["node_id"])
            .invalidates(Tag::kind("FullNodeConnections")),
    ]
}
