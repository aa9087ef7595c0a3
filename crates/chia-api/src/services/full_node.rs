//! `chia_full_node` commands and pushes.

use super::{CommandSpec, EventSpec};

pub(super) const COMMANDS: &[CommandSpec] = &[
    CommandSpec::new("getBlockchainState", "get_blockchain_state", &[]),
    CommandSpec::new("getBlockRecords", "get_block_records", &["start", "end"]),
    CommandSpec::new("getBlockRecord", "get_block_record", &["header_hash"]),
    CommandSpec::new("getBlock", "get_block", &["header_hash"]),
    CommandSpec::new("getConnections", "get_connections", &[]),
    CommandSpec::new("openConnection", "open_connection", &["host", "port"]),
    CommandSpec::new("closeConnection", "close_connection", &["node_id"]),
];

// The full node pushes fresh copies of its state under the query command names.
pub(super) const EVENTS: &[EventSpec] = &[
    EventSpec::command("onBlockchainState", "get_blockchain_state"),
    EventSpec::command("onConnections", "get_connections"),
    EventSpec::command("onNewBlock", "block"),
];
