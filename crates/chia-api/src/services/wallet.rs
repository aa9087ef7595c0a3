//! `chia_wallet` commands and pushes.

use super::{CommandSpec, EventSpec};

pub(super) const COMMANDS: &[CommandSpec] = &[
    CommandSpec::new("getLoggedInFingerprint", "get_logged_in_fingerprint", &[]),
    CommandSpec::new("logIn", "log_in", &["fingerprint"]),
    CommandSpec::new("getPublicKeys", "get_public_keys", &[]),
    CommandSpec::new("getWallets", "get_wallets", &["include_data"]),
    CommandSpec::new("getWalletBalance", "get_wallet_balance", &["wallet_id"]),
    CommandSpec::new(
        "getTransactions",
        "get_transactions",
        &["wallet_id", "start", "end", "sort_key", "reverse"],
    ),
    CommandSpec::new("getTransaction", "get_transaction", &["transaction_id"]),
    CommandSpec::new("getSyncStatus", "get_sync_status", &[]),
    CommandSpec::new("getHeightInfo", "get_height_info", &[]),
    CommandSpec::new("getNetworkInfo", "get_network_info", &[]),
    CommandSpec::new("getNextAddress", "get_next_address", &["wallet_id", "new_address"]),
    CommandSpec::new(
        "sendTransaction",
        "send_transaction",
        &["wallet_id", "amount", "fee", "address", "memos"],
    ),
    CommandSpec::new(
        "deleteUnconfirmedTransactions",
        "delete_unconfirmed_transactions",
        &["wallet_id"],
    ),
    CommandSpec::new("farmBlock", "farm_block", &["address"]),
];

pub(super) const EVENTS: &[EventSpec] = &[
    EventSpec::state("onCoinAdded", "coin_added"),
    EventSpec::state("onCoinRemoved", "coin_removed"),
    EventSpec::state("onSyncChanged", "sync_changed"),
    EventSpec::state("onNewBlock", "new_block"),
    EventSpec::state("onNewPeak", "new_peak"),
    EventSpec::state("onPendingTransaction", "pending_transaction"),
    EventSpec::state("onTransactionUpdate", "tx_update"),
    EventSpec::state("onWalletCreated", "wallet_created"),
];
