//! Wallet queries and mutations.

use super::{service, Endpoint, Tag};
use crate::invalidation::{Invalidation, SkipRule, UpdateRule};
use crate::services::ServiceHandle::Wallet;
use serde_json::{json, Value};
use std::sync::Arc;

fn same_wallet() -> SkipRule {
    SkipRule::field_mismatch("wallet_id", "wallet_id")
}

/// `tx_update` pushes carry the transaction under `additional_data`.
fn pushed_transaction(payload: &Value) -> Option<&Value> {
    payload.get("additional_data")?.get("transaction")
}

pub(super) fn endpoints() -> Vec<Endpoint> {
    vec![
        Endpoint::query("getLoggedInFingerprint", service(Wallet), "getLoggedInFingerprint")
            .pick("fingerprint")
            .provides(Tag::kind("LoggedInFingerprint")),
        Endpoint::mutation("logIn", service(Wallet), "logIn")
            .params(&["fingerprint"])
            .invalidates(Tag::kind("LoggedInFingerprint"))
            .invalidates(Tag::kind("Wallets"))
            .invalidates(Tag::kind("Transactions")),
        Endpoint::query("getPublicKeys", service(Wallet), "getPublicKeys")
            .pick("public_key_fingerprints")
            .provides(Tag::kind("Keys")),
        Endpoint::query("getWallets", service(Wallet), "getWallets")
            .params(&["include_data"])
            .pick("wallets")
            .provides(Tag::kind("Wallets"))
            .invalidate_on(Invalidation::service_refetch(Wallet, "onWalletCreated", "getWallets")),
        Endpoint::query("getWalletBalance", service(Wallet), "getWalletBalance")
            .params(&["wallet_id"])
            .pick("wallet_balance")
            .provides(Tag::by("Wallets", "wallet_id"))
            .invalidate_on(
                Invalidation::service_refetch(Wallet, "onCoinAdded", "getWalletBalance")
                    .skip_if(same_wallet()),
            )
            .invalidate_on(
                Invalidation::service_refetch(Wallet, "onCoinRemoved", "getWalletBalance")
                    .skip_if(same_wallet()),
            )
            .invalidate_on(
                Invalidation::service_refetch(Wallet, "onPendingTransaction", "getWalletBalance")
                    .skip_if(same_wallet()),
            ),
        Endpoint::query("getTransactions", service(Wallet), "getTransactions")
            .params(&["wallet_id", "start", "end", "sort_key", "reverse"])
            .pick("transactions")
            .provides(Tag::by("Transactions", "wallet_id"))
            .invalidate_on(
                Invalidation::service_refetch(Wallet, "onCoinAdded", "getTransactions")
                    .skip_if(same_wallet()),
            )
            .invalidate_on(
                Invalidation::service_refetch(Wallet, "onCoinRemoved", "getTransactions")
                    .skip_if(same_wallet()),
            )
            .invalidate_on(
                Invalidation::service_refetch(Wallet, "onTransactionUpdate", "getTransactions")
                    .skip_if(same_wallet()),
            ),
        Endpoint::query("getTransaction", service(Wallet), "getTransaction")
            .params(&["transaction_id"])
            .pick("transaction")
            .provides(Tag::by("Transactions", "transaction_id"))
            .invalidate_on(
                Invalidation::update(
                    service(Wallet),
                    "onTransactionUpdate",
                    UpdateRule::Custom(Arc::new(|draft, payload, _| {
                        if let Some(transaction) = pushed_transaction(payload) {
                            *draft = transaction.clone();
                        }
                    })),
                )
                .skip_if(SkipRule::Custom(Arc::new(|_, payload, args| {
                    let name = pushed_transaction(payload).and_then(|tx| tx.get("name"));
                    name.is_none() || name != args.get("transaction_id")
                }))),
            ),
        Endpoint::query("getSyncStatus", service(Wallet), "getSyncStatus")
            .provides(Tag::kind("WalletSyncStatus"))
            .invalidate_on(Invalidation::service_refetch(Wallet, "onSyncChanged", "getSyncStatus"))
            .invalidate_on(Invalidation::service_refetch(Wallet, "onNewPeak", "getSyncStatus")),
        Endpoint::query("getHeightInfo", service(Wallet), "getHeightInfo")
            .pick("height")
            .provides(Tag::kind("WalletHeightInfo"))
            .invalidate_on(Invalidation::service_refetch(Wallet, "onSyncChanged", "getHeightInfo"))
            .invalidate_on(Invalidation::service_refetch(Wallet, "onNewPeak", "getHeightInfo")),
        Endpoint::query("getNetworkInfo", service(Wallet), "getNetworkInfo")
            .provides(Tag::kind("NetworkInfo")),
        Endpoint::query("getCurrentAddress", service(Wallet), "getNextAddress")
            .params(&["wallet_id", "new_address"])
            .default_arg("new_address", json!(false))
            .pick("address")
            .provides(Tag::by("Address", "wallet_id")),
        Endpoint::mutation("getNextAddress", service(Wallet), "getNextAddress")
            .params(&["wallet_id", "new_address"])
            .default_arg("new_address", json!(true))
            .pick("address")
            .invalidates(Tag::by("Address", "wallet_id")),
        Endpoint::mutation("sendTransaction", service(Wallet), "sendTransaction")
            .params(&["wallet_id", "amount", "fee", "address", "memos"])
            .invalidates(Tag::by("Transactions", "wallet_id"))
            .invalidates(Tag::by("Wallets", "wallet_id")),
        Endpoint::mutation(
            "deleteUnconfirmedTransactions",
            service(Wallet),
            "deleteUnconfirmedTransactions",
        )
        .params(&["wallet_id"])
        .invalidates(Tag::by("Transactions", "wallet_id")),
        Endpoint::mutation("farmBlock", service(Wallet), "farmBlock").params(&["address"]),
    ]
}
