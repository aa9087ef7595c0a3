//! Daemon service control, keyring and version endpoints.

use super::{service, Endpoint, Tag};
use crate::invalidation::{Invalidation, UpdateRule};
use crate::services::ServiceHandle::Daemon;

pub(super) fn endpoints() -> Vec<Endpoint> {
    vec![
        Endpoint::query("isServiceRunning", service(Daemon), "isRunning")
            .params(&["service"])
            .pick("is_running")
            .provides(Tag::by("ServiceRunning", "service")),
        Endpoint::query("getRunningServices", service(Daemon), "runningServices")
            .pick("running_services")
            .provides(Tag::kind("ServiceRunning")),
        Endpoint::mutation("startService", service(Daemon), "startService")
            .params(&["service", "testing"])
            .invalidates(Tag::by("ServiceRunning", "service")),
        Endpoint::mutation("stopService", service(Daemon), "stopService")
            .params(&["service"])
            .invalidates(Tag::by("ServiceRunning", "service")),
        Endpoint::query("getKeys", service(Daemon), "getKeys")
            .params(&["include_secrets"])
            .pick("keys")
            .provides(Tag::kind("DaemonKeys")),
        Endpoint::query("getKeyringStatus", service(Daemon), "getKeyringStatus")
            .provides(Tag::kind("KeyringStatus"))
            .invalidate_on(Invalidation::update(
                service(Daemon),
                "onKeyringStatusChanged",
                UpdateRule::Merge,
            )),
        Endpoint::mutation("unlockKeyring", service(Daemon), "unlockKeyring")
            .params(&["key"])
            .invalidates(Tag::kind("KeyringStatus"))
            .invalidates(Tag::kind("DaemonKeys")),
        Endpoint::query("getVersion", service(Daemon), "getVersion").pick("version"),
        Endpoint::query("getDaemonStatus", service(Daemon), "getStatus")
            .provides(Tag::kind("DaemonStatus")),
    ]
}
