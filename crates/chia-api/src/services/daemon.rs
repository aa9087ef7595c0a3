//! Commands served by the daemon process itself.

use super::{CommandSpec, EventSpec};

pub(super) const COMMANDS: &[CommandSpec] = &[
    CommandSpec::new("isRunning", "is_running", &["service"]),
    CommandSpec::new("runningServices", "running_services", &[]),
    CommandSpec::new("startService", "start_service", &["service", "testing"]),
    CommandSpec::new("stopService", "stop_service", &["service"]),
    CommandSpec::new("getKeys", "get_keys", &["include_secrets"]),
    CommandSpec::new("getKeyringStatus", "keyring_status", &[]),
    CommandSpec::new("unlockKeyring", "unlock_keyring", &["key"]),
    CommandSpec::new("getVersion", "get_version", &[]),
    CommandSpec::new("getStatus", "get_status", &[]),
];

pub(super) const EVENTS: &[EventSpec] = &[
    EventSpec::command("onKeyringStatusChanged", "keyring_status_changed"),
];
