//! Connection state of the shared client.

use super::{Endpoint, Tag};
use crate::base_query::Target;
use crate::invalidation::{Invalidation, UpdateRule};

pub(super) fn endpoints() -> Vec<Endpoint> {
    vec![Endpoint::query("getClientState", Target::Client, "getState")
        .provides(Tag::kind("ClientState"))
        .invalidate_on(Invalidation::update(
            Target::Client,
            "onStateChange",
            UpdateRule::Merge,
        ))]
}
