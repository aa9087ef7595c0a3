//! Rate-limited change notifications.
//!
//! [`throttle`] watches a value (typically a query's state) and forwards it to
//! a consumer at most once per `wait` window, with leading and trailing edge
//! behavior chosen by the caller. Only the notifications are throttled; the
//! underlying query keeps fetching and receiving pushes at full rate.

use crate::config::ClientDefaults;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleOptions {
    pub wait: Duration,
    /// Notify on the first change of a window.
    pub leading: bool,
    /// Notify at the end of a window that saw further changes.
    pub trailing: bool,
}

impl ThrottleOptions {
    /// Leading and trailing notifications, one window of `wait`.
    pub fn new(wait: Duration) -> Self {
        Self {
            wait,
            leading: true,
            trailing: true,
        }
    }

    pub fn leading(mut self, leading: bool) -> Self {
        self.leading = leading;
        self
    }

    pub fn trailing(mut self, trailing: bool) -> Self {
        self.trailing = trailing;
        self
    }
}

/// Window bookkeeping, independent of any timer.
#[derive(Debug, Clone)]
pub struct ThrottleState {
    options: ThrottleOptions,
    window_end: Option<Instant>,
    pending: bool,
}

impl ThrottleState {
    pub fn new(options: ThrottleOptions) -> Self {
        Self {
            options,
            window_end: None,
            pending: false,
        }
    }

    /// Record a change at `now`. Returns whether to notify immediately.
    pub fn on_change(&mut self, now: Instant) -> bool {
        match self.window_end {
            Some(end) if now < end => {
                self.pending = true;
                false
            }
            _ => {
                self.window_end = Some(now + self.options.wait);
                self.pending = !self.options.leading;
                self.options.leading
            }
        }
    }

    /// Close the window if it has ended. Returns whether to notify (trailing edge).
    ///
    /// A trailing notification opens a new window.
    pub fn on_deadline(&mut self, now: Instant) -> bool {
        match self.window_end {
            Some(end) if now >= end => {
                let notify = self.pending && self.options.trailing;
                self.pending = false;
                self.window_end = if notify {
                    Some(now + self.options.wait)
                } else {
                    None
                };
                notify
            }
            _ => false,
        }
    }

    /// When the current window ends, if one is open.
    pub fn deadline(&self) -> Option<Instant> {
        self.window_end
    }
}

/// Forward changes of `source` to the returned receiver at the throttled rate.
///
/// The task ends when `source`'s sender is dropped or the receiver is closed.
pub fn throttle<T>(
    mut source: watch::Receiver<T>,
    options: ThrottleOptions,
) -> (mpsc::Receiver<T>, JoinHandle<()>)
where
    T: Clone + Send + Sync + 'static,
{
    let (tx, rx) = mpsc::channel(ClientDefaults::CHANNEL_CAPACITY);

    let task = tokio::spawn(async move {
        let mut state = ThrottleState::new(options);
        loop {
            let deadline = state.deadline();
            let notify = tokio::select! {
                changed = source.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    source.borrow_and_update();
                    state.on_change(Instant::now())
                }
                _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    state.on_deadline(Instant::now())
                }
            };

            if notify {
                let value = source.borrow().clone();
                if tx.send(value).await.is_err() {
                    break;
                }
            }
        }
    });

    (rx, task)
}
