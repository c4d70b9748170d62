//! Notification sink contract and an in-memory toast store.
//!
//! The request client and the update stream talk to the user only through a
//! [`NotificationSink`]. The sink owns de-duplication of the rate-limit warning:
//! the client calls [`NotificationSink::show_rate_limit_warning`] on every 429
//! and the sink makes sure at most one such toast is visible at a time.
//!
//! [`ToastStore`] is the default sink. Toasts expire lazily: nothing is removed
//! on a timer, an expired toast simply stops being reported by
//! [`ToastStore::visible`] and is pruned on the next write.

use parking_lot::Mutex;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Identifier of a displayed toast.
pub type ToastId = Uuid;

/// Message shown once per 429 burst.
pub const RATE_LIMIT_MESSAGE: &str = "Too many requests. Please slow down and try again shortly.";

/// Message shown when a call comes back 403.
pub const ACCESS_RESTRICTED_MESSAGE: &str = "Access restricted: you do not have permission to perform this action.";

/// Display time of the rate-limit warning.
pub const RATE_LIMIT_DURATION: Duration = Duration::from_secs(5);

/// Display time of ordinary informational toasts.
pub const DEFAULT_DURATION: Duration = Duration::from_secs(5);

/// Display time of failure toasts, long enough to be noticed.
pub const FAILURE_DURATION: Duration = Duration::from_secs(10);

/// Toast severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Neutral information.
    Info,
    /// Something finished well.
    Success,
    /// Something needs attention.
    Warning,
    /// Something failed.
    Error,
}

/// Receiver of user-facing messages.
pub trait NotificationSink: Send + Sync {
    /// Display a toast. `None` duration means it stays until dismissed.
    fn add_toast(&self, message: &str, severity: Severity, duration: Option<Duration>) -> ToastId;

    /// Remove a toast. Unknown ids are ignored.
    fn dismiss(&self, id: ToastId);

    /// Show the rate-limit warning unless one is already visible.
    fn show_rate_limit_warning(&self) -> ToastId;
}

/// A toast held by [`ToastStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    /// Identifier.
    pub id: ToastId,
    /// Text shown to the user.
    pub message: String,
    /// Severity.
    pub severity: Severity,
    /// When it was added.
    pub created_at: Instant,
    /// When it stops being visible, if ever.
    pub expires_at: Option<Instant>,
}

impl Toast {
    fn is_visible_at(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |expiry| expiry > now)
    }
}

#[derive(Debug, Default)]
struct ToastList {
    toasts: Vec<Toast>,
    rate_limit: Option<ToastId>,
}

impl ToastList {
    fn prune(&mut self, now: Instant) {
        self.toasts.retain(|toast| toast.is_visible_at(now));
        if let Some(id) = self.rate_limit {
            if !self.toasts.iter().any(|toast| toast.id == id) {
                self.rate_limit = None;
            }
        }
    }

    fn push(&mut self, message: &str, severity: Severity, duration: Option<Duration>, now: Instant) -> ToastId {
        let id = Uuid::new_v4();
        self.toasts.push(Toast {
            id,
            message: message.to_string(),
            severity,
            created_at: now,
            expires_at: duration.map(|d| now + d),
        });
        id
    }
}

/// Session-wide toast list.
///
/// Shared between the request client and the update stream through
/// `Arc<ToastStore>`; all mutation goes through one mutex.
#[derive(Debug, Default)]
pub struct ToastStore {
    inner: Mutex<ToastList>,
}

impl ToastStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Toasts currently visible, oldest first.
    pub fn visible(&self) -> Vec<Toast> {
        let now = Instant::now();
        self.inner
            .lock()
            .toasts
            .iter()
            .filter(|toast| toast.is_visible_at(now))
            .cloned()
            .collect()
    }

    /// Remove every toast.
    pub fn clear(&self) {
        let mut list = self.inner.lock();
        list.toasts.clear();
        list.rate_limit = None;
    }
}

impl NotificationSink for ToastStore {
    fn add_toast(&self, message: &str, severity: Severity, duration: Option<Duration>) -> ToastId {
        let now = Instant::now();
        let mut list = self.inner.lock();
        list.prune(now);
        list.push(message, severity, duration, now)
    }

    fn dismiss(&self, id: ToastId) {
        let mut list = self.inner.lock();
        list.toasts.retain(|toast| toast.id != id);
        if list.rate_limit == Some(id) {
            list.rate_limit = None;
        }
    }

    fn show_rate_limit_warning(&self) -> ToastId {
        let now = Instant::now();
        let mut list = self.inner.lock();
        list.prune(now);
        if let Some(id) = list.rate_limit {
            return id;
        }
        let id = list.push(RATE_LIMIT_MESSAGE, Severity::Warning, Some(RATE_LIMIT_DURATION), now);
        list.rate_limit = Some(id);
        id
    }
}
