//! User-facing sync notifications.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::ErrorKind;

/// One failed cycle, as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncNotice {
    pub kind: ErrorKind,
    pub message: String,
    /// Set when the failure switched background sync off.
    pub sync_disabled: bool,
}

/// Receives sync failures after rate limiting.
pub trait SyncNotifier: Send + Sync {
    fn notify(&self, notice: &SyncNotice);
}

/// Emits notices as `warn` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl SyncNotifier for TracingNotifier {
    fn notify(&self, notice: &SyncNotice) {
        if notice.sync_disabled {
            tracing::warn!(
                kind = %notice.kind,
                "Sync disabled until re-enabled: {}",
                notice.message
            );
        } else {
            tracing::warn!(kind = %notice.kind, "Sync failed: {}", notice.message);
        }
    }
}

/// Lets at most one notice per [`ErrorKind`] through per interval.
#[derive(Debug)]
pub(crate) struct NotificationLimiter {
    min_interval_ms: i64,
    last_sent: Mutex<HashMap<ErrorKind, i64>>,
}

impl NotificationLimiter {
    pub(crate) fn new(min_interval_ms: i64) -> Self {
        Self {
            min_interval_ms,
            last_sent: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn allow(&self, kind: ErrorKind, now_ms: i64) -> bool {
        let mut last_sent = self
            .last_sent
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        match last_sent.get(&kind) {
            Some(previous) if now_ms.saturating_sub(*previous) < self.min_interval_ms => false,
            _ => {
                last_sent.insert(kind, now_ms);
                true
            }
        }
    }
}
