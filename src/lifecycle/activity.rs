use super::Lifecycle;
use crate::stores::{FieldValue, StoreError};
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

pub const IS_ANONYMOUS: &str = "isAnonymous";
pub const LAST_ACTIVE_AT: &str = "lastActiveAt";

impl Lifecycle {
    /// Bumps `lastActiveAt` on the user's tracker.
    ///
    /// Only anonymous users have trackers; for everyone else this is a no-op.
    pub async fn record_activity(&self, uid: &str, now: DateTime<Utc>) {
        let path = self.paths.tracker_path(uid);
        match self
            .documents
            .set_field(&path, LAST_ACTIVE_AT, FieldValue::Timestamp(now))
            .await
        {
            Ok(()) => debug!(uid, "recorded activity"),
            Err(StoreError::NotFound(_)) => debug!(uid, "no tracker, activity not recorded"),
            Err(e) => warn!(uid, op = "record_activity", error = %e, "failed to record activity"),
        }
    }

    /// Marks the tracker as belonging to a permanent account so sweeps stop
    /// selecting it. Returns whether the flag is now cleared (a missing
    /// tracker counts, since there is nothing left to select).
    pub async fn clear_anonymous_flag(&self, uid: &str) -> bool {
        let path = self.paths.tracker_path(uid);
        match self
            .documents
            .set_field(&path, IS_ANONYMOUS, FieldValue::Bool(false))
            .await
        {
            Ok(()) => true,
            Err(StoreError::NotFound(_)) => {
                debug!(uid, "tracker already gone");
                true
            }
            Err(e) => {
                warn!(uid, op = "clear_anonymous_flag", error = %e, "failed to update tracker");
                false
            }
        }
    }

    /// Link/upgrade hook: an anonymous user attached a permanent credential.
    pub async fn on_identity_upgraded(&self, uid: &str) {
        if self.clear_anonymous_flag(uid).await {
            debug!(uid, "tracker flagged as permanent");
        }
    }
}
