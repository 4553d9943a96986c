use super::activity::{IS_ANONYMOUS, LAST_ACTIVE_AT};
use super::Lifecycle;
use crate::stores::{CreateOutcome, FieldMap, FieldValue};
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignupOutcome {
    TrackerCreated,
    /// A tracker was already present and left untouched.
    AlreadyTracked,
    /// The identity has linked providers; permanent accounts are not tracked.
    NotAnonymous,
    Failed,
}

impl Lifecycle {
    /// Seeds the tracker for a new anonymous identity.
    ///
    /// The tracker is created only if absent, so a replayed event never
    /// clobbers a later activity update.
    pub async fn on_identity_created(
        &self,
        uid: &str,
        provider_count: usize,
        now: DateTime<Utc>,
    ) -> SignupOutcome {
        if provider_count > 0 {
            debug!(uid, provider_count, "permanent identity created, no tracker");
            return SignupOutcome::NotAnonymous;
        }

        let fields = FieldMap::from([
            (IS_ANONYMOUS.to_string(), FieldValue::Bool(true)),
            (LAST_ACTIVE_AT.to_string(), FieldValue::Timestamp(now)),
        ]);

        match self.documents.create(&self.paths.tracker_path(uid), fields).await {
            Ok(CreateOutcome::Created) => {
                info!(uid, "created anonymous account tracker");
                SignupOutcome::TrackerCreated
            }
            Ok(CreateOutcome::AlreadyExists) => {
                debug!(uid, "tracker already exists");
                SignupOutcome::AlreadyTracked
            }
            Err(e) => {
                warn!(uid, op = "create_tracker", error = %e, "failed to create tracker");
                SignupOutcome::Failed
            }
        }
    }
}
