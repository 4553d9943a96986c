use super::activity::{IS_ANONYMOUS, LAST_ACTIVE_AT};
use super::reconfirm::{reconfirm_before_delete, Reconfirmation};
use super::{Lifecycle, LifecycleError};
use crate::config::StaleSweepConfig;
use crate::stores::{FieldValue, Filter};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaleSweepReport {
    pub candidates: usize,
    pub deleted: usize,
    pub upgraded: usize,
    pub already_gone: usize,
    pub failed: usize,
    /// Tracker paths that do not belong to a user under the configured layout.
    pub skipped: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CandidateOutcome {
    Deleted,
    Upgraded,
    AlreadyGone,
    Failed,
}

impl Lifecycle {
    /// Deletes anonymous identities inactive for longer than the sweep's
    /// threshold.
    ///
    /// Trackers only nominate candidates. Each candidate is re-checked
    /// against the identity store before deletion; upgraded or vanished
    /// identities get their tracker flag cleared so later runs skip them.
    /// Deleting an identity fires the deletion trigger, which removes the
    /// tracker along with the rest of the user's data.
    pub async fn sweep_stale_anonymous(
        &self,
        sweep: &StaleSweepConfig,
        now: DateTime<Utc>,
    ) -> Result<StaleSweepReport, LifecycleError> {
        let threshold = chrono::Duration::from_std(sweep.threshold)
            .unwrap_or_else(|_| chrono::Duration::MAX);
        let cutoff = now.checked_sub_signed(threshold).unwrap_or(DateTime::<Utc>::MIN_UTC);

        let filters = [
            Filter::eq(IS_ANONYMOUS, FieldValue::Bool(true)),
            Filter::lt(LAST_ACTIVE_AT, FieldValue::Timestamp(cutoff)),
        ];
        let trackers = self
            .documents
            .query(&self.paths.tracker_collection, &filters)
            .await
            .map_err(LifecycleError::CandidateQuery)?;

        let mut report = StaleSweepReport {
            candidates: trackers.len(),
            ..Default::default()
        };

        let mut uids = Vec::with_capacity(trackers.len());
        for tracker in &trackers {
            match self.paths.uid_from_tracker_path(&tracker.path) {
                Some(uid) => uids.push(uid.to_string()),
                None => {
                    warn!(path = %tracker.path, "tracker outside the users layout, skipping");
                    report.skipped += 1;
                }
            }
        }

        info!(
            sweep = %sweep.name,
            cutoff = %cutoff,
            candidates = uids.len(),
            "starting stale anonymous sweep"
        );

        let outcomes: Vec<CandidateOutcome> = stream::iter(uids)
            .map(|uid| async move { self.reconcile_candidate(&uid).await })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        for outcome in outcomes {
            match outcome {
                CandidateOutcome::Deleted => report.deleted += 1,
                CandidateOutcome::Upgraded => report.upgraded += 1,
                CandidateOutcome::AlreadyGone => report.already_gone += 1,
                CandidateOutcome::Failed => report.failed += 1,
            }
        }

        Ok(report)
    }

    async fn reconcile_candidate(&self, uid: &str) -> CandidateOutcome {
        match reconfirm_before_delete(self.identities.as_ref(), uid).await {
            Ok(Reconfirmation::Deleted) => {
                info!(uid, "deleted stale anonymous identity");
                CandidateOutcome::Deleted
            }
            Ok(Reconfirmation::AlreadyGone) => {
                debug!(uid, "identity already deleted");
                if self.clear_anonymous_flag(uid).await {
                    CandidateOutcome::AlreadyGone
                } else {
                    CandidateOutcome::Failed
                }
            }
            Ok(Reconfirmation::Upgraded { provider_count }) => {
                info!(uid, provider_count, "identity upgraded since last activity, keeping it");
                if self.clear_anonymous_flag(uid).await {
                    CandidateOutcome::Upgraded
                } else {
                    CandidateOutcome::Failed
                }
            }
            Err(e) => {
                warn!(uid, op = "reconfirm_before_delete", error = %e, "failed to reconcile candidate");
                CandidateOutcome::Failed
            }
        }
    }

    /// Scheduled entry point: runs the sweep and logs the outcome. Never fails.
    pub async fn run_stale_sweep(&self, sweep: &StaleSweepConfig) {
        match self.sweep_stale_anonymous(sweep, Utc::now()).await {
            Ok(report) => info!(
                sweep = %sweep.name,
                candidates = report.candidates,
                deleted = report.deleted,
                upgraded = report.upgraded,
                already_gone = report.already_gone,
                failed = report.failed,
                skipped = report.skipped,
                "stale anonymous sweep finished"
            ),
            Err(e) => error!(sweep = %sweep.name, error = %e, "stale anonymous sweep aborted"),
        }
    }
}
