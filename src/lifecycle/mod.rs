//! Anonymous-account lifecycle handlers.
//!
//! Two event handlers (identity created, identity deleted), the client-side
//! activity writer, and two scheduled sweeps. Every handler is a method on
//! [`Lifecycle`], which owns the three store clients.
//!
//! Per-item failures are logged and counted in the returned reports; only a
//! failure to load the work list aborts a sweep.

pub mod activity;
pub mod deletion;
pub mod reconfirm;
pub mod retention;
pub mod signup;
pub mod stale;


use crate::config::{LifecycleConfig, PathsConfig};
use crate::stores::{DocumentStore, IdentityEvent, IdentityStore, ObjectStore, StoreError};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

pub use deletion::CascadeReport;
pub use reconfirm::{reconfirm_before_delete, Reconfirmation};
pub use retention::{plan_retention, referenced_asset_name, RetentionPlan, RetentionReport};
pub use signup::SignupOutcome;
pub use stale::StaleSweepReport;

/// A sweep could not start. Nothing was processed; the next scheduled run
/// starts over.
#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("candidate query failed: {0}")]
    CandidateQuery(#[source] StoreError),
    #[error("profile listing failed: {0}")]
    ProfileListing(#[source] StoreError),
}

pub struct Lifecycle {
    identities: Arc<dyn IdentityStore>,
    documents: Arc<dyn DocumentStore>,
    objects: Arc<dyn ObjectStore>,
    paths: PathsConfig,
    concurrency: usize,
}

impl Lifecycle {
    pub fn new(
        identities: Arc<dyn IdentityStore>,
        documents: Arc<dyn DocumentStore>,
        objects: Arc<dyn ObjectStore>,
        config: &LifecycleConfig,
    ) -> Self {
        Self {
            identities,
            documents,
            objects,
            paths: config.paths.clone(),
            concurrency: config.concurrency.max(1),
        }
    }

    pub fn identities(&self) -> &dyn IdentityStore {
        self.identities.as_ref()
    }

    /// Routes an identity event to its handler, as the platform's auth
    /// triggers would.
    pub async fn dispatch(&self, event: IdentityEvent, now: DateTime<Utc>) {
        match event {
            IdentityEvent::Created { uid, provider_count } => {
                self.on_identity_created(&uid, provider_count, now).await;
            }
            IdentityEvent::Upgraded { uid } => {
                self.on_identity_upgraded(&uid).await;
            }
            IdentityEvent::Deleted { uid } => {
                self.on_identity_deleted(&uid).await;
            }
        }
    }
}
