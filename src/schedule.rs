//! Timer-driven runtime for the sweeps.
//!
//! Each configured sweep gets its own task ticking at the sweep's interval.
//! Runs of one sweep never overlap; different sweeps run independently and
//! share nothing but the stores. A run that fails or is cut short simply
//! leaves its work for the next tick.

use crate::config::LifecycleConfig;
use crate::lifecycle::Lifecycle;
use crate::stores::IdentityEvent;
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinSet;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{info, warn};

/// Runs every configured sweep until `shutdown` resolves.
///
/// The first run of each sweep happens one interval after start-up.
pub async fn run<F>(lifecycle: Arc<Lifecycle>, config: &LifecycleConfig, shutdown: F)
where
    F: Future<Output = ()>,
{
    if config.stale_sweeps.len() > 1 {
        let names: Vec<&str> = config.stale_sweeps.iter().map(|s| s.name.as_str()).collect();
        warn!(
            sweeps = ?names,
            "several stale anonymous sweeps configured; they may reprocess the same candidates"
        );
    }

    let mut tasks = JoinSet::new();

    for sweep in config.stale_sweeps.clone() {
        let lifecycle = lifecycle.clone();
        info!(sweep = %sweep.name, interval = %humantime::format_duration(sweep.interval), "scheduling stale anonymous sweep");
        tasks.spawn(async move {
            let mut ticker = interval_at(Instant::now() + sweep.interval, sweep.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                lifecycle.run_stale_sweep(&sweep).await;
            }
        });
    }

    for sweep in config.asset_sweeps.clone() {
        let lifecycle = lifecycle.clone();
        info!(sweep = %sweep.name, interval = %humantime::format_duration(sweep.interval), "scheduling asset retention sweep");
        tasks.spawn(async move {
            let mut ticker = interval_at(Instant::now() + sweep.interval, sweep.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                lifecycle.run_asset_sweep(&sweep).await;
            }
        });
    }

    if tasks.is_empty() {
        warn!("no sweeps configured, scheduler idle");
    }

    shutdown.await;
    info!("shutting down scheduler");
    tasks.shutdown().await;
}

/// Feeds identity events to their handlers until the sender side closes.
pub async fn dispatch_events(lifecycle: Arc<Lifecycle>, mut events: UnboundedReceiver<IdentityEvent>) {
    while let Some(event) = events.recv().await {
        lifecycle.dispatch(event, Utc::now()).await;
    }
}

/// Dispatches every event already queued, including any raised while
/// handling them, and returns how many were handled.
pub async fn drain_events(lifecycle: &Lifecycle, events: &mut UnboundedReceiver<IdentityEvent>) -> usize {
    let mut handled = 0;
    while let Ok(event) = events.try_recv() {
        lifecycle.dispatch(event, Utc::now()).await;
        handled += 1;
    }
    handled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StaleSweepConfig;
    use crate::stores::memory::{MemoryDocumentStore, MemoryIdentityStore, MemoryObjectStore};
    use crate::stores::{FieldMap, FieldValue};
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_scheduled_sweep_runs_after_one_interval() {
        let identities = Arc::new(MemoryIdentityStore::new());
        let documents = Arc::new(MemoryDocumentStore::new());
        identities.insert("old", 0);
        documents.put(
            "users/old/tracker/status",
            FieldMap::from([
                ("isAnonymous".to_string(), FieldValue::Bool(true)),
                (
                    "lastActiveAt".to_string(),
                    FieldValue::Timestamp(Utc::now() - chrono::Duration::days(3)),
                ),
            ]),
        );

        let config = LifecycleConfig {
            stale_sweeps: vec![StaleSweepConfig {
                name: "fast".to_string(),
                interval: Duration::from_secs(300),
                threshold: Duration::from_secs(24 * 60 * 60),
            }],
            asset_sweeps: vec![],
            ..LifecycleConfig::default()
        };
        let lifecycle = Arc::new(Lifecycle::new(
            identities.clone(),
            documents,
            Arc::new(MemoryObjectStore::new()),
            &config,
        ));

        run(lifecycle, &config, tokio::time::sleep(Duration::from_secs(301))).await;

        assert_eq!(identities.deleted_uids(), vec!["old".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_nothing_runs_before_first_interval() {
        let identities = Arc::new(MemoryIdentityStore::new());
        identities.insert("old", 0);
        let config = LifecycleConfig::default();
        let lifecycle = Arc::new(Lifecycle::new(
            identities.clone(),
            Arc::new(MemoryDocumentStore::new()),
            Arc::new(MemoryObjectStore::new()),
            &config,
        ));

        run(lifecycle, &config, tokio::time::sleep(Duration::from_secs(60))).await;

        assert!(identities.deleted_uids().is_empty());
    }

    #[tokio::test]
    async fn test_drain_runs_cascade_for_sweep_deletions() {
        let (tx, mut events) = tokio::sync::mpsc::unbounded_channel();
        let identities = Arc::new(MemoryIdentityStore::with_events(tx));
        let documents = Arc::new(MemoryDocumentStore::new());
        let objects = Arc::new(MemoryObjectStore::new());
        identities.insert("old", 0);
        documents.put(
            "users/old/tracker/status",
            FieldMap::from([
                ("isAnonymous".to_string(), FieldValue::Bool(true)),
                (
                    "lastActiveAt".to_string(),
                    FieldValue::Timestamp(Utc::now() - chrono::Duration::days(40)),
                ),
            ]),
        );
        objects.put("avatars/old/a.jpg", Utc::now() - chrono::Duration::days(40));
        let lifecycle = Lifecycle::new(
            identities.clone(),
            documents.clone(),
            objects.clone(),
            &LifecycleConfig::default(),
        );

        let sweep = LifecycleConfig::default().stale_sweeps[0].clone();
        let report = lifecycle.sweep_stale_anonymous(&sweep, Utc::now()).await.unwrap();
        assert_eq!(report.deleted, 1);
        assert!(documents.fields("users/old/tracker/status").is_some());

        assert_eq!(drain_events(&lifecycle, &mut events).await, 1);
        assert!(documents.paths_under("users/old").is_empty());
        assert!(objects.names().is_empty());
        assert_eq!(drain_events(&lifecycle, &mut events).await, 0);
    }
}
