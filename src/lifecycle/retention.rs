use super::{Lifecycle, LifecycleError};
use crate::config::AssetSweepConfig;
use crate::stores::{StoreError, StoredObject};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use url::Url;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionReport {
    pub users: usize,
    pub files_kept: usize,
    pub files_deleted: usize,
    pub failures: usize,
}

/// Which of a user's assets to keep and which to delete.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionPlan {
    /// Object names protected regardless of age: the referenced asset plus
    /// the most recent others.
    pub protected: Vec<String>,
    /// Object names past the grace period and not protected.
    pub delete: Vec<String>,
}

fn percent_decode(component: &str) -> String {
    // form_urlencoded treats these as syntax; escape them so they survive.
    let escaped = component
        .replace('+', "%2B")
        .replace('&', "%26")
        .replace('=', "%3D");
    url::form_urlencoded::parse(escaped.as_bytes())
        .next()
        .map(|(key, _)| key.into_owned())
        .unwrap_or_default()
}

fn last_segment(path: &str) -> Option<String> {
    path.rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// File name of the asset a profile photo URL points at.
///
/// Accepts Firebase download URLs (`.../o/<encoded object path>?alt=media`),
/// `gs://bucket/path` URLs, plain HTTPS object URLs and bare object paths.
pub fn referenced_asset_name(photo_url: &str) -> Option<String> {
    let photo_url = photo_url.trim();
    if photo_url.is_empty() {
        return None;
    }

    let Ok(url) = Url::parse(photo_url) else {
        return last_segment(photo_url);
    };

    let path = url.path();
    let object_path = match path.split_once("/o/") {
        Some((_, encoded)) => percent_decode(encoded),
        None => path
            .split('/')
            .map(percent_decode)
            .collect::<Vec<_>>()
            .join("/"),
    };

    last_segment(&object_path)
}

/// Decides which assets to delete.
///
/// Assets are ranked newest first. The referenced asset and the
/// `keep_recent` newest other assets are protected; everything else older
/// than `grace_period` is deleted.
pub fn plan_retention(
    objects: &[StoredObject],
    current: Option<&str>,
    keep_recent: usize,
    grace_period: Duration,
    now: DateTime<Utc>,
) -> RetentionPlan {
    let mut ranked: Vec<&StoredObject> = objects.iter().collect();
    ranked.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.name.cmp(&b.name)));

    let mut protected: Vec<String> = Vec::new();
    if let Some(current) = current {
        protected.extend(
            ranked
                .iter()
                .filter(|o| o.file_name() == current || o.name == current)
                .map(|o| o.name.clone()),
        );
    }

    let mut recent = 0;
    for object in &ranked {
        if recent == keep_recent {
            break;
        }
        if !protected.contains(&object.name) {
            protected.push(object.name.clone());
            recent += 1;
        }
    }

    let grace = chrono::Duration::from_std(grace_period).unwrap_or(chrono::Duration::MAX);
    let keep: HashSet<&str> = protected.iter().map(String::as_str).collect();
    let delete = ranked
        .iter()
        .filter(|o| !keep.contains(o.name.as_str()))
        .filter(|o| now.signed_duration_since(o.updated_at) > grace)
        .map(|o| o.name.clone())
        .collect();

    RetentionPlan { protected, delete }
}

impl Lifecycle {
    /// Prunes historical assets for every user with a profile document.
    pub async fn sweep_assets(
        &self,
        sweep: &AssetSweepConfig,
        now: DateTime<Utc>,
    ) -> Result<RetentionReport, LifecycleError> {
        let profiles = self
            .documents
            .list(&self.paths.users_collection)
            .await
            .map_err(LifecycleError::ProfileListing)?;

        info!(sweep = %sweep.name, users = profiles.len(), "starting asset retention sweep");

        let work: Vec<(String, Option<String>)> = profiles
            .iter()
            .filter_map(|profile| {
                let uid = self.paths.uid_from_user_path(&profile.path)?;
                let current = profile
                    .fields
                    .get(&self.paths.photo_field)
                    .and_then(|v| v.as_str())
                    .and_then(referenced_asset_name);
                Some((uid.to_string(), current))
            })
            .collect();

        let results: Vec<RetentionReport> = stream::iter(work)
            .map(|(uid, current)| async move {
                self.retain_user_assets(&uid, current.as_deref(), sweep, now).await
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut report = RetentionReport::default();
        for user in results {
            report.users += 1;
            report.files_kept += user.files_kept;
            report.files_deleted += user.files_deleted;
            report.failures += user.failures;
        }
        Ok(report)
    }

    async fn retain_user_assets(
        &self,
        uid: &str,
        current: Option<&str>,
        sweep: &AssetSweepConfig,
        now: DateTime<Utc>,
    ) -> RetentionReport {
        let mut report = RetentionReport::default();

        let objects = match self.objects.list_objects(&self.paths.asset_prefix_for(uid)).await {
            Ok(objects) => objects,
            Err(e) => {
                warn!(uid, op = "list_objects", error = %e, "failed to list assets");
                report.failures += 1;
                return report;
            }
        };

        let plan = plan_retention(&objects, current, sweep.keep_recent, sweep.grace_period, now);
        report.files_kept = objects.len() - plan.delete.len();

        let results: Vec<Result<bool, StoreError>> = stream::iter(plan.delete.iter().cloned())
            .map(move |name| async move {
                match self.objects.delete_object(&name).await {
                    Ok(()) => {
                        debug!(uid, file = %name, "deleted expired asset");
                        Ok(true)
                    }
                    Err(StoreError::NotFound(_)) => {
                        debug!(uid, file = %name, "asset already gone");
                        Ok(false)
                    }
                    Err(e) => {
                        warn!(uid, file = %name, op = "delete_object", error = %e, "failed to delete asset");
                        Err(e)
                    }
                }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        for result in results {
            match result {
                Ok(true) => report.files_deleted += 1,
                Ok(false) => {}
                Err(_) => report.failures += 1,
            }
        }

        report
    }

    /// Scheduled entry point: runs the sweep and logs the outcome. Never fails.
    pub async fn run_asset_sweep(&self, sweep: &AssetSweepConfig) {
        match self.sweep_assets(sweep, Utc::now()).await {
            Ok(report) => info!(
                sweep = %sweep.name,
                users = report.users,
                kept = report.files_kept,
                deleted = report.files_deleted,
                failures = report.failures,
                "asset retention sweep finished"
            ),
            Err(e) => error!(sweep = %sweep.name, error = %e, "asset retention sweep aborted"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap()
    }

    fn object(name: &str, day: u32) -> StoredObject {
        StoredObject {
            name: format!("avatars/u1/{}", name),
            updated_at: at(day),
        }
    }

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    #[test]
    fn test_referenced_asset_from_download_url() {
        let url = "https://firebasestorage.googleapis.com/v0/b/books.appspot.com/o/avatars%2Fu1%2Fface%20one.jpg?alt=media&token=abc";
        assert_eq!(referenced_asset_name(url).as_deref(), Some("face one.jpg"));
    }

    #[test]
    fn test_referenced_asset_from_gs_and_bare_paths() {
        assert_eq!(
            referenced_asset_name("gs://books.appspot.com/avatars/u1/b.png").as_deref(),
            Some("b.png")
        );
        assert_eq!(referenced_asset_name("avatars/u1/c.png").as_deref(), Some("c.png"));
        assert_eq!(referenced_asset_name("  "), None);
    }

    #[test]
    fn test_plan_keeps_current_and_recent() {
        let objects = vec![
            object("a.jpg", 1),
            object("b.jpg", 2),
            object("c.jpg", 3),
            object("d.jpg", 4),
            object("e.jpg", 5),
        ];

        let plan = plan_retention(&objects, Some("a.jpg"), 2, DAY, at(20));

        assert_eq!(
            plan.protected,
            vec!["avatars/u1/a.jpg", "avatars/u1/e.jpg", "avatars/u1/d.jpg"]
        );
        assert_eq!(plan.delete, vec!["avatars/u1/c.jpg", "avatars/u1/b.jpg"]);
    }

    #[test]
    fn test_plan_spares_assets_inside_grace_period() {
        let objects = vec![object("a.jpg", 1), object("b.jpg", 9), object("c.jpg", 10)];

        let plan = plan_retention(&objects, None, 1, 3 * DAY, at(10));

        assert_eq!(plan.protected, vec!["avatars/u1/c.jpg"]);
        assert_eq!(plan.delete, vec!["avatars/u1/a.jpg"]);
    }

    #[test]
    fn test_plan_with_zero_keep_recent_still_protects_current() {
        let objects = vec![object("a.jpg", 1), object("b.jpg", 2)];

        let plan = plan_retention(&objects, Some("a.jpg"), 0, DAY, at(20));

        assert_eq!(plan.protected, vec!["avatars/u1/a.jpg"]);
        assert_eq!(plan.delete, vec!["avatars/u1/b.jpg"]);
    }

    #[test]
    fn test_plan_with_fewer_assets_than_keep_recent() {
        let objects = vec![object("a.jpg", 1), object("b.jpg", 2)];

        let plan = plan_retention(&objects, None, 5, DAY, at(20));

        assert_eq!(plan.protected.len(), 2);
        assert!(plan.delete.is_empty());
    }
}
