use super::Lifecycle;
use crate::stores::StoreError;
use futures::stream::{self, StreamExt};
use tracing::{info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CascadeReport {
    pub documents_deleted: usize,
    pub objects_deleted: usize,
    pub failures: usize,
}

impl Lifecycle {
    /// Removes everything stored for a deleted identity.
    ///
    /// Documents and objects are cleaned independently; a failure on one side
    /// does not stop or undo the other.
    pub async fn on_identity_deleted(&self, uid: &str) -> CascadeReport {
        let mut report = CascadeReport::default();

        match self.documents.recursive_delete(&self.paths.user_path(uid)).await {
            Ok(count) => report.documents_deleted = count,
            Err(e) => {
                warn!(uid, op = "recursive_delete", error = %e, "failed to delete user documents");
                report.failures += 1;
            }
        }

        let prefix = self.paths.asset_prefix_for(uid);
        match self.objects.list_objects(&prefix).await {
            Ok(objects) => {
                let results: Vec<Result<(), StoreError>> = stream::iter(objects)
                    .map(|object| async move {
                        match self.objects.delete_object(&object.name).await {
                            Ok(()) => Ok(()),
                            Err(StoreError::NotFound(_)) => Ok(()),
                            Err(e) => {
                                warn!(uid, file = %object.name, op = "delete_object", error = %e, "failed to delete asset");
                                Err(e)
                            }
                        }
                    })
                    .buffer_unordered(self.concurrency)
                    .collect()
                    .await;

                for result in results {
                    match result {
                        Ok(()) => report.objects_deleted += 1,
                        Err(_) => report.failures += 1,
                    }
                }
            }
            Err(e) => {
                warn!(uid, op = "list_objects", error = %e, "failed to list user assets");
                report.failures += 1;
            }
        }

        info!(
            uid,
            documents = report.documents_deleted,
            objects = report.objects_deleted,
            failures = report.failures,
            "cascaded identity deletion"
        );
        report
    }
}
