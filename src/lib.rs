pub mod auth;
pub mod config;
pub mod core;
pub mod firestore;
pub mod lifecycle;
pub mod logging;
pub mod schedule;
pub mod storage;
pub mod stores;

use auth::FirebaseAuth;
use config::LifecycleConfig;
use core::middleware::AuthMiddleware;
use firestore::FirebaseFirestore;
use lifecycle::Lifecycle;
use std::sync::Arc;
use storage::FirebaseStorage;
use stores::firebase::{FirebaseIdentityStore, FirestoreDocumentStore, StorageObjectStore};
use yup_oauth2::ServiceAccountKey;

pub struct FirebaseApp {
    middleware: AuthMiddleware,
}

impl FirebaseApp {
    pub fn new(service_account_key: ServiceAccountKey) -> Self {
        Self {
            middleware: AuthMiddleware::new(service_account_key),
        }
    }

    pub fn project_id(&self) -> Option<&str> {
        self.middleware.project_id()
    }

    pub fn auth(&self) -> FirebaseAuth {
        FirebaseAuth::new(self.middleware.clone())
    }

    pub fn firestore(&self) -> FirebaseFirestore {
        FirebaseFirestore::new(self.middleware.clone())
    }

    pub fn storage(&self) -> FirebaseStorage {
        FirebaseStorage::new(self.middleware.clone())
    }

    /// Wires the lifecycle handlers to this project's Auth, Firestore and
    /// Storage.
    pub fn lifecycle(&self, config: &LifecycleConfig) -> Lifecycle {
        let bucket = self.storage().bucket(config.bucket.as_deref());
        tracing::debug!(bucket = bucket.name(), "using storage bucket");

        Lifecycle::new(
            Arc::new(FirebaseIdentityStore::new(self.auth())),
            Arc::new(FirestoreDocumentStore::new(self.firestore())),
            Arc::new(StorageObjectStore::new(bucket)),
            config,
        )
    }
}
