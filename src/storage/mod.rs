//! Cloud Storage for Firebase module.
//!
//! Lists and deletes objects in the project's buckets through the Google
//! Cloud Storage JSON API.

pub mod bucket;
pub mod file;

use crate::core::authorized_client;
use crate::core::middleware::AuthMiddleware;
use bucket::Bucket;
use reqwest_middleware::ClientWithMiddleware;
use thiserror::Error;

const STORAGE_V1_API: &str = "https://storage.googleapis.com/storage/v1";

/// Errors that can occur during Storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Wrapper for `reqwest::Error`.
    #[error("HTTP Request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    /// Wrapper for `reqwest_middleware::Error`.
    #[error("Middleware error: {0}")]
    MiddlewareError(#[from] reqwest_middleware::Error),
    /// Errors returned by the Cloud Storage API.
    #[error("API error: {0}")]
    ApiError(String),
    /// Wrapper for `serde_json::Error`.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    /// The object does not exist (already deleted, or never uploaded).
    #[error("Object not found: {0}")]
    NotFound(String),
}

/// Client for interacting with Cloud Storage for Firebase.
#[derive(Clone)]
pub struct FirebaseStorage {
    client: ClientWithMiddleware,
    base_url: String,
    project_id: String,
}

impl FirebaseStorage {
    /// Creates a new `FirebaseStorage` instance for the key's project.
    pub fn new(middleware: AuthMiddleware) -> Self {
        let project_id = middleware.project_id().unwrap_or_default().to_string();

        Self {
            client: authorized_client(middleware),
            base_url: STORAGE_V1_API.to_string(),
            project_id,
        }
    }

    /// Creates a client against a custom API root (an emulator or a mock server).
    pub fn new_with_client(client: ClientWithMiddleware, base_url: String, project_id: String) -> Self {
        Self {
            client,
            base_url,
            project_id,
        }
    }

    /// Gets a `Bucket` by name, or the project's default bucket
    /// (`{project_id}.appspot.com`) when `name` is `None`.
    pub fn bucket(&self, name: Option<&str>) -> Bucket {
        let bucket_name = match name {
            Some(n) => n.to_string(),
            None => format!("{}.appspot.com", self.project_id),
        };

        Bucket::new(self.client.clone(), self.base_url.clone(), bucket_name)
    }
}
