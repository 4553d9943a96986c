//! Cloud Firestore module.
//!
//! A thin REST client over the Firestore v1 API with just enough surface for
//! the lifecycle jobs: document reads, create-if-absent, field-masked
//! updates, recursive deletes and structured (collection group) queries.

pub mod models;
pub mod query;
pub mod reference;

#[cfg(test)]
mod tests;

use self::query::{ExecutableQuery, Query};
use self::reference::{CollectionReference, DocumentReference};
use crate::core::authorized_client;
use crate::core::middleware::AuthMiddleware;
use reqwest_middleware::ClientWithMiddleware;
use thiserror::Error;

const FIRESTORE_V1_API: &str =
    "https://firestore.googleapis.com/v1/projects/{project_id}/databases/(default)/documents";

/// Errors that can occur during Firestore operations.
#[derive(Error, Debug)]
pub enum FirestoreError {
    /// Wrapper for `reqwest::Error`.
    #[error("HTTP Request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    /// Wrapper for `reqwest_middleware::Error`.
    #[error("Middleware error: {0}")]
    MiddlewareError(#[from] reqwest_middleware::Error),
    /// Errors returned by the Firestore API.
    #[error("API error: {0}")]
    ApiError(String),
    /// Wrapper for `serde_json::Error`.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    /// The document a precondition required does not exist.
    #[error("Document not found: {0}")]
    NotFound(String),
    /// A create targeted a document that already exists.
    #[error("Document already exists: {0}")]
    AlreadyExists(String),
}

/// Client for interacting with Cloud Firestore.
pub struct FirebaseFirestore {
    client: ClientWithMiddleware,
    base_url: String,
}

impl FirebaseFirestore {
    /// Creates a new `FirebaseFirestore` instance for the key's project.
    pub fn new(middleware: AuthMiddleware) -> Self {
        let project_id = middleware.project_id().unwrap_or_default().to_string();
        let base_url = FIRESTORE_V1_API.replace("{project_id}", &project_id);

        Self {
            client: authorized_client(middleware),
            base_url,
        }
    }

    /// Creates a client against a custom documents root (an emulator or a mock server).
    pub fn new_with_client(client: ClientWithMiddleware, base_url: String) -> Self {
        Self { client, base_url }
    }

    /// Gets a `CollectionReference` for a slash-separated collection path.
    pub fn collection(&self, collection_path: &str) -> CollectionReference<'_> {
        CollectionReference {
            client: &self.client,
            base_url: &self.base_url,
            path: collection_path.trim_matches('/').to_string(),
        }
    }

    /// Gets a `DocumentReference` for a slash-separated document path (e.g. "users/user1").
    pub fn doc(&self, document_path: &str) -> DocumentReference<'_> {
        DocumentReference {
            client: &self.client,
            base_url: &self.base_url,
            path: document_path.trim_matches('/').to_string(),
        }
    }

    /// Attaches a query to the database root, so collection group queries
    /// span every user.
    pub fn query(&self, query: Query) -> ExecutableQuery<'_> {
        ExecutableQuery {
            client: &self.client,
            parent_url: self.base_url.clone(),
            query,
        }
    }
}
