//! Store abstractions the lifecycle handlers run against.
//!
//! Each external system (identity provider, document database, object
//! storage) is reached through a trait so handlers receive their clients
//! explicitly. `firebase` adapts the REST clients of this crate; `memory`
//! provides process-local stores for tests and dry runs.

pub mod firebase;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use thiserror::Error;

/// Authoritative identity as reported by the identity store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityRecord {
    pub uid: String,
    pub provider_count: usize,
}

impl IdentityRecord {
    pub fn is_anonymous(&self) -> bool {
        self.provider_count == 0
    }
}

/// Outcome of an identity store call that did not succeed.
///
/// `NotFound` is a distinct variant because callers treat it as "already
/// done" rather than as a failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("identity not found")]
    NotFound,
    #[error("identity store error: {0}")]
    Backend(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("store error: {0}")]
    Backend(String),
}

/// Events emitted by the identity store when identities change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityEvent {
    Created { uid: String, provider_count: usize },
    Upgraded { uid: String },
    Deleted { uid: String },
}

#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Creates a new anonymous identity and returns its uid.
    async fn create_identity(&self) -> Result<String, IdentityError>;

    async fn get_identity(&self, uid: &str) -> Result<IdentityRecord, IdentityError>;

    /// Deletes an identity. A missing uid yields `IdentityError::NotFound`.
    async fn delete_identity(&self, uid: &str) -> Result<(), IdentityError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Bool(bool),
    Integer(i64),
    String(String),
    Timestamp(DateTime<Utc>),
    Null,
}

impl FieldValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            FieldValue::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }
}

pub type FieldMap = BTreeMap<String, FieldValue>;

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentEntry {
    /// Slash-separated path relative to the database root.
    pub path: String,
    pub fields: FieldMap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Equal,
    LessThan,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: FieldValue,
}

impl Filter {
    pub fn eq(field: &str, value: FieldValue) -> Self {
        Self { field: field.to_string(), op: FilterOp::Equal, value }
    }

    pub fn lt(field: &str, value: FieldValue) -> Self {
        Self { field: field.to_string(), op: FilterOp::LessThan, value }
    }

    /// Evaluates the filter the way the document database does: values of
    /// different types never match, and missing fields never match.
    pub fn matches(&self, fields: &FieldMap) -> bool {
        let Some(actual) = fields.get(&self.field) else {
            return false;
        };
        match self.op {
            FilterOp::Equal => actual == &self.value,
            FilterOp::LessThan => match (actual, &self.value) {
                (FieldValue::Integer(a), FieldValue::Integer(b)) => a < b,
                (FieldValue::String(a), FieldValue::String(b)) => a < b,
                (FieldValue::Timestamp(a), FieldValue::Timestamp(b)) => a < b,
                (FieldValue::Bool(a), FieldValue::Bool(b)) => a < b,
                _ => false,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    AlreadyExists,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Returns every document in any collection named `collection_group`
    /// matching all `filters`.
    async fn query(
        &self,
        collection_group: &str,
        filters: &[Filter],
    ) -> Result<Vec<DocumentEntry>, StoreError>;

    /// Lists the existing documents directly inside `collection`.
    async fn list(&self, collection: &str) -> Result<Vec<DocumentEntry>, StoreError>;

    /// Creates a document only if none exists at `path`.
    async fn create(&self, path: &str, fields: FieldMap) -> Result<CreateOutcome, StoreError>;

    /// Sets one field of an existing document. A missing document yields
    /// `StoreError::NotFound`.
    async fn set_field(&self, path: &str, field: &str, value: FieldValue) -> Result<(), StoreError>;

    /// Deletes the document at `path` and everything nested beneath it.
    /// Returns the number of documents removed.
    async fn recursive_delete(&self, path: &str) -> Result<usize, StoreError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// Full object name, including the prefix.
    pub name: String,
    pub updated_at: DateTime<Utc>,
}

impl StoredObject {
    /// The last path segment of the object name.
    pub fn file_name(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn list_objects(&self, prefix: &str) -> Result<Vec<StoredObject>, StoreError>;

    /// Deletes one object. A missing object yields `StoreError::NotFound`.
    async fn delete_object(&self, name: &str) -> Result<(), StoreError>;
}
