//! Store implementations backed by the Firebase REST clients.

use super::{
    CreateOutcome, DocumentEntry, DocumentStore, FieldMap, FieldValue, Filter, FilterOp,
    IdentityError, IdentityRecord, IdentityStore, ObjectStore, StoreError, StoredObject,
};
use crate::auth::models::CreateUserRequest;
use crate::auth::{AuthError, FirebaseAuth};
use crate::firestore::models::{Document, FieldOperator, Fields, Value, ValueType};
use crate::firestore::query::Query;
use crate::firestore::{FirebaseFirestore, FirestoreError};
use crate::storage::bucket::Bucket;
use crate::storage::StorageError;
use async_trait::async_trait;

impl From<AuthError> for IdentityError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::UserNotFound => IdentityError::NotFound,
            other => IdentityError::Backend(other.to_string()),
        }
    }
}

impl From<FirestoreError> for StoreError {
    fn from(err: FirestoreError) -> Self {
        match err {
            FirestoreError::NotFound(path) => StoreError::NotFound(path),
            other => StoreError::Backend(other.to_string()),
        }
    }
}

impl From<StorageError> for StoreError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(name) => StoreError::NotFound(name),
            other => StoreError::Backend(other.to_string()),
        }
    }
}

pub struct FirebaseIdentityStore {
    auth: FirebaseAuth,
}

impl FirebaseIdentityStore {
    pub fn new(auth: FirebaseAuth) -> Self {
        Self { auth }
    }
}

#[async_trait]
impl IdentityStore for FirebaseIdentityStore {
    async fn create_identity(&self) -> Result<String, IdentityError> {
        Ok(self.auth.create_user(CreateUserRequest::default()).await?)
    }

    async fn get_identity(&self, uid: &str) -> Result<IdentityRecord, IdentityError> {
        let user = self.auth.get_user(uid).await?;
        Ok(IdentityRecord {
            provider_count: user.provider_count(),
            uid: user.local_id,
        })
    }

    async fn delete_identity(&self, uid: &str) -> Result<(), IdentityError> {
        Ok(self.auth.delete_user(uid).await?)
    }
}

fn to_firestore_value(value: &FieldValue) -> Value {
    match value {
        FieldValue::Bool(b) => Value::boolean(*b),
        FieldValue::Integer(i) => Value::integer(*i),
        FieldValue::String(s) => Value::string(s.clone()),
        FieldValue::Timestamp(ts) => Value::timestamp(*ts),
        FieldValue::Null => Value::null(),
    }
}

/// Converts the scalar field types the lifecycle reads. Maps, arrays and
/// other types are dropped since no handler inspects them.
fn from_firestore_value(value: &Value) -> Option<FieldValue> {
    match &value.value_type {
        ValueType::BooleanValue(b) => Some(FieldValue::Bool(*b)),
        ValueType::IntegerValue(_) => value.as_integer().map(FieldValue::Integer),
        ValueType::StringValue(s) => Some(FieldValue::String(s.clone())),
        ValueType::TimestampValue(_) => value.as_timestamp().map(FieldValue::Timestamp),
        ValueType::NullValue(_) => Some(FieldValue::Null),
        _ => None,
    }
}

fn to_fields(fields: &FieldMap) -> Fields {
    fields
        .iter()
        .map(|(k, v)| (k.clone(), to_firestore_value(v)))
        .collect()
}

fn from_fields(fields: &Fields) -> FieldMap {
    fields
        .iter()
        .filter_map(|(k, v)| from_firestore_value(v).map(|v| (k.clone(), v)))
        .collect()
}

fn to_entry(document: &Document) -> DocumentEntry {
    DocumentEntry {
        path: document.relative_path().to_string(),
        fields: from_fields(&document.fields),
    }
}

pub struct FirestoreDocumentStore {
    db: FirebaseFirestore,
}

impl FirestoreDocumentStore {
    pub fn new(db: FirebaseFirestore) -> Self {
        Self { db }
    }
}

#[async_trait]
impl DocumentStore for FirestoreDocumentStore {
    async fn query(
        &self,
        collection_group: &str,
        filters: &[Filter],
    ) -> Result<Vec<DocumentEntry>, StoreError> {
        let query = filters
            .iter()
            .fold(Query::collection_group(collection_group), |query, filter| {
                let op = match filter.op {
                    FilterOp::Equal => FieldOperator::Equal,
                    FilterOp::LessThan => FieldOperator::LessThan,
                };
                query.where_value(&filter.field, op, to_firestore_value(&filter.value))
            });

        let documents = self.db.query(query).get().await?;
        Ok(documents.iter().map(to_entry).collect())
    }

    async fn list(&self, collection: &str) -> Result<Vec<DocumentEntry>, StoreError> {
        let documents = self.db.collection(collection).list_documents(false).await?;
        Ok(documents.iter().map(to_entry).collect())
    }

    async fn create(&self, path: &str, fields: FieldMap) -> Result<CreateOutcome, StoreError> {
        match self.db.doc(path).create(&to_fields(&fields)).await {
            Ok(()) => Ok(CreateOutcome::Created),
            Err(FirestoreError::AlreadyExists(_)) => Ok(CreateOutcome::AlreadyExists),
            Err(e) => Err(e.into()),
        }
    }

    async fn set_field(&self, path: &str, field: &str, value: FieldValue) -> Result<(), StoreError> {
        let fields = Fields::from([(field.to_string(), to_firestore_value(&value))]);
        Ok(self.db.doc(path).update_fields(&fields).await?)
    }

    async fn recursive_delete(&self, path: &str) -> Result<usize, StoreError> {
        Ok(self.db.doc(path).delete_recursive().await?)
    }
}

pub struct StorageObjectStore {
    bucket: Bucket,
}

impl StorageObjectStore {
    pub fn new(bucket: Bucket) -> Self {
        Self { bucket }
    }
}

#[async_trait]
impl ObjectStore for StorageObjectStore {
    async fn list_objects(&self, prefix: &str) -> Result<Vec<StoredObject>, StoreError> {
        let listed = self.bucket.list_files(prefix).await?;

        let mut objects = Vec::with_capacity(listed.len());
        for meta in listed {
            match (meta.updated_at(), meta.name) {
                (Some(updated_at), Some(name)) => objects.push(StoredObject { name, updated_at }),
                (None, Some(name)) => {
                    tracing::warn!(file = %name, "object has no timestamp, leaving it out of retention");
                }
                _ => {}
            }
        }

        Ok(objects)
    }

    async fn delete_object(&self, name: &str) -> Result<(), StoreError> {
        Ok(self.bucket.file(name).delete().await?)
    }
}
