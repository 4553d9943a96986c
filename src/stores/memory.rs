//! Process-local stores.
//!
//! They follow the same contracts as the Firebase-backed stores, including
//! distinguishable not-found outcomes, and can emit identity events so a
//! dispatcher can play the role of the platform's auth triggers.

use super::{
    CreateOutcome, DocumentEntry, DocumentStore, FieldMap, FieldValue, Filter, IdentityError,
    IdentityEvent, IdentityRecord, IdentityStore, ObjectStore, StoreError, StoredObject,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::mpsc::UnboundedSender;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Default)]
pub struct MemoryIdentityStore {
    users: Mutex<BTreeMap<String, usize>>,
    deleted: Mutex<Vec<String>>,
    failing: Mutex<HashSet<String>>,
    events: Option<UnboundedSender<IdentityEvent>>,
    next_id: AtomicU64,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emits `Created`/`Upgraded`/`Deleted` events on `events`.
    pub fn with_events(events: UnboundedSender<IdentityEvent>) -> Self {
        Self {
            events: Some(events),
            ..Self::default()
        }
    }

    fn emit(&self, event: IdentityEvent) {
        if let Some(events) = &self.events {
            // A closed receiver only means nobody is dispatching.
            let _ = events.send(event);
        }
    }

    /// Inserts an identity without emitting an event.
    pub fn insert(&self, uid: &str, provider_count: usize) {
        lock(&self.users).insert(uid.to_string(), provider_count);
    }

    /// Links one more credential provider to an existing identity.
    pub fn link_provider(&self, uid: &str) -> Result<(), IdentityError> {
        let mut users = lock(&self.users);
        let count = users.get_mut(uid).ok_or(IdentityError::NotFound)?;
        *count += 1;
        drop(users);
        self.emit(IdentityEvent::Upgraded { uid: uid.to_string() });
        Ok(())
    }

    /// Removes an identity out of band, as a concurrent process would.
    pub fn remove(&self, uid: &str) -> bool {
        lock(&self.users).remove(uid).is_some()
    }

    pub fn contains(&self, uid: &str) -> bool {
        lock(&self.users).contains_key(uid)
    }

    /// Uids removed through `delete_identity`, in call order.
    pub fn deleted_uids(&self) -> Vec<String> {
        lock(&self.deleted).clone()
    }

    /// Makes every call for `uid` fail with a backend error.
    pub fn fail_on(&self, uid: &str) {
        lock(&self.failing).insert(uid.to_string());
    }

    fn check_failing(&self, uid: &str) -> Result<(), IdentityError> {
        if lock(&self.failing).contains(uid) {
            return Err(IdentityError::Backend(format!("injected failure for {}", uid)));
        }
        Ok(())
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn create_identity(&self) -> Result<String, IdentityError> {
        let uid = format!("anon-{}", self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        lock(&self.users).insert(uid.clone(), 0);
        self.emit(IdentityEvent::Created {
            uid: uid.clone(),
            provider_count: 0,
        });
        Ok(uid)
    }

    async fn get_identity(&self, uid: &str) -> Result<IdentityRecord, IdentityError> {
        self.check_failing(uid)?;
        lock(&self.users)
            .get(uid)
            .map(|&provider_count| IdentityRecord {
                uid: uid.to_string(),
                provider_count,
            })
            .ok_or(IdentityError::NotFound)
    }

    async fn delete_identity(&self, uid: &str) -> Result<(), IdentityError> {
        self.check_failing(uid)?;
        if lock(&self.users).remove(uid).is_none() {
            return Err(IdentityError::NotFound);
        }
        lock(&self.deleted).push(uid.to_string());
        self.emit(IdentityEvent::Deleted { uid: uid.to_string() });
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryDocumentStore {
    documents: Mutex<BTreeMap<String, FieldMap>>,
    fail_queries: AtomicBool,
}

fn parent_of(path: &str) -> Option<&str> {
    path.rsplit_once('/').map(|(parent, _)| parent)
}

fn collection_id_of(path: &str) -> Option<&str> {
    parent_of(path).map(|parent| parent.rsplit('/').next().unwrap_or(parent))
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes a document unconditionally.
    pub fn put(&self, path: &str, fields: FieldMap) {
        lock(&self.documents).insert(path.to_string(), fields);
    }

    pub fn fields(&self, path: &str) -> Option<FieldMap> {
        lock(&self.documents).get(path).cloned()
    }

    /// Paths of all documents at or below `path`.
    pub fn paths_under(&self, path: &str) -> Vec<String> {
        let nested = format!("{}/", path);
        lock(&self.documents)
            .keys()
            .filter(|p| p.as_str() == path || p.starts_with(&nested))
            .cloned()
            .collect()
    }

    /// Makes `query` and `list` fail, as a database outage would.
    pub fn fail_queries(&self, fail: bool) {
        self.fail_queries.store(fail, Ordering::SeqCst);
    }

    fn check_queries(&self) -> Result<(), StoreError> {
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("injected query failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn query(
        &self,
        collection_group: &str,
        filters: &[Filter],
    ) -> Result<Vec<DocumentEntry>, StoreError> {
        self.check_queries()?;
        Ok(lock(&self.documents)
            .iter()
            .filter(|(path, _)| collection_id_of(path) == Some(collection_group))
            .filter(|(_, fields)| filters.iter().all(|f| f.matches(fields)))
            .map(|(path, fields)| DocumentEntry {
                path: path.clone(),
                fields: fields.clone(),
            })
            .collect())
    }

    async fn list(&self, collection: &str) -> Result<Vec<DocumentEntry>, StoreError> {
        self.check_queries()?;
        Ok(lock(&self.documents)
            .iter()
            .filter(|(path, _)| parent_of(path) == Some(collection))
            .map(|(path, fields)| DocumentEntry {
                path: path.clone(),
                fields: fields.clone(),
            })
            .collect())
    }

    async fn create(&self, path: &str, fields: FieldMap) -> Result<CreateOutcome, StoreError> {
        let mut documents = lock(&self.documents);
        if documents.contains_key(path) {
            return Ok(CreateOutcome::AlreadyExists);
        }
        documents.insert(path.to_string(), fields);
        Ok(CreateOutcome::Created)
    }

    async fn set_field(&self, path: &str, field: &str, value: FieldValue) -> Result<(), StoreError> {
        let mut documents = lock(&self.documents);
        let fields = documents
            .get_mut(path)
            .ok_or_else(|| StoreError::NotFound(path.to_string()))?;
        fields.insert(field.to_string(), value);
        Ok(())
    }

    async fn recursive_delete(&self, path: &str) -> Result<usize, StoreError> {
        let nested = format!("{}/", path);
        let mut documents = lock(&self.documents);
        let before = documents.len();
        documents.retain(|p, _| p != path && !p.starts_with(&nested));
        Ok(before - documents.len())
    }
}

#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<BTreeMap<String, DateTime<Utc>>>,
    failing: Mutex<HashSet<String>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, name: &str, updated_at: DateTime<Utc>) {
        lock(&self.objects).insert(name.to_string(), updated_at);
    }

    pub fn names(&self) -> Vec<String> {
        lock(&self.objects).keys().cloned().collect()
    }

    /// Makes deleting `name` fail with a backend error.
    pub fn fail_on(&self, name: &str) {
        lock(&self.failing).insert(name.to_string());
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn list_objects(&self, prefix: &str) -> Result<Vec<StoredObject>, StoreError> {
        Ok(lock(&self.objects)
            .iter()
            .filter(|(name, _)| name.starts_with(prefix))
            .map(|(name, updated_at)| StoredObject {
                name: name.clone(),
                updated_at: *updated_at,
            })
            .collect())
    }

    async fn delete_object(&self, name: &str) -> Result<(), StoreError> {
        if lock(&self.failing).contains(name) {
            return Err(StoreError::Backend(format!("injected failure for {}", name)));
        }
        lock(&self.objects)
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }
}
