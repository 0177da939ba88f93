//! Persistence gateway.
//!
//! The rest of the crate only sees [`DocumentStore`]: keyed JSON documents grouped in
//! collections (`users/{name}/characters`, `users/{name}/rollHistory`, ...). Watching a
//! collection yields a stream of full snapshots; consumers replace their state with each one.
//!
//! Two implementations ship here: [`MemoryStore`] and [`FileStore`], which keeps the same
//! in-memory collections and writes each one to `{root}/{path}.json` after every change.

use futures::channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fs::{File, create_dir_all, write};
use std::path::PathBuf;
use std::sync::Mutex;
use uuid::Uuid;

use crate::error::StoreError;

pub type DocumentId = String;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub fields: Value,
}

// Ordered documents of one collection at one moment.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Snapshot {
    pub path: String,
    pub documents: Vec<Document>,
}

pub type SnapshotStream = UnboundedReceiver<Snapshot>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

// Ordering and limit applied to a collection read.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Query {
    pub order_by: Option<(String, Direction)>,
    pub limit: Option<usize>,
}

impl Query {
    // Every document, in insertion order.
    pub fn all() -> Self {
        Query::default()
    }

    pub fn order_by(field: impl Into<String>, direction: Direction) -> Self {
        Query {
            order_by: Some((field.into(), direction)),
            limit: None,
        }
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn apply(&self, documents: &[Document]) -> Vec<Document> {
        let mut selected = documents.to_vec();
        if let Some((field, direction)) = &self.order_by {
            selected.sort_by(|a, b| {
                let ordering = compare_fields(a.fields.get(field), b.fields.get(field));
                match direction {
                    Direction::Ascending => ordering,
                    Direction::Descending => ordering.reverse(),
                }
            });
        }
        if let Some(limit) = self.limit {
            selected.truncate(limit);
        }
        selected
    }
}

// Numbers before strings; documents missing the field sort first ascending.
fn compare_fields(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(a)), Some(Value::Number(b))) => {
            let (a, b) = (a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0));
            a.partial_cmp(&b).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(a)), Some(Value::String(b))) => a.cmp(b),
        (Some(Value::Number(_)), Some(_)) => Ordering::Less,
        (Some(_), Some(Value::Number(_))) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

/// Keyed document storage with change notification.
pub trait DocumentStore: Send + Sync {
    /// Reads a collection once, ordered and bounded by `query`.
    fn snapshot(&self, path: &str, query: &Query) -> Result<Snapshot, StoreError>;

    /// Subscribes to a collection. The stream starts with the current snapshot and receives a
    /// fresh one after every change to that collection.
    fn watch(&self, path: &str, query: Query) -> Result<SnapshotStream, StoreError>;

    fn get(&self, path: &str, id: &str) -> Result<Document, StoreError>;

    /// Creates a document under a new id when `id` is `None`, otherwise overwrites it whole.
    fn put(&self, path: &str, id: Option<&str>, fields: Value) -> Result<DocumentId, StoreError>;

    fn delete(&self, path: &str, id: &str) -> Result<(), StoreError>;
}

pub fn characters_path(username: &str) -> String {
    format!("users/{username}/characters")
}

pub fn roll_history_path(username: &str) -> String {
    format!("users/{username}/rollHistory")
}

pub fn preferences_path(username: &str) -> String {
    format!("users/{username}/preferences")
}

fn validate_path(path: &str) -> Result<(), StoreError> {
    let valid = !path.is_empty()
        && path.split('/').all(|segment| {
            !segment.is_empty() && segment != "." && segment != ".." && !segment.contains('\\')
        });
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidPath(path.to_string()))
    }
}

struct Subscriber {
    path: String,
    query: Query,
    sender: UnboundedSender<Snapshot>,
}

#[derive(Default)]
struct Collections {
    documents: HashMap<String, Vec<Document>>,
    subscribers: Vec<Subscriber>,
}

impl Collections {
    fn snapshot(&self, path: &str, query: &Query) -> Snapshot {
        let documents = self
            .documents
            .get(path)
            .map(|docs| query.apply(docs))
            .unwrap_or_default();
        Snapshot {
            path: path.to_string(),
            documents,
        }
    }

    fn subscribe(&mut self, path: &str, query: Query) -> SnapshotStream {
        let (sender, receiver) = mpsc::unbounded();
        let _ = sender.unbounded_send(self.snapshot(path, &query));
        self.subscribers.push(Subscriber {
            path: path.to_string(),
            query,
            sender,
        });
        receiver
    }

    // Push a new snapshot to every live watcher of `path`, forgetting closed ones.
    fn notify(&mut self, path: &str) {
        let snapshots: Vec<Option<Snapshot>> = self
            .subscribers
            .iter()
            .map(|s| (s.path == path).then(|| self.snapshot(path, &s.query)))
            .collect();
        let mut index = 0;
        self.subscribers.retain(|subscriber| {
            let snapshot = snapshots[index].clone();
            index += 1;
            match snapshot {
                Some(snapshot) => subscriber.sender.unbounded_send(snapshot).is_ok(),
                None => !subscriber.sender.is_closed(),
            }
        });
    }

    fn get(&self, path: &str, id: &str) -> Result<Document, StoreError> {
        self.documents
            .get(path)
            .and_then(|docs| docs.iter().find(|doc| doc.id == id))
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                path: path.to_string(),
                id: id.to_string(),
            })
    }

    // The collection as it would be after the write. Nothing is changed until `commit`.
    fn staged_put(
        &self,
        path: &str,
        id: Option<&str>,
        fields: Value,
    ) -> (DocumentId, Vec<Document>) {
        let id = id.map_or_else(|| Uuid::new_v4().to_string(), str::to_string);
        let mut docs = self.documents.get(path).cloned().unwrap_or_default();
        match docs.iter_mut().find(|doc| doc.id == id) {
            Some(existing) => existing.fields = fields,
            None => docs.push(Document {
                id: id.clone(),
                fields,
            }),
        }
        (id, docs)
    }

    // `None` when there is nothing to remove.
    fn staged_delete(&self, path: &str, id: &str) -> Option<Vec<Document>> {
        let docs = self.documents.get(path)?;
        docs.iter()
            .any(|doc| doc.id == id)
            .then(|| docs.iter().filter(|doc| doc.id != id).cloned().collect())
    }

    fn commit(&mut self, path: &str, documents: Vec<Document>) {
        self.documents.insert(path.to_string(), documents);
        self.notify(path);
    }
}

// Collections held in memory only.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Collections>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DocumentStore for MemoryStore {
    fn snapshot(&self, path: &str, query: &Query) -> Result<Snapshot, StoreError> {
        validate_path(path)?;
        Ok(self.inner.lock()?.snapshot(path, query))
    }

    fn watch(&self, path: &str, query: Query) -> Result<SnapshotStream, StoreError> {
        validate_path(path)?;
        Ok(self.inner.lock()?.subscribe(path, query))
    }

    fn get(&self, path: &str, id: &str) -> Result<Document, StoreError> {
        validate_path(path)?;
        self.inner.lock()?.get(path, id)
    }

    fn put(&self, path: &str, id: Option<&str>, fields: Value) -> Result<DocumentId, StoreError> {
        validate_path(path)?;
        let mut collections = self.inner.lock()?;
        let (id, documents) = collections.staged_put(path, id, fields);
        collections.commit(path, documents);
        Ok(id)
    }

    fn delete(&self, path: &str, id: &str) -> Result<(), StoreError> {
        validate_path(path)?;
        let mut collections = self.inner.lock()?;
        match collections.staged_delete(path, id) {
            Some(documents) => collections.commit(path, documents),
            None => log::debug!("delete of missing document {path}/{id} ignored"),
        }
        Ok(())
    }
}

/// Collections persisted as pretty-printed JSON files under a root directory.
///
/// A collection is read from disk the first time it is touched and rewritten whole after each
/// change. The file is written before memory and watchers see the change, so a failed write
/// is returned to the caller and leaves the store as it was.
pub struct FileStore {
    root: PathBuf,
    inner: Mutex<Collections>,
    loaded: Mutex<HashSet<String>>,
}

impl FileStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        create_dir_all(&root)?;
        log::info!("File store opened at {}", root.display());
        Ok(FileStore {
            root,
            inner: Mutex::new(Collections::default()),
            loaded: Mutex::new(HashSet::new()),
        })
    }

    fn file_for(&self, path: &str) -> PathBuf {
        self.root.join(format!("{path}.json"))
    }

    // Load a collection from disk once; a missing file is an empty collection.
    fn ensure_loaded(&self, path: &str) -> Result<(), StoreError> {
        validate_path(path)?;
        let mut loaded = self.loaded.lock()?;
        if loaded.contains(path) {
            return Ok(());
        }
        let file = self.file_for(path);
        if file.exists() {
            let documents: Vec<Document> = serde_json::from_reader(File::open(&file)?)?;
            log::debug!("Loaded {} documents from {}", documents.len(), file.display());
            self.inner
                .lock()?
                .documents
                .insert(path.to_string(), documents);
        }
        loaded.insert(path.to_string());
        Ok(())
    }

    fn persist(&self, path: &str, documents: &[Document]) -> Result<(), StoreError> {
        let file = self.file_for(path);
        if let Some(parent) = file.parent() {
            create_dir_all(parent)?;
        }
        write(&file, serde_json::to_string_pretty(documents)?)?;
        Ok(())
    }
}

impl DocumentStore for FileStore {
    fn snapshot(&self, path: &str, query: &Query) -> Result<Snapshot, StoreError> {
        self.ensure_loaded(path)?;
        Ok(self.inner.lock()?.snapshot(path, query))
    }

    fn watch(&self, path: &str, query: Query) -> Result<SnapshotStream, StoreError> {
        self.ensure_loaded(path)?;
        Ok(self.inner.lock()?.subscribe(path, query))
    }

    fn get(&self, path: &str, id: &str) -> Result<Document, StoreError> {
        self.ensure_loaded(path)?;
        self.inner.lock()?.get(path, id)
    }

    fn put(&self, path: &str, id: Option<&str>, fields: Value) -> Result<DocumentId, StoreError> {
        self.ensure_loaded(path)?;
        let mut collections = self.inner.lock()?;
        let (id, documents) = collections.staged_put(path, id, fields);
        self.persist(path, &documents)?;
        collections.commit(path, documents);
        Ok(id)
    }

    fn delete(&self, path: &str, id: &str) -> Result<(), StoreError> {
        self.ensure_loaded(path)?;
        let mut collections = self.inner.lock()?;
        match collections.staged_delete(path, id) {
            Some(documents) => {
                self.persist(path, &documents)?;
                collections.commit(path, documents);
            }
            None => log::debug!("delete of missing document {path}/{id} ignored"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn put_creates_then_overwrites() {
        let store = MemoryStore::new();
        let id = store.put("users/ana/characters", None, json!({ "name": "A" })).unwrap();
        store
            .put("users/ana/characters", Some(&id), json!({ "level": 2 }))
            .unwrap();
        let doc = store.get("users/ana/characters", &id).unwrap();
        assert_eq!(doc.fields, json!({ "level": 2 }));
        let snapshot = store.snapshot("users/ana/characters", &Query::all()).unwrap();
        assert_eq!(snapshot.documents.len(), 1);
    }

    #[test]
    fn query_orders_and_limits() {
        let store = MemoryStore::new();
        for t in [5, 1, 9, 3] {
            store.put("log", None, json!({ "timestamp": t })).unwrap();
        }
        let query = Query::order_by("timestamp", Direction::Descending).limit(3);
        let snapshot = store.snapshot("log", &query).unwrap();
        let order: Vec<i64> = snapshot
            .documents
            .iter()
            .map(|d| d.fields["timestamp"].as_i64().unwrap())
            .collect();
        assert_eq!(order, vec![9, 5, 3]);
    }

    #[test]
    fn missing_document_is_not_found() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.get("a/b", "nope"),
            Err(StoreError::NotFound { .. })
        ));
        assert!(store.delete("a/b", "nope").is_ok());
    }

    #[test]
    fn invalid_paths_are_rejected() {
        let store = MemoryStore::new();
        for path in ["", "users//x", "../etc", "a/./b"] {
            assert!(matches!(
                store.snapshot(path, &Query::all()),
                Err(StoreError::InvalidPath(_))
            ));
        }
    }

    #[test]
    fn watchers_receive_full_snapshots() {
        let store = MemoryStore::new();
        let mut stream = store.watch("c", Query::all()).unwrap();
        let first = stream.try_next().unwrap().unwrap();
        assert!(first.documents.is_empty());

        let id = store.put("c", None, json!({ "n": 1 })).unwrap();
        store.put("other", None, json!({})).unwrap();
        store.delete("c", &id).unwrap();

        let after_put = stream.try_next().unwrap().unwrap();
        assert_eq!(after_put.documents.len(), 1);
        let after_delete = stream.try_next().unwrap().unwrap();
        assert!(after_delete.documents.is_empty());
        assert!(stream.try_next().is_err());
    }

    #[test]
    fn dropped_watchers_are_forgotten() {
        let store = MemoryStore::new();
        drop(store.watch("c", Query::all()).unwrap());
        store.put("c", None, json!({})).unwrap();
        assert!(store.inner.lock().unwrap().subscribers.is_empty());
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let id = {
            let store = FileStore::open(dir.path()).unwrap();
            store
                .put("users/ana/characters", None, json!({ "name": "Ana" }))
                .unwrap()
        };
        assert!(dir.path().join("users/ana/characters.json").exists());

        let reopened = FileStore::open(dir.path()).unwrap();
        let doc = reopened.get("users/ana/characters", &id).unwrap();
        assert_eq!(doc.fields["name"], "Ana");

        reopened.delete("users/ana/characters", &id).unwrap();
        let again = FileStore::open(dir.path()).unwrap();
        let snapshot = again.snapshot("users/ana/characters", &Query::all()).unwrap();
        assert!(snapshot.documents.is_empty());
    }

    #[test]
    fn failed_write_leaves_memory_and_watchers_alone() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        let path = "users/ana/characters";
        let kept = store.put(path, None, json!({ "name": "Ana" })).unwrap();
        let mut stream = store.watch(path, Query::all()).unwrap();
        assert_eq!(stream.try_next().unwrap().unwrap().documents.len(), 1);

        // A directory where the collection file belongs makes every write fail.
        let file = dir.path().join("users/ana/characters.json");
        std::fs::remove_file(&file).unwrap();
        std::fs::create_dir(&file).unwrap();

        assert!(matches!(
            store.put(path, None, json!({ "name": "Bia" })),
            Err(StoreError::IO(_))
        ));
        assert!(store.delete(path, &kept).is_err());

        let snapshot = store.snapshot(path, &Query::all()).unwrap();
        assert_eq!(snapshot.documents.len(), 1);
        assert_eq!(snapshot.documents[0].id, kept);
        assert!(stream.try_next().is_err());
    }
}
