//! Directory-backed store shared between processes.
//!
//! # Layout
//!
//! ```text
//! <root>/<database>/<collection>/
//!     .collection.lock      exclusive OS lock held during each mutating call
//!     .indexes.json         declared 2d index fields
//!     <escaped-id>.json     one file per document
//! ```
//!
//! A mutating call takes the collection lock, reads the candidates, applies
//! the change with an atomic file replace, and releases the lock. `find` reads
//! without the lock; atomic replacement keeps each document it sees whole.

mod guard;
mod naming;

pub use guard::GuardMetadata;

use super::{
    Collection, Document, Filter, IndexSpec, Selection, Store, Update, choose_target, document_id,
    prepare_upsert,
};
use crate::clock::{self, Clock};
use crate::error::{LeaseholdError, Result};
use crate::fs::{atomic_write, remove_if_exists};
use chrono::{DateTime, Utc};
use guard::CollectionGuard;
use naming::{document_file_name, is_document_file};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const LOCK_FILE: &str = ".collection.lock";
const INDEX_FILE: &str = ".indexes.json";

/// Call-plane bounds for the file store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStoreOptions {
    /// How long a call waits for the collection lock before failing with
    /// [`LeaseholdError::Timeout`].
    pub operation_timeout: Duration,
    /// Pause between lock attempts (jittered upward by up to half).
    pub retry_interval: Duration,
}

impl Default for FileStoreOptions {
    fn default() -> Self {
        Self {
            operation_timeout: Duration::from_millis(5000),
            retry_interval: Duration::from_millis(10),
        }
    }
}

/// A store rooted at `<root>/<database>`.
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
    clock: Arc<dyn Clock>,
    options: FileStoreOptions,
    opened: Mutex<HashMap<String, Arc<FileCollection>>>,
}

impl FileStore {
    /// Open (creating if needed) the database directory.
    pub fn open<P: AsRef<Path>>(root: P, database: &str) -> Result<Self> {
        Self::open_with(root, database, FileStoreOptions::default(), clock::system())
    }

    pub fn open_with<P: AsRef<Path>>(
        root: P,
        database: &str,
        options: FileStoreOptions,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        validate_segment("database", database)?;
        let dir = root.as_ref().join(database);
        fs::create_dir_all(&dir)
            .map_err(|e| LeaseholdError::io("failed to create database directory", &dir, e))?;

        Ok(Self {
            dir,
            clock,
            options,
            opened: Mutex::new(HashMap::new()),
        })
    }

    /// The database directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Open a collection with its concrete type.
    pub fn file_collection(&self, name: &str) -> Result<Arc<FileCollection>> {
        let mut opened = self
            .opened
            .lock()
            .unwrap_or_else(|poison| poison.into_inner());
        if let Some(existing) = opened.get(name) {
            return Ok(existing.clone());
        }

        validate_segment("collection", name)?;
        let collection = Arc::new(FileCollection::create(
            name,
            self.dir.join(name),
            self.clock.clone(),
            self.options,
        )?);
        opened.insert(name.to_string(), collection.clone());
        Ok(collection)
    }
}

impl Store for FileStore {
    fn collection(&self, name: &str) -> Result<Arc<dyn Collection>> {
        let collection: Arc<dyn Collection> = self.file_collection(name)?;
        Ok(collection)
    }
}

fn validate_segment(kind: &str, name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.');
    if valid {
        Ok(())
    } else {
        Err(LeaseholdError::UserError(format!(
            "invalid {} name '{}': use letters, digits, '-', '_' or '.', not leading '.'",
            kind, name
        )))
    }
}

/// One collection directory.
#[derive(Debug)]
pub struct FileCollection {
    name: String,
    dir: PathBuf,
    clock: Arc<dyn Clock>,
    options: FileStoreOptions,
}

impl FileCollection {
    fn create(
        name: &str,
        dir: PathBuf,
        clock: Arc<dyn Clock>,
        options: FileStoreOptions,
    ) -> Result<Self> {
        fs::create_dir_all(&dir)
            .map_err(|e| LeaseholdError::io("failed to create collection directory", &dir, e))?;
        Ok(Self {
            name: name.to_string(),
            dir,
            clock,
            options,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Whoever last held the collection lock, if recorded.
    pub fn last_lock_owner(&self) -> Option<GuardMetadata> {
        guard::read_metadata(&self.dir.join(LOCK_FILE))
    }

    fn lock(&self) -> Result<CollectionGuard> {
        CollectionGuard::acquire(&self.dir.join(LOCK_FILE), &self.name, &self.options)
    }

    fn document_path(&self, id: &str) -> PathBuf {
        self.dir.join(document_file_name(id))
    }

    fn corrupt(&self, path: &Path, message: impl std::fmt::Display) -> LeaseholdError {
        LeaseholdError::Corrupt {
            collection: self.name.clone(),
            message: format!("{}: {}", path.display(), message),
        }
    }

    fn read_document(&self, path: &Path) -> Result<Option<Document>> {
        let content = match fs::read(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(LeaseholdError::io("failed to read document", path, e)),
        };
        match serde_json::from_slice::<Value>(&content) {
            Ok(Value::Object(doc)) => Ok(Some(doc)),
            Ok(_) => Err(self.corrupt(path, "not a JSON object")),
            Err(e) => Err(self.corrupt(path, e)),
        }
    }

    /// Every document, ordered by file name.
    fn read_all(&self) -> Result<Vec<Document>> {
        let entries = fs::read_dir(&self.dir)
            .map_err(|e| LeaseholdError::io("failed to list collection", &self.dir, e))?;

        let mut paths = Vec::new();
        for entry in entries {
            let entry =
                entry.map_err(|e| LeaseholdError::io("failed to list collection", &self.dir, e))?;
            let file_name = entry.file_name();
            if is_document_file(&file_name.to_string_lossy()) {
                paths.push(entry.path());
            }
        }
        paths.sort();

        let mut docs = Vec::with_capacity(paths.len());
        for path in paths {
            // A concurrent delete between listing and reading is fine.
            if let Some(doc) = self.read_document(&path)? {
                docs.push(doc);
            }
        }
        docs.sort_by(|a, b| id_of(a).cmp(id_of(b)));
        Ok(docs)
    }

    fn read_candidates(&self, filter: &Filter) -> Result<Vec<Document>> {
        match filter.pinned_id() {
            Some(id) => Ok(self
                .read_document(&self.document_path(id))?
                .into_iter()
                .collect()),
            None => self.read_all(),
        }
    }

    fn write_document(&self, id: &str, doc: &Document) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(doc).map_err(|e| {
            LeaseholdError::Store(format!("failed to encode document '{}': {}", id, e))
        })?;
        atomic_write(self.document_path(id), &bytes)
    }

    fn read_indexes(&self) -> Result<BTreeSet<String>> {
        let path = self.dir.join(INDEX_FILE);
        let content = match fs::read(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeSet::new()),
            Err(e) => return Err(LeaseholdError::io("failed to read index file", &path, e)),
        };
        serde_json::from_slice(&content).map_err(|e| self.corrupt(&path, e))
    }

    fn duplicate(&self, id: String) -> LeaseholdError {
        LeaseholdError::DuplicateKey {
            collection: self.name.clone(),
            id,
        }
    }
}

fn id_of(doc: &Document) -> &str {
    doc.get(super::ID_FIELD)
        .and_then(Value::as_str)
        .unwrap_or_default()
}

impl Collection for FileCollection {
    fn name(&self) -> &str {
        &self.name
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn ensure_index(&self, index: IndexSpec) -> Result<()> {
        let IndexSpec::Geo2d(field) = index;
        let _guard = self.lock()?;
        let mut indexes = self.read_indexes()?;
        if indexes.insert(field) {
            let bytes = serde_json::to_vec_pretty(&indexes).map_err(|e| {
                LeaseholdError::Store(format!("failed to encode index list: {}", e))
            })?;
            atomic_write(self.dir.join(INDEX_FILE), &bytes)?;
        }
        Ok(())
    }

    fn insert_one(&self, doc: Document) -> Result<()> {
        let id = document_id(&self.name, &doc)?.to_string();
        let _guard = self.lock()?;
        if self.document_path(&id).exists() {
            return Err(self.duplicate(id));
        }
        self.write_document(&id, &doc)
    }

    fn find_one_and_update(
        &self,
        filter: &Filter,
        update: &Update,
        selection: &Selection,
        upsert: Option<Document>,
    ) -> Result<Option<Document>> {
        let _guard = self.lock()?;
        let now = self.clock.now();
        let indexes = self.read_indexes()?;
        let docs = self.read_candidates(filter)?;
        let candidates: Vec<&Document> = docs.iter().collect();

        let target = choose_target(&self.name, &candidates, filter, selection, now, |field| {
            indexes.contains(field)
        })?;

        if let Some(i) = target {
            let mut updated = docs[i].clone();
            let id = document_id(&self.name, &updated)?.to_string();
            update.apply(&self.name, &mut updated, now)?;
            self.write_document(&id, &updated)?;
            return Ok(Some(updated));
        }

        let Some(upsert) = upsert else {
            return Ok(None);
        };
        let (id, doc) = prepare_upsert(&self.name, upsert, update, now)?;
        if self.document_path(&id).exists() {
            return Err(self.duplicate(id));
        }
        self.write_document(&id, &doc)?;
        Ok(Some(doc))
    }

    fn delete_many(&self, filter: &Filter) -> Result<u64> {
        let _guard = self.lock()?;
        let now = self.clock.now();
        let mut removed = 0;
        for doc in self.read_candidates(filter)? {
            if filter.matches(&doc, now) {
                let id = document_id(&self.name, &doc)?;
                if remove_if_exists(self.document_path(id))? {
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    fn find(&self, filter: &Filter) -> Result<Vec<Document>> {
        let now = self.clock.now();
        Ok(self
            .read_candidates(filter)?
            .into_iter()
            .filter(|doc| filter.matches(doc, now))
            .collect())
    }
}
