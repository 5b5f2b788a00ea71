//! In-process store.
//!
//! Each collection is a `BTreeMap` behind one mutex; holding the mutex for the
//! whole call is what makes `find_one_and_update` atomic.

use super::{
    Collection, Document, Filter, IndexSpec, Selection, Store, Update, choose_target, document_id,
    prepare_upsert,
};
use crate::clock::{self, Clock};
use crate::error::{LeaseholdError, Result};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

/// A store whose collections live in this process.
#[derive(Debug)]
pub struct MemoryStore {
    clock: Arc<dyn Clock>,
    collections: Mutex<HashMap<String, Arc<MemoryCollection>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(clock::system())
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            collections: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Store for MemoryStore {
    fn collection(&self, name: &str) -> Result<Arc<dyn Collection>> {
        let mut collections = self
            .collections
            .lock()
            .unwrap_or_else(|poison| poison.into_inner());
        let collection = collections
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MemoryCollection::new(name, self.clock.clone())))
            .clone();
        Ok(collection)
    }
}

#[derive(Debug, Default)]
struct State {
    docs: BTreeMap<String, Document>,
    geo_indexes: BTreeSet<String>,
}

/// One in-process collection.
#[derive(Debug)]
pub struct MemoryCollection {
    name: String,
    clock: Arc<dyn Clock>,
    state: Mutex<State>,
}

impl MemoryCollection {
    pub fn new(name: &str, clock: Arc<dyn Clock>) -> Self {
        Self {
            name: name.to_string(),
            clock,
            state: Mutex::new(State::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        // A panic inside a call never leaves a half-applied document behind:
        // documents are replaced whole.
        self.state
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }

    fn duplicate(&self, id: String) -> LeaseholdError {
        LeaseholdError::DuplicateKey {
            collection: self.name.clone(),
            id,
        }
    }
}

impl Collection for MemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn ensure_index(&self, index: IndexSpec) -> Result<()> {
        let IndexSpec::Geo2d(field) = index;
        self.state().geo_indexes.insert(field);
        Ok(())
    }

    fn insert_one(&self, doc: Document) -> Result<()> {
        let id = document_id(&self.name, &doc)?.to_string();
        let mut state = self.state();
        if state.docs.contains_key(&id) {
            return Err(self.duplicate(id));
        }
        state.docs.insert(id, doc);
        Ok(())
    }

    fn find_one_and_update(
        &self,
        filter: &Filter,
        update: &Update,
        selection: &Selection,
        upsert: Option<Document>,
    ) -> Result<Option<Document>> {
        let now = self.clock.now();
        let mut state = self.state();

        let target = {
            let candidates: Vec<&Document> = match filter.pinned_id() {
                Some(id) => state.docs.get(id).into_iter().collect(),
                None => state.docs.values().collect(),
            };
            choose_target(&self.name, &candidates, filter, selection, now, |field| {
                state.geo_indexes.contains(field)
            })?
            .map(|i| document_id(&self.name, candidates[i]).map(str::to_string))
            .transpose()?
        };

        if let Some(id) = target {
            let Some(doc) = state.docs.get_mut(&id) else {
                return Ok(None);
            };
            let mut updated = doc.clone();
            update.apply(&self.name, &mut updated, now)?;
            *doc = updated.clone();
            return Ok(Some(updated));
        }

        let Some(upsert) = upsert else {
            return Ok(None);
        };
        let (id, doc) = prepare_upsert(&self.name, upsert, update, now)?;
        if state.docs.contains_key(&id) {
            return Err(self.duplicate(id));
        }
        state.docs.insert(id, doc.clone());
        Ok(Some(doc))
    }

    fn delete_many(&self, filter: &Filter) -> Result<u64> {
        let now = self.clock.now();
        let mut state = self.state();
        let before = state.docs.len();
        state.docs.retain(|_, doc| !filter.matches(doc, now));
        Ok((before - state.docs.len()) as u64)
    }

    fn find(&self, filter: &Filter) -> Result<Vec<Document>> {
        let now = self.clock.now();
        Ok(self
            .state()
            .docs
            .values()
            .filter(|doc| filter.matches(doc, now))
            .cloned()
            .collect())
    }
}
