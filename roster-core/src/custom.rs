//! Custom cosmetics (`custom.json`): one effect and one tag per account.
//!
//! Read through the [`Cache`] like the role table. A cold read loads the
//! document *and* fills the cache, so every read after the first is served
//! from memory whether or not a write happened in between.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cache::Cache;
use crate::document::DocumentStore;
use crate::error::{Result, RosterError};
use crate::types::{AccountId, DocumentKind};

/// The custom document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomData {
    /// Account → active effect name.
    #[serde(rename = "customeffects", default)]
    pub effects_by_account: IndexMap<AccountId, String>,
    /// Account → active custom tag.
    #[serde(rename = "customtag", default)]
    pub tags_by_account: IndexMap<AccountId, String>,
}

#[derive(Debug, Clone, Copy)]
enum Slot {
    Effect,
    Tag,
}

impl CustomData {
    fn slot_mut(&mut self, slot: Slot) -> &mut IndexMap<AccountId, String> {
        match slot {
            Slot::Effect => &mut self.effects_by_account,
            Slot::Tag => &mut self.tags_by_account,
        }
    }
}

/// CRUD over the custom document, read through the cache.
pub struct CustomStore {
    documents: Arc<dyn DocumentStore>,
    cache: Arc<Cache>,
    lock: Mutex<()>,
}

impl fmt::Debug for CustomStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomStore").finish_non_exhaustive()
    }
}

impl CustomStore {
    /// Create a store over `documents`, caching into `cache`.
    #[must_use]
    pub fn new(documents: Arc<dyn DocumentStore>, cache: Arc<Cache>) -> Self {
        Self {
            documents,
            cache,
            lock: Mutex::new(()),
        }
    }

    /// The custom data, from the cache or (first time) from the document.
    ///
    /// # Errors
    /// Returns an error if the document has to be loaded and cannot be.
    pub fn get_custom(&self) -> Result<Arc<CustomData>> {
        if let Some(custom) = self.cache.custom() {
            return Ok(custom);
        }
        let _guard = self.lock.lock();
        self.current_locked()
    }

    /// Active effect of `id`, if any.
    ///
    /// # Errors
    /// See [`CustomStore::get_custom`].
    pub fn effect_for(&self, id: &str) -> Result<Option<String>> {
        Ok(self.get_custom()?.effects_by_account.get(id).cloned())
    }

    /// Active custom tag of `id`, if any.
    ///
    /// # Errors
    /// See [`CustomStore::get_custom`].
    pub fn tag_for(&self, id: &str) -> Result<Option<String>> {
        Ok(self.get_custom()?.tags_by_account.get(id).cloned())
    }

    /// Set (or replace) the effect of `id`.
    ///
    /// # Errors
    /// Returns an error if the document cannot be loaded or written.
    pub fn set_effect(&self, id: &AccountId, effect: &str) -> Result<()> {
        self.upsert(Slot::Effect, id, effect)
    }

    /// Set (or replace) the custom tag of `id`.
    ///
    /// # Errors
    /// Returns an error if the document cannot be loaded or written.
    pub fn set_tag(&self, id: &AccountId, tag: &str) -> Result<()> {
        self.upsert(Slot::Tag, id, tag)
    }

    /// Clear the effect of `id`. Returns `false` if it had none.
    ///
    /// # Errors
    /// Returns an error if the document cannot be loaded or written.
    pub fn remove_effect(&self, id: &str) -> Result<bool> {
        self.remove(Slot::Effect, id)
    }

    /// Clear the custom tag of `id`. Returns `false` if it had none.
    ///
    /// # Errors
    /// Returns an error if the document cannot be loaded or written.
    pub fn remove_tag(&self, id: &str) -> Result<bool> {
        self.remove(Slot::Tag, id)
    }

    fn upsert(&self, slot: Slot, id: &AccountId, value: &str) -> Result<()> {
        self.modify(|custom| {
            let previous = custom.slot_mut(slot).insert(id.clone(), value.to_string());
            ((), previous.as_deref() != Some(value))
        })?;
        debug!(account = %id, ?slot, value, "Set custom entry");
        Ok(())
    }

    fn remove(&self, slot: Slot, id: &str) -> Result<bool> {
        self.modify(|custom| {
            // shift_remove keeps the remaining entries in document order.
            let removed = custom.slot_mut(slot).shift_remove(id).is_some();
            (removed, removed)
        })
    }

    /// Caller must hold `self.lock`.
    fn current_locked(&self) -> Result<Arc<CustomData>> {
        if let Some(custom) = self.cache.custom() {
            return Ok(custom);
        }
        let value = self.documents.load(DocumentKind::Custom)?;
        let custom: CustomData = serde_json::from_value(value)
            .map_err(|e| RosterError::malformed(DocumentKind::Custom, e))?;
        let custom = Arc::new(custom);
        self.cache.set_custom(Arc::clone(&custom));
        debug!(
            effects = custom.effects_by_account.len(),
            tags = custom.tags_by_account.len(),
            "Cached custom data"
        );
        Ok(custom)
    }

    fn modify<T>(&self, mutate: impl FnOnce(&mut CustomData) -> (T, bool)) -> Result<T> {
        let _guard = self.lock.lock();
        let mut custom = CustomData::clone(&*self.current_locked()?);
        let (out, changed) = mutate(&mut custom);
        if changed {
            let value = serde_json::to_value(&custom)
                .map_err(|e| RosterError::Serialization(e.to_string()))?;
            self.documents.dump(DocumentKind::Custom, &value)?;
            self.cache.set_custom(Arc::new(custom));
        }
        Ok(out)
    }
}
