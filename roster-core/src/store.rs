//! The [`PlayerStore`] facade: one object, built once at server start, that
//! owns the cache and the background writer and hands out the four stores.

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::cache::Cache;
use crate::config::{RosterConfig, WriterConfig};
use crate::custom::CustomStore;
use crate::document::{DocumentStore, JsonFileStore};
use crate::error::Result;
use crate::profile::ProfileStore;
use crate::registry::ClientRegistry;
use crate::role::RoleStore;
use crate::whitelist::WhitelistLoader;
use crate::writer::{BackgroundWriter, WriterStats};

/// Every player-data store, sharing one cache and one writer.
#[derive(Debug)]
pub struct PlayerStore {
    cache: Arc<Cache>,
    writer: Arc<BackgroundWriter>,
    profiles: ProfileStore,
    roles: RoleStore,
    custom: CustomStore,
    whitelist: WhitelistLoader,
}

impl PlayerStore {
    /// Open the JSON documents under `user_dir` (resolved through
    /// `config.storage`) and start the background writer.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid, the data directory
    /// cannot be created, or the writer thread cannot be spawned.
    pub fn open<P: AsRef<Path>>(
        user_dir: P,
        config: &RosterConfig,
        registry: Arc<dyn ClientRegistry>,
    ) -> Result<Self> {
        config.validate()?;
        let dir = config.storage.resolve(user_dir.as_ref());
        let documents = Arc::new(JsonFileStore::open(&dir, config.storage.indent)?);
        info!(dir = %dir.display(), "Player store opened");
        Self::with_documents(documents, registry, &config.writer)
    }

    /// Wire the stores over any [`DocumentStore`].
    ///
    /// # Errors
    /// Returns an error if the writer thread cannot be spawned.
    pub fn with_documents(
        documents: Arc<dyn DocumentStore>,
        registry: Arc<dyn ClientRegistry>,
        writer: &WriterConfig,
    ) -> Result<Self> {
        let cache = Arc::new(Cache::new());
        let writer = Arc::new(BackgroundWriter::spawn(writer)?);
        Ok(Self {
            profiles: ProfileStore::new(Arc::clone(&documents), registry, Arc::clone(&writer)),
            roles: RoleStore::new(Arc::clone(&documents), Arc::clone(&cache)),
            custom: CustomStore::new(Arc::clone(&documents), Arc::clone(&cache)),
            whitelist: WhitelistLoader::new(documents, Arc::clone(&cache)),
            cache,
            writer,
        })
    }

    /// Player profiles.
    #[must_use]
    pub fn profiles(&self) -> &ProfileStore {
        &self.profiles
    }

    /// Roles.
    #[must_use]
    pub fn roles(&self) -> &RoleStore {
        &self.roles
    }

    /// Custom effects and tags.
    #[must_use]
    pub fn custom(&self) -> &CustomStore {
        &self.custom
    }

    /// Whitelist import.
    #[must_use]
    pub fn whitelist(&self) -> &WhitelistLoader {
        &self.whitelist
    }

    /// The shared cache (whitelist queries, hit/miss stats).
    #[must_use]
    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    /// Shorthand for [`WhitelistLoader::load_whitelist`].
    ///
    /// # Errors
    /// See [`WhitelistLoader::load_whitelist`].
    pub fn load_whitelist(&self) -> Result<usize> {
        self.whitelist.load_whitelist()
    }

    /// Whether `id` is whitelisted (after [`PlayerStore::load_whitelist`]).
    #[must_use]
    pub fn is_whitelisted(&self, id: &str) -> bool {
        self.cache.is_whitelisted(id)
    }

    /// Block until every background write queued so far has finished.
    pub fn flush(&self) {
        self.writer.flush();
    }

    /// Background writer counters.
    #[must_use]
    pub fn writer_stats(&self) -> WriterStats {
        self.writer.stats()
    }
}
