//! Startup import of `whitelist.json` into the cache.

use std::sync::Arc;

use tracing::info;

use crate::cache::Cache;
use crate::document::DocumentStore;
use crate::error::{Result, RosterError};
use crate::types::{AccountId, DocumentKind};

/// Loads the whitelist document into the [`Cache`].
///
/// There is no write path: the whitelist is edited outside the server and
/// read once at startup. Loading is a set union, so calling it again (for a
/// reload command, say) picks up new ids without duplicating old ones.
pub struct WhitelistLoader {
    documents: Arc<dyn DocumentStore>,
    cache: Arc<Cache>,
}

impl std::fmt::Debug for WhitelistLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhitelistLoader").finish_non_exhaustive()
    }
}

impl WhitelistLoader {
    /// Create a loader over `documents`, filling `cache`.
    #[must_use]
    pub fn new(documents: Arc<dyn DocumentStore>, cache: Arc<Cache>) -> Self {
        Self { documents, cache }
    }

    /// Read the whitelist document and union it into the cache.
    /// Returns the number of ids not already whitelisted.
    ///
    /// # Errors
    /// Returns an error if the document cannot be loaded or is not a list
    /// of strings.
    pub fn load_whitelist(&self) -> Result<usize> {
        let value = self.documents.load(DocumentKind::Whitelist)?;
        let ids: Vec<AccountId> = serde_json::from_value(value)
            .map_err(|e| RosterError::malformed(DocumentKind::Whitelist, e))?;
        let total = ids.len();
        let added = self.cache.extend_whitelist(ids);
        info!(total, added, "Loaded whitelist");
        Ok(added)
    }
}
