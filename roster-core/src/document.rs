//! Document persistence.
//!
//! A [`DocumentStore`] loads and writes whole JSON documents, one per
//! [`DocumentKind`]. Each individual call is atomic; a load followed by a
//! write is *not*, which is why every store in this crate holds its own
//! per-document lock across the pair.
//!
//! Two implementations ship with the crate:
//!
//! - [`JsonFileStore`]: one file per document in a data directory, written
//!   via temp file + rename so readers never observe a half-written file.
//! - [`MemoryDocumentStore`]: in-process documents with load/write counters
//!   and an injectable write failure, used by tests and embedders that do
//!   their own persistence.

use std::collections::HashMap;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::RwLock;
use serde_json::Value;
use tracing::debug;

use crate::error::{Result, RosterError};
use crate::types::DocumentKind;

/// Atomic load / dump of named JSON documents.
pub trait DocumentStore: Send + Sync {
    /// Load the full document. A document that was never written loads as
    /// [`DocumentKind::empty`].
    ///
    /// # Errors
    /// Returns an error if the document cannot be read or parsed.
    fn load(&self, kind: DocumentKind) -> Result<Value>;

    /// Replace the full document.
    ///
    /// # Errors
    /// Returns an error if the document cannot be written.
    fn dump(&self, kind: DocumentKind, document: &Value) -> Result<()>;

    /// Replace the full document in its canonical pretty form. Used for the
    /// role document; equivalent to [`DocumentStore::dump`] unless overridden.
    ///
    /// # Errors
    /// Returns an error if the document cannot be written.
    fn format(&self, kind: DocumentKind, document: &Value) -> Result<()> {
        self.dump(kind, document)
    }
}

// ---------------------------------------------------------------------------
// JsonFileStore
// ---------------------------------------------------------------------------

/// File-backed document store rooted at a data directory.
#[derive(Debug)]
pub struct JsonFileStore {
    dir: PathBuf,
    indent: Vec<u8>,
    temp_counter: AtomicU64,
}

impl JsonFileStore {
    /// Open a store in `dir`, creating the directory if needed.
    ///
    /// # Errors
    /// Returns [`RosterError::Io`] if the directory cannot be created.
    pub fn open<P: AsRef<Path>>(dir: P, indent: usize) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        debug!(dir = %dir.display(), indent, "Document directory ready");
        Ok(Self {
            dir,
            indent: vec![b' '; indent],
            temp_counter: AtomicU64::new(0),
        })
    }

    /// The data directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Full path of a document's file.
    #[must_use]
    pub fn path_of(&self, kind: DocumentKind) -> PathBuf {
        self.dir.join(kind.file_name())
    }

    fn encode(&self, kind: DocumentKind, document: &Value) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(&self.indent);
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        serde::Serialize::serialize(document, &mut ser)
            .map_err(|e| RosterError::Serialization(format!("{kind}: {e}")))?;
        buf.push(b'\n');
        Ok(buf)
    }

    /// Write to a uniquely named sibling temp file, then rename over the
    /// target. Rename within one directory is atomic on the platforms we run on.
    fn write_atomic(&self, kind: DocumentKind, bytes: &[u8]) -> Result<()> {
        let target = self.path_of(kind);
        let n = self.temp_counter.fetch_add(1, Ordering::Relaxed);
        let temp = self
            .dir
            .join(format!(".{}.{}.{n}.tmp", kind.file_name(), std::process::id()));

        let written = (|| -> std::io::Result<()> {
            let mut file = std::fs::File::create(&temp)?;
            file.write_all(bytes)?;
            file.sync_all()?;
            std::fs::rename(&temp, &target)
        })();

        if let Err(e) = written {
            let _ = std::fs::remove_file(&temp);
            return Err(e.into());
        }
        Ok(())
    }
}

impl DocumentStore for JsonFileStore {
    fn load(&self, kind: DocumentKind) -> Result<Value> {
        let start = Instant::now();
        let path = self.path_of(kind);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(document = %kind, path = %path.display(), "Document missing, using empty");
                return Ok(kind.empty());
            }
            Err(e) => return Err(e.into()),
        };
        if content.trim().is_empty() {
            return Ok(kind.empty());
        }

        let document: Value =
            serde_json::from_str(&content).map_err(|e| RosterError::malformed(kind, e))?;

        debug!(
            document = %kind,
            bytes = content.len(),
            elapsed_us = start.elapsed().as_micros(),
            "Loaded document"
        );
        Ok(document)
    }

    fn dump(&self, kind: DocumentKind, document: &Value) -> Result<()> {
        let start = Instant::now();
        let bytes = self.encode(kind, document)?;
        self.write_atomic(kind, &bytes)?;
        debug!(
            document = %kind,
            bytes = bytes.len(),
            elapsed_us = start.elapsed().as_micros(),
            "Wrote document"
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryDocumentStore
// ---------------------------------------------------------------------------

/// In-process document store.
///
/// Counts loads and writes per document so tests can observe whether a read
/// was served from the cache, and can be told to fail writes to exercise
/// persistence-failure paths.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    documents: RwLock<HashMap<DocumentKind, Value>>,
    loads: RwLock<HashMap<DocumentKind, u64>>,
    writes: RwLock<HashMap<DocumentKind, u64>>,
    fail_writes: AtomicBool,
}

impl MemoryDocumentStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed or replace a document without touching the counters. Stands in
    /// for an external writer editing the file behind the store's back.
    pub fn put(&self, kind: DocumentKind, document: Value) {
        self.documents.write().insert(kind, document);
    }

    /// Current content of a document, without counting a load.
    #[must_use]
    pub fn get(&self, kind: DocumentKind) -> Value {
        self.documents
            .read()
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| kind.empty())
    }

    /// Number of `load` calls served for `kind`.
    #[must_use]
    pub fn load_count(&self, kind: DocumentKind) -> u64 {
        self.loads.read().get(&kind).copied().unwrap_or(0)
    }

    /// Number of successful `dump`/`format` calls for `kind`.
    #[must_use]
    pub fn write_count(&self, kind: DocumentKind) -> u64 {
        self.writes.read().get(&kind).copied().unwrap_or(0)
    }

    /// Make every subsequent write fail with an I/O error until reset.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

impl DocumentStore for MemoryDocumentStore {
    fn load(&self, kind: DocumentKind) -> Result<Value> {
        *self.loads.write().entry(kind).or_insert(0) += 1;
        Ok(self.get(kind))
    }

    fn dump(&self, kind: DocumentKind, document: &Value) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(RosterError::Io(std::io::Error::other(format!(
                "simulated write failure for {kind}"
            ))));
        }
        self.documents.write().insert(kind, document.clone());
        *self.writes.write().entry(kind).or_insert(0) += 1;
        Ok(())
    }
}
