//! Live-session registry notified when a profile is created.
//!
//! The server keeps its own table of connected clients; this crate only
//! needs to seed an entry for a freshly registered account. The seam is the
//! [`ClientRegistry`] trait. [`InMemoryClientRegistry`] is a concurrent
//! implementation usable directly by a server or in tests.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::profile::Profile;
use crate::types::{AccountId, epoch_seconds};

/// Live-session state for one connected account.
///
/// Serializes as the profile's fields plus the session counters, matching
/// the shape the game server keeps per client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Snapshot of the profile at registration time.
    #[serde(flatten)]
    pub profile: Profile,
    /// Warnings issued this session.
    #[serde(rename = "warnCount")]
    pub warn_count: u32,
    /// When the last warning was issued.
    #[serde(rename = "lastWarned", with = "epoch_seconds")]
    pub last_warned_at: DateTime<Utc>,
    /// Whether the client passed verification.
    pub verified: bool,
    /// Joins counted in the current rejoin window.
    #[serde(rename = "rejoincount")]
    pub rejoin_count: u32,
    /// When the client last joined.
    #[serde(rename = "lastJoin", with = "epoch_seconds")]
    pub last_join_at: DateTime<Utc>,
}

impl SessionRecord {
    /// Record for an account that just registered: no warnings, unverified,
    /// first join.
    #[must_use]
    pub fn fresh(profile: Profile, now: DateTime<Utc>) -> Self {
        Self {
            profile,
            warn_count: 0,
            last_warned_at: now,
            verified: false,
            rejoin_count: 1,
            last_join_at: now,
        }
    }
}

/// Server-wide registry of connected clients.
pub trait ClientRegistry: Send + Sync {
    /// Insert (or replace) the live record for `account`.
    ///
    /// # Errors
    /// Implementations return [`RosterError::Registry`](crate::RosterError::Registry)
    /// when the record cannot be stored.
    fn register_session(&self, account: &AccountId, session: SessionRecord) -> Result<()>;
}

/// Concurrent in-memory [`ClientRegistry`].
#[derive(Debug, Default)]
pub struct InMemoryClientRegistry {
    sessions: DashMap<AccountId, SessionRecord>,
}

impl InMemoryClientRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the live record for `account`.
    #[must_use]
    pub fn get(&self, account: &str) -> Option<SessionRecord> {
        self.sessions.get(account).map(|entry| entry.value().clone())
    }

    /// Drop the live record, e.g. when the client disconnects.
    pub fn remove(&self, account: &str) -> Option<SessionRecord> {
        self.sessions.remove(account).map(|(_, session)| session)
    }

    /// Number of live records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no client is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl ClientRegistry for InMemoryClientRegistry {
    fn register_session(&self, account: &AccountId, session: SessionRecord) -> Result<()> {
        self.sessions.insert(account.clone(), session);
        Ok(())
    }
}
