//! Player profiles (`profiles.json`).
//!
//! Profiles change often and are read from many code paths, so every read
//! loads the document fresh; there is no cache layer. All mutations hold the
//! profile document lock across load → mutate → write, and reads take the
//! same lock so they never see a half-applied background write.
//!
//! Ban / mute / unmute are recorded in a *pending overlay* and persisted by
//! the [`BackgroundWriter`]. Reads apply the overlay, so a flip is visible as
//! soon as the call returns. Any later write of the profile document folds
//! the overlay in as well, so a flip whose background write kept failing is
//! persisted by the next successful write.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::document::DocumentStore;
use crate::error::{Result, RosterError};
use crate::registry::{ClientRegistry, SessionRecord};
use crate::types::{AccountId, DocumentKind, epoch_seconds, push_unique};
use crate::writer::{BackgroundWriter, PersistJob};

/// Every profile, keyed by account, in document order.
pub type ProfileTable = IndexMap<AccountId, Profile>;

// ---------------------------------------------------------------------------
// Profile
// ---------------------------------------------------------------------------

/// Durable record of one player account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// Every display string seen for this account, oldest first.
    #[serde(rename = "display_string", default, deserialize_with = "string_or_list")]
    pub display_strings: Vec<String>,
    /// In-game profile names used by this account.
    #[serde(rename = "profiles", default)]
    pub linked_profiles: Vec<String>,
    /// Current display name.
    #[serde(default)]
    pub name: String,
    /// Banned from the server.
    #[serde(rename = "isBan", default)]
    pub is_banned: bool,
    /// Chat muted.
    #[serde(rename = "isMuted", default)]
    pub is_muted: bool,
    /// Account age in days at registration.
    #[serde(rename = "accountAge", default)]
    pub account_age_days: i64,
    /// When the profile was created.
    #[serde(rename = "registerOn", with = "epoch_seconds", default = "unix_epoch")]
    pub registered_at: DateTime<Utc>,
    /// Whether the player may start a kick vote.
    #[serde(rename = "canStartKickVote", default = "default_true")]
    pub can_start_kick_vote: bool,
    /// Spam strikes counted by the chat filter.
    #[serde(rename = "spamCount", default)]
    pub spam_count: u32,
    /// When the last spam strike was counted.
    #[serde(rename = "lastSpam", with = "epoch_seconds", default = "unix_epoch")]
    pub last_spam_at: DateTime<Utc>,
    /// Total play time, maintained by the session layer.
    #[serde(rename = "totaltimeplayer", default)]
    pub total_time_played: f64,
    /// Last time the player was seen, maintained by the session layer.
    #[serde(rename = "lastseen", with = "epoch_seconds", default = "unix_epoch")]
    pub last_seen_at: DateTime<Utc>,
    /// Keys this crate does not know about, kept across rewrites.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl Profile {
    /// A freshly registered profile.
    #[must_use]
    pub fn new(
        display_string: impl Into<String>,
        name: impl Into<String>,
        account_age_days: i64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            display_strings: vec![display_string.into()],
            linked_profiles: Vec::new(),
            name: name.into(),
            is_banned: false,
            is_muted: false,
            account_age_days,
            registered_at: now,
            can_start_kick_vote: true,
            spam_count: 0,
            last_spam_at: now,
            total_time_played: 0.0,
            last_seen_at: DateTime::UNIX_EPOCH,
            extra: serde_json::Map::new(),
        }
    }
}

fn unix_epoch() -> DateTime<Utc> {
    DateTime::UNIX_EPOCH
}

fn default_true() -> bool {
    true
}

/// Older documents store a single display string instead of a list.
fn string_or_list<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(list) => list,
    })
}

/// Optional fields merged by [`ProfileStore::update_profile`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileUpdate {
    /// Appended to the display history if new.
    pub display_string: Option<String>,
    /// Each appended to the linked profiles if new.
    pub linked_profiles: Vec<String>,
    /// Replaces the current name.
    pub name: Option<String>,
}

/// Outcome of [`ProfileStore::create_profile`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// A new profile was written and the live session seeded.
    Created,
    /// The account already had a profile; nothing was changed.
    AlreadyRegistered,
}

// ---------------------------------------------------------------------------
// Pending overlay
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flag {
    Ban,
    Mute,
    Unmute,
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ban => "ban",
            Self::Mute => "mute",
            Self::Unmute => "unmute",
        })
    }
}

/// Flag changes not yet confirmed on disk for one account.
#[derive(Debug, Clone, Copy, Default)]
struct PendingFlags {
    seq: u64,
    banned: Option<bool>,
    muted: Option<bool>,
}

impl PendingFlags {
    fn record(&mut self, flag: Flag, seq: u64) {
        self.seq = seq;
        match flag {
            Flag::Ban => self.banned = Some(true),
            Flag::Mute => self.muted = Some(true),
            Flag::Unmute => self.muted = Some(false),
        }
    }

    fn apply(&self, profile: &mut Profile) {
        if let Some(banned) = self.banned {
            profile.is_banned = banned;
        }
        if let Some(muted) = self.muted {
            profile.is_muted = muted;
        }
    }
}

// ---------------------------------------------------------------------------
// ProfileStore
// ---------------------------------------------------------------------------

/// Shared state reachable from background jobs.
struct ProfileDocument {
    documents: Arc<dyn DocumentStore>,
    lock: Mutex<()>,
    pending: Mutex<HashMap<AccountId, PendingFlags>>,
    next_seq: AtomicU64,
}

impl ProfileDocument {
    fn load(&self) -> Result<ProfileTable> {
        let value = self.documents.load(DocumentKind::Profiles)?;
        serde_json::from_value(value).map_err(|e| RosterError::malformed(DocumentKind::Profiles, e))
    }

    /// Reads hold the document lock as well: a background write persists
    /// an overlay entry and clears it under that lock, so the loaded file
    /// and the overlay are always observed together.
    fn load_with_overlay(&self) -> Result<ProfileTable> {
        let _guard = self.lock.lock();
        let mut table = self.load()?;
        let pending = self.pending.lock();
        for (id, flags) in pending.iter() {
            if let Some(profile) = table.get_mut(id) {
                flags.apply(profile);
            }
        }
        Ok(table)
    }

    /// Load → mutate → write under the document lock. The pending overlay is
    /// folded into every write; entries it persisted are cleared afterwards.
    fn modify<T>(&self, mutate: impl FnOnce(&mut ProfileTable) -> (T, bool)) -> Result<T> {
        let _guard = self.lock.lock();
        let mut table = self.load()?;
        self.write_locked(&mut table, mutate)
    }

    /// Caller must hold `self.lock`.
    fn write_locked<T>(
        &self,
        table: &mut ProfileTable,
        mutate: impl FnOnce(&mut ProfileTable) -> (T, bool),
    ) -> Result<T> {
        let (out, changed) = mutate(table);

        let folded: Vec<(AccountId, u64)> = {
            let pending = self.pending.lock();
            pending
                .iter()
                .map(|(id, flags)| {
                    if let Some(profile) = table.get_mut(id) {
                        flags.apply(profile);
                    }
                    (id.clone(), flags.seq)
                })
                .collect()
        };

        if !changed && folded.is_empty() {
            return Ok(out);
        }

        let value = serde_json::to_value(&*table)
            .map_err(|e| RosterError::Serialization(e.to_string()))?;
        self.documents.dump(DocumentKind::Profiles, &value)?;

        if !folded.is_empty() {
            let mut pending = self.pending.lock();
            for (id, seq) in folded {
                if pending.get(&id).is_some_and(|flags| flags.seq == seq) {
                    pending.remove(&id);
                }
            }
        }

        debug!(profiles = table.len(), "Committed profile document");
        Ok(out)
    }
}

/// CRUD over the player-profile document.
pub struct ProfileStore {
    doc: Arc<ProfileDocument>,
    registry: Arc<dyn ClientRegistry>,
    writer: Arc<BackgroundWriter>,
}

impl fmt::Debug for ProfileStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProfileStore")
            .field("pending_writes", &self.pending_writes())
            .finish_non_exhaustive()
    }
}

impl ProfileStore {
    /// Create a store over `documents`.
    #[must_use]
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        registry: Arc<dyn ClientRegistry>,
        writer: Arc<BackgroundWriter>,
    ) -> Self {
        Self {
            doc: Arc::new(ProfileDocument {
                documents,
                lock: Mutex::new(()),
                pending: Mutex::new(HashMap::new()),
                next_seq: AtomicU64::new(0),
            }),
            registry,
            writer,
        }
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Fresh read of one profile, or `None` if the account is unknown.
    ///
    /// # Errors
    /// Returns an error if the profile document cannot be loaded.
    pub fn get_profile(&self, id: &str) -> Result<Option<Profile>> {
        Ok(self.doc.load_with_overlay()?.swap_remove(id))
    }

    /// Fresh read of every profile.
    ///
    /// # Errors
    /// Returns an error if the profile document cannot be loaded.
    pub fn get_all_profiles(&self) -> Result<ProfileTable> {
        self.doc.load_with_overlay()
    }

    /// Number of accounts with a ban/mute change not yet confirmed on disk.
    #[must_use]
    pub fn pending_writes(&self) -> usize {
        self.doc.pending.lock().len()
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Replace the whole profile document with `profiles`.
    ///
    /// Pending ban/mute changes are re-applied on top, since they are newer
    /// than any table a caller could have read.
    ///
    /// # Errors
    /// Returns an error if the document cannot be written.
    pub fn commit_profiles(&self, profiles: &ProfileTable) -> Result<()> {
        let _guard = self.doc.lock.lock();
        let mut table = profiles.clone();
        self.doc.write_locked(&mut table, |_| ((), true))
    }

    /// Register a new account and seed its live session.
    ///
    /// An already-registered account is left untouched. A registry failure
    /// is logged and leaves the session absent; the profile stays written.
    ///
    /// # Errors
    /// Returns an error if the profile document cannot be loaded or written.
    pub fn create_profile(
        &self,
        id: &AccountId,
        display_string: &str,
        name: &str,
        account_age_days: i64,
    ) -> Result<Registration> {
        let now = Utc::now();
        let created = self.doc.modify(|table| {
            if table.contains_key(id) {
                return (None, false);
            }
            let profile = Profile::new(display_string, name, account_age_days, now);
            table.insert(id.clone(), profile.clone());
            (Some(profile), true)
        })?;

        let Some(profile) = created else {
            debug!(account = %id, "Profile already registered");
            return Ok(Registration::AlreadyRegistered);
        };

        info!(account = %id, name, account_age_days, "Registered new profile");
        if let Err(e) = self.registry.register_session(id, SessionRecord::fresh(profile, now)) {
            warn!(account = %id, error = %e, "Client registry rejected new session");
        }
        Ok(Registration::Created)
    }

    /// Append `display_string` to the account's history if it is new.
    /// Returns `false` if the account is unknown.
    ///
    /// # Errors
    /// Returns an error if the profile document cannot be loaded or written.
    pub fn update_display_string(&self, id: &str, display_string: &str) -> Result<bool> {
        self.doc.modify(|table| match table.get_mut(id) {
            Some(profile) => (
                true,
                push_unique(&mut profile.display_strings, display_string.to_string()),
            ),
            None => (false, false),
        })
    }

    /// Merge the given fields into the account's profile.
    /// Returns `false` (and writes nothing) if the account is unknown.
    ///
    /// # Errors
    /// Returns an error if the profile document cannot be loaded or written.
    pub fn update_profile(&self, id: &str, update: ProfileUpdate) -> Result<bool> {
        self.doc.modify(|table| {
            let Some(profile) = table.get_mut(id) else {
                return (false, false);
            };
            let mut changed = false;
            if let Some(display_string) = update.display_string {
                changed |= push_unique(&mut profile.display_strings, display_string);
            }
            for linked in update.linked_profiles {
                changed |= push_unique(&mut profile.linked_profiles, linked);
            }
            if let Some(name) = update.name {
                if profile.name != name {
                    profile.name = name;
                    changed = true;
                }
            }
            (true, changed)
        })
    }

    /// Overwrite the spam counters. Returns `false` if the account is unknown.
    ///
    /// # Errors
    /// Returns an error if the profile document cannot be loaded or written.
    pub fn update_spam(
        &self,
        id: &str,
        spam_count: u32,
        last_spam_at: DateTime<Utc>,
    ) -> Result<bool> {
        self.doc.modify(|table| match table.get_mut(id) {
            Some(profile) => {
                profile.spam_count = spam_count;
                profile.last_spam_at = last_spam_at;
                (true, true)
            }
            None => (false, false),
        })
    }

    /// Ban the account. Visible immediately, persisted in the background.
    /// Returns `false` if the account is unknown.
    ///
    /// # Errors
    /// Returns an error if the profile document cannot be loaded, or if the
    /// write had to run inline and failed.
    pub fn ban_player(&self, id: &str) -> Result<bool> {
        self.set_flag(id, Flag::Ban)
    }

    /// Mute the account. Same durability as [`ProfileStore::ban_player`].
    ///
    /// # Errors
    /// See [`ProfileStore::ban_player`].
    pub fn mute(&self, id: &str) -> Result<bool> {
        self.set_flag(id, Flag::Mute)
    }

    /// Unmute the account. Same durability as [`ProfileStore::ban_player`].
    ///
    /// # Errors
    /// See [`ProfileStore::ban_player`].
    pub fn unmute(&self, id: &str) -> Result<bool> {
        self.set_flag(id, Flag::Unmute)
    }

    fn set_flag(&self, id: &str, flag: Flag) -> Result<bool> {
        let table = self.doc.load()?;
        let Some((account, _)) = table.get_key_value(id) else {
            return Ok(false);
        };
        let account = account.clone();

        {
            let mut pending = self.doc.pending.lock();
            let seq = self.doc.next_seq.fetch_add(1, Ordering::Relaxed) + 1;
            pending.entry(account.clone()).or_default().record(flag, seq);
        }

        let doc = Arc::clone(&self.doc);
        self.writer.submit(PersistJob::new(format!("{flag} {account}"), move || {
            // Writes only if the overlay still holds something to persist.
            doc.modify(|_| ((), false))
        }))?;
        Ok(true)
    }
}
