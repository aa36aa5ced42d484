//! # roster-core
//!
//! Embedded player-data store for a game server. Per-player records live in
//! four JSON documents under the server's user-data directory:
//!
//! - **Profiles**: display-name history, linked profiles, ban/mute flags,
//!   spam counters (`profiles.json`)
//! - **Roles**: named permission groups with a tag, tag colour, command
//!   allow-list and member list (`roles.json`)
//! - **Custom**: per-account cosmetic effect and tag (`custom.json`)
//! - **Whitelist**: account identifiers allowed to join (`whitelist.json`)
//!
//! Profiles are always read fresh from disk. Roles, custom data and the
//! whitelist are served from an explicit [`Cache`] that is filled on the first
//! read and rewritten by every mutation routed through this crate.
//!
//! ## Consistency Contract
//!
//! - Every document has one lock held across load → mutate → write, so
//!   concurrent callers never lose each other's updates.
//! - Ban / mute / unmute are visible immediately but persisted by the
//!   [`BackgroundWriter`] (eventually durable, at-least-once).
//! - All other mutations are durable when they return.
//!
//! ```no_run
//! use std::sync::Arc;
//! use roster_core::{InMemoryClientRegistry, PlayerStore, RosterConfig};
//!
//! let registry = Arc::new(InMemoryClientRegistry::new());
//! let store = PlayerStore::open("/srv/game/user", &RosterConfig::default(), registry)?;
//! store.roles().create_role("mods")?;
//! let status = store.roles().add_command_to_role("mods", "kick")?;
//! println!("{status}");
//! # Ok::<(), roster_core::RosterError>(())
//! ```

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cache;
pub mod config;
pub mod custom;
pub mod document;
pub mod error;
pub mod logging;
pub mod profile;
pub mod registry;
pub mod role;
pub mod store;
pub mod types;
pub mod whitelist;
pub mod writer;

pub use cache::Cache;
pub use config::RosterConfig;
pub use custom::{CustomData, CustomStore};
pub use document::{DocumentStore, JsonFileStore, MemoryDocumentStore};
pub use error::{Result, RosterError};
pub use profile::{Profile, ProfileStore, ProfileTable, ProfileUpdate, Registration};
pub use registry::{ClientRegistry, InMemoryClientRegistry, SessionRecord};
pub use role::{Role, RoleStatus, RoleStore, RoleTable, TOP_LIST_ROLE};
pub use store::PlayerStore;
pub use types::{AccountId, DocumentKind, TagColor};
pub use whitelist::WhitelistLoader;
pub use writer::{BackgroundWriter, WriterStats};
