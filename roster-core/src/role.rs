//! Roles (`roles.json`): named permission groups.
//!
//! The role table is read through the [`Cache`]: the first read loads the
//! document, every later read is served from memory until the process
//! restarts. Mutations hold the role document lock across load → mutate →
//! write and swap the cached table only after the write succeeded.
//!
//! Role writes go through [`DocumentStore::format`].

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cache::Cache;
use crate::document::DocumentStore;
use crate::error::{Result, RosterError};
use crate::types::{AccountId, DocumentKind, TagColor, push_unique, remove_item};

/// Reserved role holding the current leaderboard, maintained by
/// [`RoleStore::update_top_list`].
pub const TOP_LIST_ROLE: &str = "top5";

/// Every role, keyed by name, in document (insertion) order.
pub type RoleTable = IndexMap<String, Role>;

/// A named permission group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Role {
    /// Label shown next to members' names.
    #[serde(default)]
    pub tag: String,
    /// Colour of the tag.
    #[serde(rename = "tagcolor", default)]
    pub tag_color: TagColor,
    /// Commands members may run.
    #[serde(default)]
    pub commands: Vec<String>,
    /// Accounts holding the role.
    #[serde(rename = "ids", default)]
    pub member_ids: Vec<AccountId>,
    /// Keys this crate does not know about, kept across rewrites.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl Role {
    /// A new role: tagged with its own name, white, no commands, no members.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            tag: name.to_string(),
            tag_color: TagColor::WHITE,
            commands: Vec::new(),
            member_ids: Vec::new(),
            extra: serde_json::Map::new(),
        }
    }

    /// Whether `id` holds this role.
    #[must_use]
    pub fn has_member(&self, id: &str) -> bool {
        self.member_ids.iter().any(|member| member.as_str() == id)
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Outcome of a role mutation.
///
/// `Display` renders the status line shown to whoever issued the command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleStatus {
    /// The command was added to the role.
    CommandAdded(String),
    /// The role already allowed the command.
    CommandAlreadyPresent(String),
    /// The command was removed from the role.
    CommandRemoved(String),
    /// The role did not allow the command.
    CommandNotPresent(String),
    /// The account was added to the role.
    MemberAdded(String),
    /// The account already held the role.
    MemberAlreadyPresent(String),
    /// The account was removed from the role.
    MemberRemoved(String),
    /// The account did not hold the role.
    MemberNotPresent(String),
    /// The role's tag was replaced.
    TagChanged(String),
    /// The role's tag colour was replaced.
    TagColorChanged(String),
    /// No role with this name exists.
    RoleNotFound(String),
}

impl RoleStatus {
    /// Name of the role the status refers to.
    #[must_use]
    pub fn role(&self) -> &str {
        match self {
            Self::CommandAdded(role)
            | Self::CommandAlreadyPresent(role)
            | Self::CommandRemoved(role)
            | Self::CommandNotPresent(role)
            | Self::MemberAdded(role)
            | Self::MemberAlreadyPresent(role)
            | Self::MemberRemoved(role)
            | Self::MemberNotPresent(role)
            | Self::TagChanged(role)
            | Self::TagColorChanged(role)
            | Self::RoleNotFound(role) => role,
        }
    }

    /// Whether the mutation changed the role.
    #[must_use]
    pub fn is_applied(&self) -> bool {
        matches!(
            self,
            Self::CommandAdded(_)
                | Self::CommandRemoved(_)
                | Self::MemberAdded(_)
                | Self::MemberRemoved(_)
                | Self::TagChanged(_)
                | Self::TagColorChanged(_)
        )
    }
}

impl fmt::Display for RoleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CommandAdded(role) => write!(f, "command added to {role}"),
            Self::CommandAlreadyPresent(role) => write!(f, "command already exists in {role}"),
            Self::CommandRemoved(role) => write!(f, "command removed from {role}"),
            Self::CommandNotPresent(_) => f.write_str("command not exists"),
            Self::MemberAdded(role) => write!(f, "added to {role}"),
            Self::MemberAlreadyPresent(role) => write!(f, "already in {role}"),
            Self::MemberRemoved(role) => write!(f, "removed from {role}"),
            Self::MemberNotPresent(role) => write!(f, "not a member of {role}"),
            Self::TagChanged(_) => f.write_str("tag changed"),
            Self::TagColorChanged(_) => f.write_str("tag color changed"),
            Self::RoleNotFound(_) => f.write_str("role not exists"),
        }
    }
}

// ---------------------------------------------------------------------------
// RoleStore
// ---------------------------------------------------------------------------

/// CRUD over the role document, read through the cache.
pub struct RoleStore {
    documents: Arc<dyn DocumentStore>,
    cache: Arc<Cache>,
    lock: Mutex<()>,
}

impl fmt::Debug for RoleStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoleStore").finish_non_exhaustive()
    }
}

impl RoleStore {
    /// Create a store over `documents`, caching into `cache`.
    #[must_use]
    pub fn new(documents: Arc<dyn DocumentStore>, cache: Arc<Cache>) -> Self {
        Self {
            documents,
            cache,
            lock: Mutex::new(()),
        }
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// The role table, from the cache or (first time) from the document.
    ///
    /// # Errors
    /// Returns an error if the document has to be loaded and cannot be.
    pub fn get_roles(&self) -> Result<Arc<RoleTable>> {
        if let Some(roles) = self.cache.roles() {
            return Ok(roles);
        }
        let _guard = self.lock.lock();
        self.current_locked()
    }

    /// Names of every role `id` holds, in role-table order.
    ///
    /// # Errors
    /// See [`RoleStore::get_roles`].
    pub fn get_roles_for_account(&self, id: &str) -> Result<Vec<String>> {
        let roles = self.get_roles()?;
        Ok(roles
            .iter()
            .filter(|(_, role)| role.has_member(id))
            .map(|(name, _)| name.clone())
            .collect())
    }

    /// Every command `id` may run through any of its roles, first-seen
    /// order, without duplicates.
    ///
    /// # Errors
    /// See [`RoleStore::get_roles`].
    pub fn get_commands_for_account(&self, id: &str) -> Result<Vec<String>> {
        let roles = self.get_roles()?;
        let mut commands = Vec::new();
        for role in roles.values().filter(|role| role.has_member(id)) {
            for command in &role.commands {
                push_unique(&mut commands, command.clone());
            }
        }
        Ok(commands)
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Create `name` with default tag and colour. Returns `false` if it
    /// already existed.
    ///
    /// # Errors
    /// Returns an error if the role document cannot be loaded or written.
    pub fn create_role(&self, name: &str) -> Result<bool> {
        let created = self.modify(|roles| {
            if roles.contains_key(name) {
                return (false, false);
            }
            roles.insert(name.to_string(), Role::new(name));
            (true, true)
        })?;
        if created {
            info!(role = name, "Created role");
        }
        Ok(created)
    }

    /// Give `id` the role.
    ///
    /// # Errors
    /// Returns an error if the role document cannot be loaded or written.
    pub fn add_member_to_role(&self, role: &str, id: &AccountId) -> Result<RoleStatus> {
        self.update_role(role, |entry| {
            if push_unique(&mut entry.member_ids, id.clone()) {
                RoleStatus::MemberAdded(role.to_string())
            } else {
                RoleStatus::MemberAlreadyPresent(role.to_string())
            }
        })
    }

    /// Take the role from `id`.
    ///
    /// # Errors
    /// Returns an error if the role document cannot be loaded or written.
    pub fn remove_member_from_role(&self, role: &str, id: &str) -> Result<RoleStatus> {
        self.update_role(role, |entry| {
            if remove_item(&mut entry.member_ids, id) {
                RoleStatus::MemberRemoved(role.to_string())
            } else {
                RoleStatus::MemberNotPresent(role.to_string())
            }
        })
    }

    /// Allow the role to run `command`.
    ///
    /// # Errors
    /// Returns an error if the role document cannot be loaded or written.
    pub fn add_command_to_role(&self, role: &str, command: &str) -> Result<RoleStatus> {
        self.update_role(role, |entry| {
            if push_unique(&mut entry.commands, command.to_string()) {
                RoleStatus::CommandAdded(role.to_string())
            } else {
                RoleStatus::CommandAlreadyPresent(role.to_string())
            }
        })
    }

    /// Stop allowing the role to run `command`.
    ///
    /// # Errors
    /// Returns an error if the role document cannot be loaded or written.
    pub fn remove_command_from_role(&self, role: &str, command: &str) -> Result<RoleStatus> {
        self.update_role(role, |entry| {
            if remove_item(&mut entry.commands, command) {
                RoleStatus::CommandRemoved(role.to_string())
            } else {
                RoleStatus::CommandNotPresent(role.to_string())
            }
        })
    }

    /// Replace the role's tag.
    ///
    /// # Errors
    /// Returns an error if the role document cannot be loaded or written.
    pub fn set_role_tag(&self, role: &str, tag: &str) -> Result<RoleStatus> {
        self.update_role(role, |entry| {
            tag.clone_into(&mut entry.tag);
            RoleStatus::TagChanged(role.to_string())
        })
    }

    /// Replace the role's tag colour.
    ///
    /// # Errors
    /// Returns an error if the role document cannot be loaded or written.
    pub fn set_role_tag_color(&self, role: &str, color: TagColor) -> Result<RoleStatus> {
        self.update_role(role, |entry| {
            entry.tag_color = color;
            RoleStatus::TagColorChanged(role.to_string())
        })
    }

    /// Replace the members of the reserved [`TOP_LIST_ROLE`] with
    /// `ranked_ids`, creating the role first if needed. Order is kept as
    /// given.
    ///
    /// # Errors
    /// Returns an error if the role document cannot be loaded or written.
    pub fn update_top_list(&self, ranked_ids: &[AccountId]) -> Result<()> {
        self.modify(|roles| {
            let created = !roles.contains_key(TOP_LIST_ROLE);
            let top = roles
                .entry(TOP_LIST_ROLE.to_string())
                .or_insert_with(|| Role::new(TOP_LIST_ROLE));
            let replaced = top.member_ids != ranked_ids;
            if replaced {
                top.member_ids = ranked_ids.to_vec();
            }
            ((), created || replaced)
        })?;
        debug!(members = ranked_ids.len(), "Updated top list");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Apply `mutate` to an existing role. Reports a missing role without
    /// writing anything.
    fn update_role(
        &self,
        role: &str,
        mutate: impl FnOnce(&mut Role) -> RoleStatus,
    ) -> Result<RoleStatus> {
        let status = self.modify(|roles| match roles.get_mut(role) {
            Some(entry) => {
                let status = mutate(entry);
                let applied = status.is_applied();
                (status, applied)
            }
            None => (RoleStatus::RoleNotFound(role.to_string()), false),
        })?;
        if matches!(status, RoleStatus::RoleNotFound(_)) {
            warn!(role, "No such role");
        }
        Ok(status)
    }

    /// Caller must hold `self.lock`. Returns the cached table, loading and
    /// caching it if the slot is empty.
    fn current_locked(&self) -> Result<Arc<RoleTable>> {
        if let Some(roles) = self.cache.roles() {
            return Ok(roles);
        }
        let value = self.documents.load(DocumentKind::Roles)?;
        let roles: RoleTable = serde_json::from_value(value)
            .map_err(|e| RosterError::malformed(DocumentKind::Roles, e))?;
        let roles = Arc::new(roles);
        self.cache.set_roles(Arc::clone(&roles));
        debug!(roles = roles.len(), "Cached role table");
        Ok(roles)
    }

    fn modify<T>(&self, mutate: impl FnOnce(&mut RoleTable) -> (T, bool)) -> Result<T> {
        let _guard = self.lock.lock();
        let mut roles = RoleTable::clone(&*self.current_locked()?);
        let (out, changed) = mutate(&mut roles);
        if changed {
            let value = serde_json::to_value(&roles)
                .map_err(|e| RosterError::Serialization(e.to_string()))?;
            self.documents.format(DocumentKind::Roles, &value)?;
            self.cache.set_roles(Arc::new(roles));
        }
        Ok(out)
    }
}
