//! Property-Based Tests for the Player Data Stores
//!
//! Uses `proptest` to check the role and custom stores under random
//! operation sequences: membership stays duplicate-free, account lookups
//! are exact, and the top list is a pure replacement. Profiles are checked
//! for create-then-read over arbitrary identifiers.

use std::collections::HashSet;
use std::sync::Arc;

use proptest::prelude::*;
use serde_json::json;

use roster_core::config::WriterConfig;
use roster_core::{
    AccountId, BackgroundWriter, Cache, CustomStore, DocumentKind, InMemoryClientRegistry,
    MemoryDocumentStore, ProfileStore, Registration, RoleStore, TOP_LIST_ROLE,
};

// ---------------------------------------------------------------------------
// Strategy helpers
// ---------------------------------------------------------------------------

fn arb_account() -> impl Strategy<Value = AccountId> {
    "pb-[a-e]{1,2}".prop_map(AccountId::new)
}

fn arb_role() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["owner", "admin", "mods", "vip"]).prop_map(str::to_string)
}

fn arb_command() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["kick", "ban", "mute", "end", "say"]).prop_map(str::to_string)
}

fn role_store() -> (Arc<MemoryDocumentStore>, RoleStore) {
    let documents = Arc::new(MemoryDocumentStore::new());
    let store = RoleStore::new(documents.clone(), Arc::new(Cache::new()));
    (documents, store)
}

// ---------------------------------------------------------------------------
// Property: member lists never hold duplicates
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn members_stay_unique(adds in prop::collection::vec((arb_role(), arb_account()), 0..40)) {
        let (_, store) = role_store();
        for (role, id) in &adds {
            store.create_role(role).expect("create");
            store.add_member_to_role(role, id).expect("add");
        }

        let roles = store.get_roles().expect("roles");
        for role in roles.values() {
            let unique: HashSet<_> = role.member_ids.iter().collect();
            prop_assert_eq!(unique.len(), role.member_ids.len());
        }
    }
}

// ---------------------------------------------------------------------------
// Property: get_roles_for_account returns exactly the roles holding the id
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn roles_for_account_are_exact(
        adds in prop::collection::vec((arb_role(), arb_account()), 0..30),
        removes in prop::collection::vec((arb_role(), arb_account()), 0..15),
        lookup in arb_account(),
    ) {
        let (_, store) = role_store();
        let mut expected: HashSet<(String, AccountId)> = HashSet::new();
        for (role, id) in &adds {
            store.create_role(role).expect("create");
            store.add_member_to_role(role, id).expect("add");
            expected.insert((role.clone(), id.clone()));
        }
        for (role, id) in &removes {
            store.remove_member_from_role(role, id.as_str()).expect("remove");
            expected.remove(&(role.clone(), id.clone()));
        }

        let held: HashSet<String> = store
            .get_roles_for_account(lookup.as_str())
            .expect("lookup")
            .into_iter()
            .collect();
        let want: HashSet<String> = expected
            .iter()
            .filter(|(_, id)| *id == lookup)
            .map(|(role, _)| role.clone())
            .collect();
        prop_assert_eq!(held, want);
    }
}

// ---------------------------------------------------------------------------
// Property: the top list is a replacement, and replaying it writes nothing
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn top_list_is_idempotent(ranked in prop::collection::vec(arb_account(), 0..5)) {
        let (documents, store) = role_store();
        store.update_top_list(&ranked).expect("first");
        let writes = documents.write_count(DocumentKind::Roles);
        store.update_top_list(&ranked).expect("second");

        prop_assert_eq!(documents.write_count(DocumentKind::Roles), writes);
        let roles = store.get_roles().expect("roles");
        prop_assert_eq!(&roles[TOP_LIST_ROLE].member_ids, &ranked);
    }
}

// ---------------------------------------------------------------------------
// Property: adding then removing a command restores the command list
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn command_add_remove_restores(
        initial in prop::collection::vec(arb_command(), 0..4),
        command in arb_command(),
    ) {
        let (_, store) = role_store();
        store.create_role("mods").expect("create");
        for c in &initial {
            store.add_command_to_role("mods", c).expect("seed");
        }
        let before = store.get_roles().expect("roles")["mods"].commands.clone();
        prop_assume!(!before.contains(&command));

        prop_assert!(store.add_command_to_role("mods", &command).expect("add").is_applied());
        let removed = store.remove_command_from_role("mods", &command).expect("remove");
        prop_assert!(removed.is_applied());
        prop_assert_eq!(&store.get_roles().expect("roles")["mods"].commands, &before);
    }
}

// ---------------------------------------------------------------------------
// Property: the cached custom data always matches the document
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn custom_cache_matches_document(
        ops in prop::collection::vec((arb_account(), prop::option::of("[a-z]{3,6}")), 0..25),
    ) {
        let documents = Arc::new(MemoryDocumentStore::new());
        let store = CustomStore::new(documents.clone(), Arc::new(Cache::new()));
        for (id, effect) in &ops {
            match effect {
                Some(effect) => store.set_effect(id, effect).expect("set"),
                None => {
                    store.remove_effect(id.as_str()).expect("remove");
                }
            }
        }

        let cached = store.get_custom().expect("custom");
        let on_disk = documents.get(DocumentKind::Custom);
        let effects = on_disk.get("customeffects").cloned().unwrap_or_else(|| json!({}));
        prop_assert_eq!(json!(cached.effects_by_account), effects);
    }
}

// ---------------------------------------------------------------------------
// Property: a created profile reads back with registration defaults
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn created_profile_reads_back_with_defaults(
        id in "[A-Za-z0-9+/=_-]{1,24}",
        display in "\\PC{1,16}",
        name in "\\PC{0,16}",
        age in 0i64..5000,
    ) {
        let registry = Arc::new(InMemoryClientRegistry::new());
        let writer = Arc::new(BackgroundWriter::spawn(&WriterConfig::default()).expect("writer"));
        let documents = Arc::new(MemoryDocumentStore::new());
        let store = ProfileStore::new(documents, registry.clone(), writer);
        let account = AccountId::new(id.clone());

        prop_assert_eq!(
            store.create_profile(&account, &display, &name, age).expect("create"),
            Registration::Created
        );
        let profile = store.get_profile(&id).expect("load").expect("present");
        prop_assert_eq!(&profile.display_strings, &vec![display.clone()]);
        prop_assert_eq!(&profile.name, &name);
        prop_assert_eq!(profile.account_age_days, age);
        prop_assert!(!profile.is_banned);
        prop_assert!(!profile.is_muted);
        prop_assert!(profile.can_start_kick_vote);
        prop_assert_eq!(profile.spam_count, 0);
        prop_assert!(registry.get(&id).is_some());

        prop_assert_eq!(
            store.create_profile(&account, "other", "Other", age + 1).expect("again"),
            Registration::AlreadyRegistered
        );
        prop_assert_eq!(store.get_profile(&id).expect("load").expect("present").name, name);
    }
}
