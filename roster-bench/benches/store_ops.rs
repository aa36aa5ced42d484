//! Roster Benchmark Suite
//!
//! Hot paths hit by every chat message or join:
//!   role_lookup_cached_50_roles ...... role membership from a warm cache
//!   commands_for_account_cached ...... command union across held roles
//!   custom_effect_cached ............. effect lookup from a warm cache
//!   profile_update_spam_500 .......... load/mutate/write of a 500-profile document

use std::sync::Arc;

use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

use roster_core::config::WriterConfig;
use roster_core::{
    AccountId, BackgroundWriter, Cache, CustomStore, InMemoryClientRegistry, MemoryDocumentStore,
    ProfileStore, RoleStore,
};

fn seeded_roles() -> RoleStore {
    let store = RoleStore::new(Arc::new(MemoryDocumentStore::new()), Arc::new(Cache::new()));
    for r in 0..50 {
        let role = format!("role-{r}");
        store.create_role(&role).expect("create");
        store.add_command_to_role(&role, &format!("cmd-{}", r % 7)).expect("command");
        for m in 0..20 {
            store
                .add_member_to_role(&role, &AccountId::new(format!("pb-{}", (r * 3 + m) % 200)))
                .expect("member");
        }
    }
    store
}

/// Benchmark: role membership for one account over 50 cached roles.
fn bench_role_lookup(c: &mut Criterion) {
    let store = seeded_roles();
    c.bench_function("role_lookup_cached_50_roles", |b| {
        b.iter(|| {
            let roles = store.get_roles_for_account(black_box("pb-42")).expect("lookup");
            black_box(roles);
        });
    });
}

/// Benchmark: command union for one account.
fn bench_commands_for_account(c: &mut Criterion) {
    let store = seeded_roles();
    c.bench_function("commands_for_account_cached", |b| {
        b.iter(|| {
            let commands = store.get_commands_for_account(black_box("pb-42")).expect("lookup");
            black_box(commands);
        });
    });
}

/// Benchmark: effect lookup from a warm custom cache.
fn bench_custom_effect(c: &mut Criterion) {
    let store = CustomStore::new(Arc::new(MemoryDocumentStore::new()), Arc::new(Cache::new()));
    for i in 0..500 {
        store
            .set_effect(&AccountId::new(format!("pb-{i}")), "sparkle")
            .expect("effect");
    }
    c.bench_function("custom_effect_cached", |b| {
        b.iter(|| {
            let effect = store.effect_for(black_box("pb-250")).expect("effect");
            black_box(effect);
        });
    });
}

/// Benchmark: one spam update against a 500-profile document.
fn bench_profile_update(c: &mut Criterion) {
    let writer = Arc::new(BackgroundWriter::spawn(&WriterConfig::default()).expect("writer"));
    let store = ProfileStore::new(
        Arc::new(MemoryDocumentStore::new()),
        Arc::new(InMemoryClientRegistry::new()),
        writer,
    );
    for i in 0..500 {
        store
            .create_profile(&AccountId::new(format!("pb-{i}")), "ds", "Player", 30)
            .expect("create");
    }
    let mut count = 0u32;
    c.bench_function("profile_update_spam_500", |b| {
        b.iter(|| {
            count = count.wrapping_add(1);
            let updated = store
                .update_spam(black_box("pb-250"), count, Utc::now())
                .expect("spam");
            black_box(updated);
        });
    });
}

criterion_group!(
    benches,
    bench_role_lookup,
    bench_commands_for_account,
    bench_custom_effect,
    bench_profile_update,
);
criterion_main!(benches);
