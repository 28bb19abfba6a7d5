use serde_json::json;
use spacekeep::core::config::{EntitlementsConfig, SpaceConfig};
use spacekeep::core::error::SpaceError;
use spacekeep::core::model::SpaceKind;
use spacekeep::core::schemas;
use spacekeep::core::time::ManualClock;
use spacekeep::plugins::entitlements::{
    CODE_SPACES_MAX_REACHED, EntitlementGate, EntitlementsSnapshot, EntitlementsSource, Plan,
    load_entitlements, save_entitlements,
};
use spacekeep::plugins::space_store::SpaceStore;
use spacekeep::plugins::spaces::{CreateOptions, SpaceRegistry};
use std::sync::Arc;

const START: u64 = 1_700_000_000_000;

fn store(clock: &ManualClock) -> SpaceStore {
    SpaceStore::in_memory(Arc::new(clock.clone())).unwrap()
}

#[test]
fn config_is_used_until_a_snapshot_is_persisted() {
    let clock = ManualClock::new(START);
    let mut store = store(&clock);
    let config = EntitlementsConfig {
        plan: "studio".to_string(),
        spaces_max: 3,
        share_links_max: 0,
        share_enabled: false,
    };

    let from_config = load_entitlements(&store, &config).unwrap();
    assert_eq!(from_config.source, EntitlementsSource::Local);
    assert_eq!(from_config.plan, Plan::Studio);
    assert_eq!(from_config.limits.spaces_max, 3);
    assert!(!from_config.features.share_enabled);
    assert_eq!(from_config.updated_at, START);

    let mut persisted = EntitlementsSnapshot::default();
    persisted.source = EntitlementsSource::Remote;
    persisted.plan = Plan::BetaTester;
    persisted.limits.spaces_max = 50;
    persisted.updated_at = 42;
    save_entitlements(&mut store, &persisted).unwrap();

    clock.advance(10);
    let loaded = load_entitlements(&store, &config).unwrap();
    assert_eq!(loaded, persisted);
}

#[test]
fn unreadable_persisted_snapshot_falls_back_to_config() {
    let clock = ManualClock::new(START);
    let mut store = store(&clock);
    store
        .write_record(schemas::SLOT_ENTITLEMENTS, &json!(["not", "an", "object"]))
        .unwrap();
    let loaded = load_entitlements(&store, &EntitlementsConfig::default()).unwrap();
    assert_eq!(loaded, EntitlementsSnapshot::from_config(&EntitlementsConfig::default(), START));
}

#[test]
fn loosely_shaped_payload_is_normalized() {
    let clock = ManualClock::new(START);
    let mut store = store(&clock);
    store
        .write_record(
            schemas::SLOT_ENTITLEMENTS,
            &json!({
                "state": {
                    "plan": "beta_tester",
                    "spaces": { "max": 2.0 },
                    "share": { "readonly_links": { "max": 5 } },
                    "features": { "importEnabled": false }
                }
            }),
        )
        .unwrap();

    let loaded = load_entitlements(&store, &EntitlementsConfig::default()).unwrap();
    assert_eq!(loaded.plan, Plan::BetaTester);
    assert_eq!(loaded.limits.spaces_max, 2);
    assert_eq!(loaded.limits.share_readonly_links_max, 5);
    assert!(!loaded.features.import_enabled);
    assert!(loaded.features.share_enabled);
    assert_eq!(loaded.source, EntitlementsSource::Remote);
}

#[test]
fn space_quota_counts_live_user_spaces_only() {
    let clock = ManualClock::new(START);
    let mut registry = SpaceRegistry::open(store(&clock), &SpaceConfig::default()).unwrap();
    registry.ensure_onboarding_spaces().unwrap();

    let mut gate = EntitlementsSnapshot::default();
    gate.limits.spaces_max = 2;

    let first = registry
        .create_space_gated(&gate, "One", None, CreateOptions::default())
        .unwrap();
    registry
        .create_space_gated(&gate, "Two", None, CreateOptions::default())
        .unwrap();
    assert_eq!(registry.user_space_count(), 2);

    let err = registry
        .create_space_gated(&gate, "Three", None, CreateOptions::default())
        .unwrap_err();
    assert_eq!(err.entitlement_code(), Some(CODE_SPACES_MAX_REACHED));
    match err {
        SpaceError::QuotaExceeded { limit, used, .. } => {
            assert_eq!(limit, Some(2));
            assert_eq!(used, Some(2));
        }
        other => panic!("unexpected error: {other}"),
    }

    // Re-creating an existing id is not a new Space.
    let again = registry
        .create_space_gated(
            &gate,
            "One",
            None,
            CreateOptions {
                id: Some(first.clone()),
                kind: SpaceKind::User,
            },
        )
        .unwrap();
    assert_eq!(again, first);

    // Trashed Spaces free their slot.
    registry.soft_delete(&first).unwrap();
    registry
        .create_space_gated(&gate, "Three", None, CreateOptions::default())
        .unwrap();
    assert_eq!(registry.user_space_count(), 2);
}

#[test]
fn zero_limit_means_unlimited() {
    let mut snapshot = EntitlementsSnapshot::default();
    snapshot.limits.spaces_max = 0;
    assert!(snapshot.ensure_can_create_space(u64::MAX).is_ok());
    assert!(snapshot.ensure_can_create_share_link(7).is_ok());
    assert!(snapshot.ensure_can_create_share_link(8).is_err());
}

#[test]
fn plan_names_are_forgiving() {
    assert_eq!(Plan::parse(" Pro "), Plan::Pro);
    assert_eq!(Plan::parse("BETA_TESTER"), Plan::BetaTester);
    assert_eq!(Plan::parse("enterprise"), Plan::Free);
}
