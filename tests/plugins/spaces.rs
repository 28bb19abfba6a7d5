use serde_json::json;
use spacekeep::core::config::SpaceConfig;
use spacekeep::core::db::LocalSlots;
use spacekeep::core::events::{RecordingSink, SpaceEvent};
use spacekeep::core::model::{Edge, Node, NodeType, SpaceData, SpaceKind, core_id_for};
use spacekeep::core::remote::MemoryMirror;
use spacekeep::core::schemas;
use spacekeep::core::store::Store;
use spacekeep::core::time::{DAY_MS, ManualClock};
use spacekeep::plugins::playground::{LEGACY_SANDBOX_ID, PLAYGROUND_NAME, PLAYGROUND_SPACE_ID};
use spacekeep::plugins::space_store::SpaceStore;
use spacekeep::plugins::spaces::{CreateOptions, SpaceRegistry};
use std::sync::Arc;
use tempfile::tempdir;

const START: u64 = 1_700_000_000_000;

fn registry(clock: &ManualClock) -> SpaceRegistry {
    let store = SpaceStore::in_memory(Arc::new(clock.clone())).unwrap();
    SpaceRegistry::open(store, &SpaceConfig::default()).unwrap()
}

fn mirrored_registry(clock: &ManualClock, mirror: &MemoryMirror) -> SpaceRegistry {
    let store = SpaceStore::in_memory(Arc::new(clock.clone()))
        .unwrap()
        .with_remote(Box::new(mirror.clone()));
    SpaceRegistry::open(store, &SpaceConfig::default()).unwrap()
}

fn disk_registry(root: &std::path::Path, clock: &ManualClock, mirror: Option<&MemoryMirror>) -> SpaceRegistry {
    let store = Store::persistent(root.join(schemas::STORE_DIR_NAME));
    let mut space_store = SpaceStore::new(LocalSlots::open(&store).unwrap(), Arc::new(clock.clone()));
    if let Some(mirror) = mirror {
        space_store = space_store.with_remote(Box::new(mirror.clone()));
    }
    SpaceRegistry::open(space_store, &SpaceConfig::default()).unwrap()
}

fn create(registry: &mut SpaceRegistry, name: &str) -> String {
    registry.create(name, None, CreateOptions::default()).unwrap()
}

fn stored_graph(registry: &SpaceRegistry, id: &str) -> SpaceData {
    let raw = registry
        .store()
        .local()
        .get(&schemas::space_slot(id))
        .unwrap()
        .unwrap();
    serde_json::from_str(&raw).unwrap()
}

#[test]
fn graph_round_trips_through_disk() {
    let tmp = tempdir().unwrap();
    let clock = ManualClock::new(START);
    let id = {
        let mut registry = disk_registry(tmp.path(), &clock, None);
        let id = create(&mut registry, "Research");
        registry.load(&id).unwrap().unwrap();
        registry.update_live(|data| {
            data.nodes.push(Node::new("c1", NodeType::Cluster, 10.0, 20.0).with_label("Topic"));
            data.nodes.push(Node::new("n1", NodeType::Node, 30.0, 40.0).with_parent("c1"));
            data.edges.push(Edge::new("e1", "c1", "n1"));
        });
        registry.flush_all().unwrap();
        id
    };

    let mut reopened = disk_registry(tmp.path(), &clock, None);
    assert_eq!(reopened.active_id(), Some(id.as_str()));
    assert_eq!(reopened.get_meta(&id).unwrap().name, "Research");

    let data = reopened.snapshot(&id).unwrap().unwrap();
    assert_eq!(data.nodes.len(), 2);
    assert_eq!(data.node("n1").unwrap().parent_cluster_id(), Some("c1"));
    assert_eq!(data.node("c1").unwrap().data.label.as_deref(), Some("Topic"));
    assert_eq!(data.edges, vec![Edge::new("e1", "c1", "n1")]);

    // Opening it gives the graph its core node.
    let loaded = reopened.load(&id).unwrap().unwrap();
    assert_eq!(loaded.nodes.len(), 3);
    assert_eq!(loaded.nodes[0].id, core_id_for(&id));
    assert!(loaded.nodes[0].is_core());
}

#[test]
fn create_with_existing_id_is_idempotent() {
    let clock = ManualClock::new(START);
    let mut registry = registry(&clock);
    let options = CreateOptions {
        id: Some("fixed".to_string()),
        kind: SpaceKind::User,
    };
    assert_eq!(registry.create("First", None, options.clone()).unwrap(), "fixed");
    assert_eq!(registry.create("Second", None, options).unwrap(), "fixed");
    assert_eq!(registry.list().len(), 1);
    assert_eq!(registry.get_meta("fixed").unwrap().name, "First");
    assert_eq!(
        registry.get_meta("fixed").unwrap().core_node_id.as_deref(),
        Some("core-fixed")
    );
}

#[test]
fn fork_copies_and_stays_isolated() {
    let clock = ManualClock::new(START);
    let mut registry = registry(&clock);
    let source_id = create(&mut registry, "Atlas");

    let mut data = SpaceData::empty(&source_id);
    data.nodes.push(Node::new(core_id_for(&source_id), NodeType::Core, 0.0, 0.0));
    data.nodes.push(Node::new("n1", NodeType::Node, 5.0, 5.0));
    data.edges.push(Edge::new("e1", core_id_for(&source_id), "n1"));
    registry.store_mut().write(&source_id, &data).unwrap();

    let source = registry.snapshot(&source_id).unwrap().unwrap();
    let fork_id = registry.fork(&source, "Atlas").unwrap();
    assert_ne!(fork_id, source_id);

    let meta = registry.get_meta(&fork_id).unwrap();
    assert_eq!(meta.name, "Atlas 1");
    assert_eq!(meta.parent_space_id.as_deref(), Some(source_id.as_str()));

    let fork = registry.snapshot(&fork_id).unwrap().unwrap();
    assert_eq!(fork.space_id.as_deref(), Some(fork_id.as_str()));
    assert_eq!(fork.nodes[0].id, core_id_for(&fork_id));
    assert_eq!(fork.edges[0].source, core_id_for(&fork_id));
    assert_eq!(fork.node("n1").unwrap().meta.space_id.as_deref(), Some(fork_id.as_str()));

    let mut edited = source.clone();
    edited.nodes.push(Node::new("n2", NodeType::Node, 0.0, 0.0));
    registry.store_mut().write(&source_id, &edited).unwrap();

    assert_eq!(registry.snapshot(&fork_id).unwrap().unwrap().nodes.len(), 2);
    assert_eq!(registry.snapshot(&source_id).unwrap().unwrap().nodes.len(), 3);
}

#[test]
fn fork_of_the_playground_keeps_its_graph_when_opened() {
    let clock = ManualClock::new(START);
    let mut registry = registry(&clock);
    registry.ensure_onboarding_spaces().unwrap();
    let source = registry.load(PLAYGROUND_SPACE_ID).unwrap().unwrap();

    let fork_id = registry.fork(&source, "My copy").unwrap();
    assert_eq!(registry.get_meta(&fork_id).unwrap().kind, SpaceKind::User);

    let loaded = registry.load(&fork_id).unwrap().unwrap();
    assert_eq!(loaded.nodes.len(), source.nodes.len());
    assert_eq!(loaded.edges.len(), source.edges.len());
    assert!(loaded.nodes.iter().all(|node| !node.id.starts_with(PLAYGROUND_SPACE_ID)));
    for edge in &loaded.edges {
        assert!(loaded.node(&edge.source).is_some(), "dangling source {}", edge.source);
        assert!(loaded.node(&edge.target).is_some(), "dangling target {}", edge.target);
    }
    assert_eq!(stored_graph(&registry, &fork_id), loaded);

    // The playground itself keeps its tutorial ids.
    let playground = registry.snapshot(PLAYGROUND_SPACE_ID).unwrap().unwrap();
    assert!(playground.node("playground-welcome").is_some());
}

#[test]
fn load_migrates_legacy_core_once() {
    let clock = ManualClock::new(START);
    let mut registry = registry(&clock);
    let id = registry
        .create(
            "Legacy",
            None,
            CreateOptions {
                id: Some("legacy".to_string()),
                kind: SpaceKind::User,
            },
        )
        .unwrap();

    let mut data = SpaceData::empty(&id);
    data.nodes.push(Node::new("archecore", NodeType::Core, 0.0, 0.0));
    data.nodes.push(Node::new("n1", NodeType::Node, 1.0, 1.0));
    data.edges.push(Edge::new("e1", "archecore", "n1"));
    registry.store_mut().write(&id, &data).unwrap();

    let first = registry.load(&id).unwrap().unwrap();
    assert_eq!(first.nodes[0].id, "core-legacy");
    assert_eq!(first.edges[0].source, "core-legacy");
    assert_eq!(stored_graph(&registry, &id), first);

    clock.advance(1_000);
    let second = registry.load(&id).unwrap().unwrap();
    assert_eq!(second, first);
    assert_eq!(second.nodes.iter().filter(|n| n.is_core()).count(), 1);
}

#[test]
fn load_resets_foreign_and_seeded_payloads() {
    let clock = ManualClock::new(START);
    let mut registry = registry(&clock);
    let foreign = create(&mut registry, "Foreign");
    let seeded = create(&mut registry, "Seeded");

    let mut stray = SpaceData::empty("somewhere-else");
    stray.nodes.push(Node::new("n1", NodeType::Node, 0.0, 0.0));
    registry.store_mut().write(&foreign, &stray).unwrap();

    let mut tutorial = SpaceData::empty(&seeded);
    tutorial.nodes.push(Node::new("playground-welcome", NodeType::Node, 0.0, 0.0));
    registry.store_mut().write(&seeded, &tutorial).unwrap();

    let loaded = registry.load(&foreign).unwrap().unwrap();
    assert!(loaded.nodes.is_empty());
    assert_eq!(loaded.space_id.as_deref(), Some(foreign.as_str()));
    assert!(stored_graph(&registry, &foreign).nodes.is_empty());

    let loaded = registry.load(&seeded).unwrap().unwrap();
    assert!(loaded.nodes.is_empty());
}

#[test]
fn corrupt_graph_is_reset_on_read() {
    let tmp = tempdir().unwrap();
    let clock = ManualClock::new(START);
    let mut registry = disk_registry(tmp.path(), &clock, None);
    let id = create(&mut registry, "Fragile");
    registry
        .store()
        .local()
        .set(&schemas::space_slot(&id), "{\"nodes\": [", START)
        .unwrap();

    let data = registry.load(&id).unwrap().unwrap();
    assert!(data.is_empty());
    assert_eq!(data.space_id.as_deref(), Some(id.as_str()));
    assert_eq!(stored_graph(&registry, &id), SpaceData::empty(&id));
}

#[test]
fn load_of_unknown_space_is_none() {
    let clock = ManualClock::new(START);
    let mut registry = registry(&clock);
    assert_eq!(registry.load("nope").unwrap(), None);
    assert_eq!(registry.snapshot("nope").unwrap(), None);
    assert_eq!(registry.active_id(), None);
}

#[test]
fn empty_local_store_hydrates_from_remote() {
    let clock = ManualClock::new(START);
    let mirror = MemoryMirror::new();
    mirror.insert(
        schemas::REMOTE_SPACES_INDEX,
        json!([{ "id": "r1", "name": "Remote", "createdAt": 1, "updatedAt": 1, "lastAccessedAt": 1 }]),
    );
    mirror.insert(schemas::REMOTE_ACTIVE_SPACE, json!("r1"));
    mirror.insert(
        &schemas::space_remote_key("r1"),
        json!({ "spaceId": "r1", "nodes": [{ "id": "n1", "type": "node" }], "edges": [] }),
    );

    let mut registry = mirrored_registry(&clock, &mirror);
    assert_eq!(registry.list().len(), 1);
    assert_eq!(registry.active_id(), Some("r1"));
    assert_eq!(
        registry.get_meta("r1").unwrap().core_node_id.as_deref(),
        Some("core-r1")
    );
    assert_eq!(registry.snapshot("r1").unwrap().unwrap().nodes.len(), 1);
    assert!(registry.store().local().get(&schemas::space_slot("r1")).unwrap().is_some());
}

#[test]
fn non_empty_local_store_ignores_remote_index() {
    let tmp = tempdir().unwrap();
    let clock = ManualClock::new(START);
    {
        let mut registry = disk_registry(tmp.path(), &clock, None);
        create(&mut registry, "Local");
        registry.flush_all().unwrap();
    }

    let mirror = MemoryMirror::new();
    mirror.insert(
        schemas::REMOTE_SPACES_INDEX,
        json!([{ "id": "r1", "name": "Remote", "createdAt": 1, "updatedAt": 1, "lastAccessedAt": 1 }]),
    );
    let registry = disk_registry(tmp.path(), &clock, Some(&mirror));
    let names: Vec<&str> = registry.list().iter().map(|meta| meta.name.as_str()).collect();
    assert_eq!(names, vec!["Local"]);
}

#[test]
fn missing_local_graph_is_fetched_from_remote_once() {
    let clock = ManualClock::new(START);
    let mirror = MemoryMirror::new();
    let mut registry = mirrored_registry(&clock, &mirror);
    let id = create(&mut registry, "Lazy");
    registry.store().local().remove(&schemas::space_slot(&id)).unwrap();
    mirror.insert(
        &schemas::space_remote_key(&id),
        json!({ "spaceId": id, "nodes": [{ "id": "n1" }], "edges": [] }),
    );

    let data = registry.snapshot(&id).unwrap().unwrap();
    assert_eq!(data.nodes.len(), 1);

    mirror.set_offline(true);
    assert_eq!(registry.snapshot(&id).unwrap().unwrap().nodes.len(), 1);
}

#[test]
fn remote_writes_are_debounced_per_key() {
    let clock = ManualClock::new(START);
    let mirror = MemoryMirror::new();
    let mut registry = mirrored_registry(&clock, &mirror);
    assert!(registry.store().has_remote());
    let id = create(&mut registry, "Busy");
    assert_eq!(registry.store().pending_remote_writes(), 2);

    let mut latest = SpaceData::empty(&id);
    for step in 0..3 {
        clock.advance(100);
        latest.nodes.push(Node::new(format!("n{}", step), NodeType::Node, 0.0, 0.0));
        registry.store_mut().write(&id, &latest).unwrap();
        assert_eq!(registry.pump().unwrap(), 0);
    }
    assert_eq!(mirror.set_calls(), 0);

    // The index was scheduled at START and is due first.
    clock.set(START + 400);
    assert_eq!(registry.pump().unwrap(), 1);
    assert_eq!(mirror.set_calls(), 1);
    assert!(mirror.snapshot().contains_key(schemas::REMOTE_SPACES_INDEX));

    clock.set(START + 300 + 400);
    assert_eq!(registry.pump().unwrap(), 1);
    assert_eq!(mirror.set_calls(), 2);
    let remote = mirror.snapshot();
    let mirrored: SpaceData =
        serde_json::from_value(remote[&schemas::space_remote_key(&id)].clone()).unwrap();
    assert_eq!(mirrored, latest);
    assert_eq!(registry.store().next_due(), None);
}

#[test]
fn remote_failures_never_reach_the_caller() {
    let clock = ManualClock::new(START);
    let mirror = MemoryMirror::new();
    let mut registry = mirrored_registry(&clock, &mirror);
    mirror.set_offline(true);

    let id = create(&mut registry, "Offline");
    clock.advance(1_000);
    registry.pump().unwrap();
    registry.flush_all().unwrap();
    assert!(registry.hard_delete(&id).unwrap());
    assert!(mirror.snapshot().is_empty());
}

#[test]
fn saves_are_held_during_interactions() {
    let clock = ManualClock::new(START);
    let mut registry = registry(&clock);
    let id = create(&mut registry, "Drag");
    registry.load(&id).unwrap();

    assert_eq!(registry.begin_interaction(), 1);
    assert_eq!(registry.begin_interaction(), 2);
    for step in 0..3 {
        registry.update_live(|data| {
            data.nodes.push(Node::new(format!("n{}", step), NodeType::Node, 0.0, 0.0));
        });
        assert!(registry.save_current_during_interaction().unwrap());
    }
    assert!(stored_graph(&registry, &id).nodes.is_empty());
    assert_eq!(registry.store().pending_local_flushes(), 1);

    registry.end_interaction();
    assert_eq!(registry.pump().unwrap(), 0);
    assert!(stored_graph(&registry, &id).nodes.is_empty());

    registry.end_interaction();
    clock.advance(149);
    assert_eq!(registry.pump().unwrap(), 0);
    clock.advance(1);
    assert_eq!(registry.pump().unwrap(), 1);
    assert_eq!(stored_graph(&registry, &id).nodes.len(), 3);
    assert_eq!(registry.store().pending_local_flushes(), 0);
}

#[test]
fn direct_save_supersedes_held_snapshot() {
    let clock = ManualClock::new(START);
    let mut registry = registry(&clock);
    let id = create(&mut registry, "Mixed");
    registry.load(&id).unwrap();

    registry.begin_interaction();
    registry.update_live(|data| data.nodes.push(Node::new("held", NodeType::Node, 0.0, 0.0)));
    registry.save_current_during_interaction().unwrap();
    registry.update_live(|data| data.nodes.push(Node::new("direct", NodeType::Node, 0.0, 0.0)));
    registry.save_current().unwrap();
    registry.end_interaction();

    assert_eq!(registry.store().pending_local_flushes(), 0);
    assert_eq!(stored_graph(&registry, &id).nodes.len(), 2);
}

#[test]
fn switching_spaces_flushes_held_edits() {
    let clock = ManualClock::new(START);
    let mut registry = registry(&clock);
    let first = create(&mut registry, "First");
    let second = create(&mut registry, "Second");
    registry.load(&first).unwrap();

    registry.begin_interaction();
    registry.update_live(|data| data.nodes.push(Node::new("n1", NodeType::Node, 0.0, 0.0)));
    registry.save_current_during_interaction().unwrap();
    registry.end_interaction();

    registry.load(&second).unwrap();
    assert_eq!(stored_graph(&registry, &first).nodes.len(), 1);
    assert_eq!(registry.active_id(), Some(second.as_str()));
}

#[test]
fn names_are_disambiguated_case_insensitively() {
    let clock = ManualClock::new(START);
    let mut registry = registry(&clock);
    let a = create(&mut registry, "New Space");
    let b = create(&mut registry, "new space");
    let c = create(&mut registry, "   ");
    assert_eq!(registry.get_meta(&a).unwrap().name, "New Space");
    assert_eq!(registry.get_meta(&b).unwrap().name, "new space 1");
    assert_eq!(registry.get_meta(&c).unwrap().name, "New Space 2");

    assert_eq!(registry.rename(&c, "NEW SPACE").unwrap().as_deref(), Some("NEW SPACE 2"));
    assert_eq!(registry.rename(&a, "New Space").unwrap().as_deref(), Some("New Space"));
    assert_eq!(registry.rename("missing", "X").unwrap(), None);

    // Trashed names are free again, and a restore re-disambiguates.
    registry.soft_delete(&a).unwrap();
    let d = create(&mut registry, "New Space");
    assert_eq!(registry.get_meta(&d).unwrap().name, "New Space");
    registry.restore(&a).unwrap();
    assert_eq!(registry.get_meta(&a).unwrap().name, "New Space 3");
}

#[test]
fn trash_is_purged_strictly_after_retention() {
    let clock = ManualClock::new(START);
    let mut registry = registry(&clock);
    let id = create(&mut registry, "Old");
    assert!(registry.soft_delete(&id).unwrap());
    assert!(!registry.soft_delete(&id).unwrap());
    assert_eq!(registry.trashed().len(), 1);
    assert!(registry.list().is_empty());

    clock.set(START + 29 * DAY_MS);
    assert!(registry.purge_expired_trash().unwrap().is_empty());
    clock.set(START + 30 * DAY_MS);
    assert!(registry.purge_expired_trash().unwrap().is_empty());

    clock.set(START + 31 * DAY_MS);
    assert_eq!(registry.purge_expired_trash().unwrap(), vec![id.clone()]);
    assert!(registry.get_meta(&id).is_none());
    assert!(registry.store().local().get(&schemas::space_slot(&id)).unwrap().is_none());
}

#[test]
fn expired_trash_is_purged_on_open() {
    let tmp = tempdir().unwrap();
    let clock = ManualClock::new(START);
    let id = {
        let mut registry = disk_registry(tmp.path(), &clock, None);
        let keep = create(&mut registry, "Keep");
        let id = create(&mut registry, "Gone");
        registry.soft_delete(&id).unwrap();
        registry.soft_delete(&keep).unwrap();
        registry.restore(&keep).unwrap();
        id
    };

    clock.advance(31 * DAY_MS);
    let registry = disk_registry(tmp.path(), &clock, None);
    assert!(registry.get_meta(&id).is_none());
    assert_eq!(registry.list().len(), 1);
}

#[test]
fn soft_delete_redirects_the_active_space() {
    let clock = ManualClock::new(START);
    let mut registry = registry(&clock);
    let a = create(&mut registry, "A");
    clock.advance(10);
    let b = create(&mut registry, "B");
    clock.advance(10);
    registry.load(&a).unwrap();
    clock.advance(10);
    registry.load(&b).unwrap();

    assert!(registry.soft_delete(&b).unwrap());
    assert_eq!(registry.active_id(), Some(a.as_str()));
    assert_eq!(registry.live().unwrap().space_id, a);

    assert!(registry.soft_delete(&a).unwrap());
    assert_eq!(registry.active_id(), None);
    assert!(registry.live().is_none());
    let active: Option<String> = registry.store().read_record(schemas::SLOT_ACTIVE_SPACE).unwrap();
    assert_eq!(active, None);
}

#[test]
fn trashed_space_cannot_be_opened() {
    let clock = ManualClock::new(START);
    let mut registry = registry(&clock);
    let a = create(&mut registry, "A");
    let b = create(&mut registry, "B");
    registry.load(&b).unwrap();
    registry.soft_delete(&a).unwrap();

    assert_eq!(registry.load(&a).unwrap(), None);
    assert_eq!(registry.active_id(), Some(b.as_str()));
    assert_eq!(registry.live().unwrap().space_id, b);
    let active: Option<String> = registry.store().read_record(schemas::SLOT_ACTIVE_SPACE).unwrap();
    assert_eq!(active.as_deref(), Some(b.as_str()));

    registry.restore(&a).unwrap();
    assert!(registry.load(&a).unwrap().is_some());
    assert_eq!(registry.active_id(), Some(a.as_str()));
}

#[test]
fn replacing_the_live_graph_marks_it_dirty() {
    let clock = ManualClock::new(START);
    let mut registry = registry(&clock);
    assert!(!registry.store().has_remote());
    assert!(!registry.replace_live(SpaceData::empty("nowhere")));

    let id = create(&mut registry, "Imported");
    registry.load(&id).unwrap();
    let mut imported = SpaceData::empty(&id);
    imported.nodes.push(Node::new("n1", NodeType::Node, 1.0, 2.0));
    assert!(registry.replace_live(imported));
    assert!(registry.live().unwrap().dirty);

    assert!(registry.save_current().unwrap());
    assert!(!registry.live().unwrap().dirty);
    assert!(stored_graph(&registry, &id).node("n1").is_some());
}

#[test]
fn list_orders_by_last_access() {
    let clock = ManualClock::new(START);
    let mut registry = registry(&clock);
    let a = create(&mut registry, "A");
    let b = create(&mut registry, "B");
    clock.advance(5);
    registry.load(&a).unwrap();

    let ids: Vec<&str> = registry.list().iter().map(|meta| meta.id.as_str()).collect();
    assert_eq!(ids, vec![a.as_str(), b.as_str()]);

    registry.soft_delete(&b).unwrap();
    assert_eq!(registry.list_with(true, true).len(), 2);
    assert_eq!(registry.list_with(false, true).len(), 1);
}

#[test]
fn playground_is_seeded_and_protected() {
    let clock = ManualClock::new(START);
    let mut registry = registry(&clock);
    assert!(registry.ensure_onboarding_spaces().unwrap());

    let meta = registry.get_meta(PLAYGROUND_SPACE_ID).unwrap();
    assert_eq!(meta.kind, SpaceKind::Playground);
    assert_eq!(meta.name, PLAYGROUND_NAME);
    assert_eq!(registry.user_space_count(), 0);
    assert!(registry.list_with(false, false).is_empty());

    let seeded = registry.snapshot(PLAYGROUND_SPACE_ID).unwrap().unwrap();
    assert_eq!(seeded.nodes.len(), 5);
    assert_eq!(seeded.edges.len(), 6);

    assert!(!registry.soft_delete(PLAYGROUND_SPACE_ID).unwrap());
    assert!(!registry.hard_delete(PLAYGROUND_SPACE_ID).unwrap());
    assert!(!registry.ensure_onboarding_spaces().unwrap());

    registry
        .store_mut()
        .write(PLAYGROUND_SPACE_ID, &SpaceData::empty(PLAYGROUND_SPACE_ID))
        .unwrap();
    assert!(registry.ensure_onboarding_spaces().unwrap());
    assert_eq!(registry.snapshot(PLAYGROUND_SPACE_ID).unwrap().unwrap().nodes.len(), 5);
}

#[test]
fn legacy_sandbox_is_folded_into_the_playground() {
    let clock = ManualClock::new(START);
    let mut registry = registry(&clock);
    registry
        .create(
            "Sandbox",
            None,
            CreateOptions {
                id: Some(LEGACY_SANDBOX_ID.to_string()),
                kind: SpaceKind::Playground,
            },
        )
        .unwrap();
    let mut data = SpaceData::empty(LEGACY_SANDBOX_ID);
    data.nodes.push(Node::new("tutorial-1", NodeType::Node, 0.0, 0.0));
    registry.store_mut().write(LEGACY_SANDBOX_ID, &data).unwrap();

    assert!(registry.ensure_onboarding_spaces().unwrap());
    assert!(registry.get_meta(LEGACY_SANDBOX_ID).is_none());
    assert!(registry.store().local().get(&schemas::space_slot(LEGACY_SANDBOX_ID)).unwrap().is_none());

    let moved = registry.snapshot(PLAYGROUND_SPACE_ID).unwrap().unwrap();
    assert_eq!(moved.space_id.as_deref(), Some(PLAYGROUND_SPACE_ID));
    let ids: Vec<&str> = moved.nodes.iter().map(|node| node.id.as_str()).collect();
    assert_eq!(ids, vec!["tutorial-1"]);
}

#[test]
fn delete_clusters_removes_whole_subtrees() {
    let clock = ManualClock::new(START);
    let mut registry = registry(&clock);
    let id = create(&mut registry, "Clusters");

    let core = core_id_for(&id);
    let mut data = SpaceData::empty(&id);
    data.nodes.push(Node::new(&core, NodeType::Core, 0.0, 0.0));
    data.nodes.push(Node::new("A", NodeType::Cluster, 0.0, 0.0));
    data.nodes.push(Node::new("B", NodeType::Cluster, 0.0, 0.0).with_parent("A"));
    data.nodes.push(Node::new("a1", NodeType::Node, 0.0, 0.0).with_parent("A"));
    data.nodes.push(Node::new("b1", NodeType::Node, 0.0, 0.0).with_parent("B"));
    data.nodes.push(Node::new("free", NodeType::Node, 0.0, 0.0));
    data.edges.push(Edge::new("e1", &core, "A"));
    data.edges.push(Edge::new("e2", &core, "free"));
    data.edges.push(Edge::new("e3", "b1", "free"));
    registry.store_mut().write(&id, &data).unwrap();

    let mut removed = registry
        .delete_clusters(&id, &["B".to_string(), "A".to_string()])
        .unwrap();
    removed.sort();
    assert_eq!(removed, vec!["A", "B", "a1", "b1"]);

    let left = registry.snapshot(&id).unwrap().unwrap();
    let ids: Vec<&str> = left.nodes.iter().map(|node| node.id.as_str()).collect();
    assert_eq!(ids, vec![core.as_str(), "free"]);
    assert_eq!(left.edges, vec![Edge::new("e2", &core, "free")]);
}

#[test]
fn lifecycle_emits_events() {
    let clock = ManualClock::new(START);
    let mut registry = registry(&clock);
    let sink = RecordingSink::new();
    registry.subscribe(Box::new(sink.clone()));

    let id = create(&mut registry, "Tracked");
    registry.rename(&id, "Renamed").unwrap();
    registry.load(&id).unwrap();
    registry.soft_delete(&id).unwrap();
    registry.restore(&id).unwrap();
    registry.hard_delete(&id).unwrap();

    assert_eq!(
        sink.names(),
        vec![
            "space-created",
            "space-renamed",
            "space-changed",
            "space-deleted",
            "space-restored",
            "space-deleted",
        ]
    );
    let events = sink.events();
    assert!(events.iter().all(|event| event.space_id() == id));
    assert!(matches!(events[3], SpaceEvent::Deleted { deleted_at: Some(_), .. }));
    assert!(matches!(events[5], SpaceEvent::Deleted { deleted_at: None, .. }));
}
