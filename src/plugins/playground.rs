//! The onboarding playground Space.
//!
//! Every store carries one playground Space with a fixed id. It is exempt from name
//! disambiguation, cannot be deleted, and is re-seeded with the tutorial graph whenever
//! its graph is found empty. Stores written before the playground existed kept their
//! tutorial in a `sandbox` Space; that one is folded into the playground.

use crate::core::error::SpaceError;
use crate::core::model::{ARCHECORE_ID, Edge, Node, NodeType, SpaceData, SpaceKind, core_id_for};
use crate::plugins::spaces::{CreateOptions, SpaceRegistry};
use tracing::info;

pub const PLAYGROUND_SPACE_ID: &str = "playground";
pub const PLAYGROUND_NAME: &str = "Playground";
pub const LEGACY_SANDBOX_ID: &str = "sandbox";

struct SeedNode {
    id: &'static str,
    label: &'static str,
    icon: &'static str,
    x: f64,
    y: f64,
    content: &'static str,
}

const SEED_NODES: &[SeedNode] = &[
    SeedNode {
        id: "playground-welcome",
        label: "Welcome",
        icon: "👋",
        x: -200.0,
        y: -150.0,
        content: "# Welcome\n\nThe field is an open canvas of nodes. Open a node to read or edit it, \
                  close it to return to the field.",
    },
    SeedNode {
        id: "playground-create",
        label: "Create a Node",
        icon: "✦",
        x: 200.0,
        y: -150.0,
        content: "# Create a Node\n\nDouble-click an empty spot on the field to add a node.",
    },
    SeedNode {
        id: "playground-link",
        label: "Link Two Nodes",
        icon: "🔗",
        x: -200.0,
        y: 150.0,
        content: "# Link Two Nodes\n\nDrag from one node onto another to record a relationship.",
    },
    SeedNode {
        id: "playground-group",
        label: "Group & Organize",
        icon: "📦",
        x: 200.0,
        y: 150.0,
        content: "# Group & Organize\n\nSelect several nodes and group them into a cluster. \
                  Clusters nest, and nested levels open progressively.",
    },
];

const SEED_LINKS: &[(&str, &str)] = &[
    ("playground-welcome", "playground-create"),
    ("playground-link", "playground-group"),
];

/// Tutorial graph for the playground Space.
pub fn seed_graph(now_ms: u64) -> SpaceData {
    let core_id = core_id_for(PLAYGROUND_SPACE_ID);
    let mut data = SpaceData::empty(PLAYGROUND_SPACE_ID);

    let mut core = Node::new(&core_id, NodeType::Core, 0.0, 0.0).with_label("Playground Core");
    core.created_at = Some(now_ms);
    core.updated_at = Some(now_ms);
    data.nodes.push(core);

    for seed in SEED_NODES {
        let mut node = Node::new(seed.id, NodeType::Node, seed.x, seed.y).with_label(seed.label);
        node.data.content = Some(seed.content.to_string());
        node.data
            .extra
            .insert("icon_value".to_string(), serde_json::Value::from(seed.icon));
        node.created_at = Some(now_ms);
        node.updated_at = Some(now_ms);
        data.nodes.push(node);
        data.edges.push(seed_edge(&core_id, seed.id));
    }
    for (from, to) in SEED_LINKS {
        data.edges.push(seed_edge(from, to));
    }
    data
}

fn seed_edge(from: &str, to: &str) -> Edge {
    let mut edge = Edge::new(format!("seed:{}->{}", from, to), from, to);
    edge.edge_type = Some("default".to_string());
    edge
}

/// Make sure the playground Space exists and holds a graph. Returns true when anything
/// was created, moved or seeded.
pub fn ensure_onboarding_spaces(registry: &mut SpaceRegistry) -> Result<bool, SpaceError> {
    let now = registry.now_ms();
    let has_playground = registry.get_meta(PLAYGROUND_SPACE_ID).is_some();
    let legacy = registry
        .get_meta(LEGACY_SANDBOX_ID)
        .map(|meta| meta.id.clone());

    if !has_playground {
        let legacy_data = match &legacy {
            Some(id) => registry.store_mut().read_existing(id)?,
            None => None,
        };
        registry.create(
            PLAYGROUND_NAME,
            Some(ARCHECORE_ID),
            CreateOptions {
                id: Some(PLAYGROUND_SPACE_ID.to_string()),
                kind: SpaceKind::Playground,
            },
        )?;

        match legacy_data.filter(|data| !data.is_empty()) {
            Some(mut data) => {
                data.space_id = Some(PLAYGROUND_SPACE_ID.to_string());
                registry.store_mut().write(PLAYGROUND_SPACE_ID, &data)?;
                info!("moved legacy sandbox graph into the playground");
            }
            None => registry.store_mut().write(PLAYGROUND_SPACE_ID, &seed_graph(now))?,
        }
        if let Some(id) = legacy {
            registry.hard_delete(&id)?;
        }
        return Ok(true);
    }

    let mut changed = registry.ensure_kind(PLAYGROUND_SPACE_ID, SpaceKind::Playground)?;
    let current = registry.store_mut().read_existing(PLAYGROUND_SPACE_ID)?;
    if current.is_none_or(|data| data.nodes.is_empty()) {
        registry.store_mut().write(PLAYGROUND_SPACE_ID, &seed_graph(now))?;
        changed = true;
    }
    Ok(changed)
}
