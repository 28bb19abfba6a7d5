//! Share links: immutable scoped copies of a Space's graph.
//!
//! A link owns the subgraph it was created from. Later edits to the Space never reach
//! an issued link.

use crate::core::error::SpaceError;
use crate::core::hierarchy::{TreeOptions, collect_descendant_ids};
use crate::core::model::{Edge, Node, SpaceData};
use crate::core::schemas;
use crate::core::time;
use crate::plugins::entitlements::EntitlementGate;
use crate::plugins::space_store::SpaceStore;
use crate::plugins::spaces::SpaceRegistry;
use clap::{Parser, Subcommand, ValueEnum};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashSet;
use std::sync::LazyLock;
use tracing::{debug, info};

pub const DEFAULT_SHARE_TITLE: &str = "Shared Graph";

static SHARE_QUERY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[?&]share=([^&#]*)").unwrap());
static SHARE_PATH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"/share/([A-Za-z0-9_-]+)").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ScopeType {
    Space,
    Cluster,
    Node,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Private,
    #[default]
    Shared,
    Public,
}

/// Self-contained subgraph: every edge has both endpoints among `nodes`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopedSnapshot {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub scope_node_id: Option<String>,
}

impl ScopedSnapshot {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareLinkSnapshot {
    pub id: String,
    pub token: String,
    #[serde(default)]
    pub title: String,
    pub scope_type: ScopeType,
    pub space_id: String,
    #[serde(default)]
    pub scope_node_id: Option<String>,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub created_at: u64,
    #[serde(default)]
    pub updated_at: u64,
    #[serde(default)]
    pub visibility: Visibility,
}

#[derive(Debug, Clone)]
pub struct CreateShareLinkInput {
    pub title: String,
    pub scope_type: ScopeType,
    pub space_id: String,
    pub scope_node_id: Option<String>,
    pub visibility: Visibility,
}

/// Cut the part of `data` a share link or export targets.
///
/// `Space` returns the whole graph. `Cluster` and `Node` need a scope node; a missing
/// one yields an empty scope. A cluster target (or a `Cluster` scope) brings its whole
/// subtree, edge-linked members included. Only edges internal to the result are kept.
pub fn resolve_scope(data: &SpaceData, scope_type: ScopeType, scope_node_id: Option<&str>) -> ScopedSnapshot {
    if scope_type == ScopeType::Space {
        return ScopedSnapshot {
            nodes: data.nodes.clone(),
            edges: data.edges.clone(),
            scope_node_id: None,
        };
    }

    let Some(scope_id) = scope_node_id.map(str::trim).filter(|id| !id.is_empty()) else {
        return ScopedSnapshot::default();
    };
    let Some(root) = data.node(scope_id) else {
        return ScopedSnapshot {
            scope_node_id: Some(scope_id.to_string()),
            ..ScopedSnapshot::default()
        };
    };

    let mut included: HashSet<String> = HashSet::new();
    included.insert(root.id.clone());
    if scope_type == ScopeType::Cluster || root.is_cluster() {
        included.extend(collect_descendant_ids(
            scope_id,
            &data.nodes,
            &data.edges,
            TreeOptions::default(),
        ));
    }

    ScopedSnapshot {
        nodes: data
            .nodes
            .iter()
            .filter(|node| included.contains(&node.id))
            .cloned()
            .collect(),
        edges: data
            .edges
            .iter()
            .filter(|edge| included.contains(&edge.source) && included.contains(&edge.target))
            .cloned()
            .collect(),
        scope_node_id: Some(scope_id.to_string()),
    }
}

/// Issue a share link for a scope of a Space.
///
/// The gate is consulted first and its refusal is returned unchanged. Returns `None`
/// when the Space does not exist or the scope resolves to nothing.
pub fn create_share_link(
    registry: &mut SpaceRegistry,
    gate: &dyn EntitlementGate,
    input: CreateShareLinkInput,
) -> Result<Option<ShareLinkSnapshot>, SpaceError> {
    let space_id = input.space_id.trim().to_string();
    if space_id.is_empty() {
        return Ok(None);
    }
    let title = normalized_title(&input.title);

    let mut links = load_share_links(registry.store())?;
    gate.ensure_can_create_share_link(links.len() as u64)?;

    registry.flush_if_live(&space_id)?;
    let Some(data) = registry.snapshot(&space_id)? else {
        debug!(space_id = %space_id, "share requested for unknown space");
        return Ok(None);
    };

    let scoped = resolve_scope(&data, input.scope_type, input.scope_node_id.as_deref());
    if scoped.is_empty() {
        return Ok(None);
    }

    let now = registry.now_ms();
    let link = ShareLinkSnapshot {
        id: time::new_id(),
        token: time::new_share_token(),
        title,
        scope_type: input.scope_type,
        space_id,
        scope_node_id: scoped.scope_node_id,
        nodes: scoped.nodes,
        edges: scoped.edges,
        created_at: now,
        updated_at: now,
        visibility: input.visibility,
    };

    links.insert(0, link.clone());
    sort_links(&mut links);
    registry
        .store_mut()
        .write_record(schemas::SLOT_SHARE_LINKS, &links)?;
    info!(link_id = %link.id, space_id = %link.space_id, nodes = link.nodes.len(), "share link created");
    Ok(Some(link))
}

/// Every stored link, most recently updated first. Invalid records are skipped.
pub fn load_share_links(store: &SpaceStore) -> Result<Vec<ShareLinkSnapshot>, SpaceError> {
    let entries: Vec<JsonValue> = store
        .read_record(schemas::SLOT_SHARE_LINKS)?
        .unwrap_or_default();
    let mut links: Vec<ShareLinkSnapshot> = entries.into_iter().filter_map(parse_share_link).collect();
    sort_links(&mut links);
    Ok(links)
}

pub fn resolve_share_link(store: &SpaceStore, token: &str) -> Result<Option<ShareLinkSnapshot>, SpaceError> {
    let token = token.trim();
    if token.is_empty() {
        return Ok(None);
    }
    Ok(load_share_links(store)?
        .into_iter()
        .find(|link| link.token == token))
}

pub fn clear_share_links(store: &mut SpaceStore) -> Result<(), SpaceError> {
    store.write_record(schemas::SLOT_SHARE_LINKS, &Vec::<ShareLinkSnapshot>::new())
}

/// `base` with its `share` query parameter set to `token`. `None` for a blank token.
pub fn share_url(base: &str, token: &str) -> Option<String> {
    let token = token.trim();
    if token.is_empty() {
        return None;
    }
    let (without_fragment, fragment) = match base.split_once('#') {
        Some((head, frag)) => (head, Some(frag)),
        None => (base, None),
    };
    let (path, query) = without_fragment
        .split_once('?')
        .unwrap_or((without_fragment, ""));

    let mut params: Vec<&str> = query
        .split('&')
        .filter(|pair| !pair.is_empty() && !pair.starts_with("share="))
        .collect();
    let share_param = format!("share={}", token);
    params.push(&share_param);

    let mut url = format!("{}?{}", path, params.join("&"));
    if let Some(fragment) = fragment {
        url.push('#');
        url.push_str(fragment);
    }
    Some(url)
}

/// Extract a share token from `?share=<token>` or a `/share/<token>` path segment.
pub fn read_share_token(href: &str) -> Option<String> {
    if href.trim().is_empty() {
        return None;
    }
    if let Some(token) = SHARE_QUERY
        .captures(href)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .filter(|token| !token.is_empty())
    {
        return Some(token.to_string());
    }
    let path = href.split(['?', '#']).next().unwrap_or(href);
    SHARE_PATH
        .captures(path)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

fn parse_share_link(value: JsonValue) -> Option<ShareLinkSnapshot> {
    let mut link: ShareLinkSnapshot = serde_json::from_value(value).ok()?;
    link.id = link.id.trim().to_string();
    link.token = link.token.trim().to_string();
    link.space_id = link.space_id.trim().to_string();
    if link.id.is_empty() || link.token.is_empty() || link.space_id.is_empty() {
        return None;
    }
    link.title = normalized_title(&link.title);
    link.scope_node_id = link
        .scope_node_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty());
    if link.updated_at == 0 {
        link.updated_at = link.created_at;
    }
    Some(link)
}

fn normalized_title(title: &str) -> String {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        DEFAULT_SHARE_TITLE.to_string()
    } else {
        trimmed.to_string()
    }
}

fn sort_links(links: &mut [ShareLinkSnapshot]) {
    links.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
}

// --- CLI ---

#[derive(Parser, Debug)]
#[clap(name = "share", about = "Issue and inspect read-only share links.")]
pub struct ShareCli {
    #[clap(subcommand)]
    pub command: ShareCommand,
}

#[derive(Subcommand, Debug)]
pub enum ShareCommand {
    /// Snapshot a scope of a Space into a new share link.
    Create {
        #[clap(long)]
        space: String,
        #[clap(long, value_enum, default_value_t = ScopeType::Space)]
        scope: ScopeType,
        /// Scope node id (cluster or node scopes)
        #[clap(long)]
        node: Option<String>,
        #[clap(long, default_value = "")]
        title: String,
        #[clap(long, value_enum, default_value_t = Visibility::Shared)]
        visibility: Visibility,
        /// Print the link URL against this base
        #[clap(long)]
        base_url: Option<String>,
    },
    /// List issued links, most recent first.
    List,
    /// Look up a link by token, or by a URL carrying one.
    Resolve {
        token: String,
    },
    /// Forget every issued link.
    Clear,
}

pub fn run_share_cli(
    registry: &mut SpaceRegistry,
    gate: &dyn EntitlementGate,
    cli: ShareCli,
) -> Result<(), SpaceError> {
    match cli.command {
        ShareCommand::Create {
            space,
            scope,
            node,
            title,
            visibility,
            base_url,
        } => {
            let link = create_share_link(
                registry,
                gate,
                CreateShareLinkInput {
                    title,
                    scope_type: scope,
                    space_id: space,
                    scope_node_id: node,
                    visibility,
                },
            )?;
            match link {
                Some(link) => {
                    let url = base_url.and_then(|base| share_url(&base, &link.token));
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&serde_json::json!({
                            "id": link.id,
                            "token": link.token,
                            "title": link.title,
                            "scopeType": link.scope_type,
                            "scopeNodeId": link.scope_node_id,
                            "nodes": link.nodes.len(),
                            "edges": link.edges.len(),
                            "url": url,
                        }))?
                    );
                }
                None => println!("Nothing to share: the scope is empty."),
            }
        }
        ShareCommand::List => {
            let links = load_share_links(registry.store())?;
            let summary: Vec<JsonValue> = links
                .iter()
                .map(|link| {
                    serde_json::json!({
                        "id": link.id,
                        "token": link.token,
                        "title": link.title,
                        "spaceId": link.space_id,
                        "scopeType": link.scope_type,
                        "visibility": link.visibility,
                        "updatedAt": link.updated_at,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        ShareCommand::Resolve { token } => {
            let token = read_share_token(&token).unwrap_or(token);
            let link = resolve_share_link(registry.store(), &token)?
                .ok_or_else(|| SpaceError::NotFound(format!("share link '{}'", token)))?;
            println!("{}", serde_json::to_string_pretty(&link)?);
        }
        ShareCommand::Clear => {
            clear_share_links(registry.store_mut())?;
            println!("Share links cleared.");
        }
    }
    registry.flush_all()
}
