//! Cluster hierarchy over a Space graph.
//!
//! Membership comes from two sources: an explicit `meta.parentClusterId` on the child,
//! and (optionally) an edge whose source is a cluster. Explicit metadata wins over an
//! edge. Parent references are never validated, so every walk here carries a visited
//! set and stops instead of failing on dangling ids or cycles.
//!
//! A child reachable from two clusters through membership edges (and with no explicit
//! parent) is registered under both. Traversals then attribute it to whichever parent
//! reaches it first in breadth-first order, with siblings visited in ascending id
//! order, so the outcome depends only on the graph and never on input ordering.

use crate::core::model::{Edge, Node, NodeMeta, SpaceData};
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

pub type ChildrenIndex = BTreeMap<String, BTreeSet<String>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeOptions {
    pub include_edge_linked: bool,
    pub max_depth: Option<usize>,
}

impl Default for TreeOptions {
    fn default() -> Self {
        Self {
            include_edge_linked: true,
            max_depth: None,
        }
    }
}

impl TreeOptions {
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = Some(max_depth);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClusterDescendant<'a> {
    pub id: &'a str,
    pub node: &'a Node,
    pub depth: usize,
    pub parent_id: &'a str,
}

/// Focus/ghost split for progressive disclosure of nested clusters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisibilitySets {
    pub focus_ids: BTreeSet<String>,
    pub ghost_ids: BTreeSet<String>,
}

/// How many hierarchy levels are interactive below a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SubspaceLod {
    One = 1,
    Two = 2,
    Three = 3,
}

impl SubspaceLod {
    pub fn from_level(level: u8) -> Option<Self> {
        match level {
            1 => Some(Self::One),
            2 => Some(Self::Two),
            3 => Some(Self::Three),
            _ => None,
        }
    }

    pub fn focus_depth_limit(self) -> usize {
        self as usize - 1
    }

    pub fn ghost_depth(self) -> Option<usize> {
        match self {
            Self::One => None,
            _ => Some(self.focus_depth_limit() + 1),
        }
    }
}

fn node_map(nodes: &[Node]) -> FxHashMap<&str, &Node> {
    nodes.iter().map(|node| (node.id.as_str(), node)).collect()
}

pub fn build_children_index(nodes: &[Node], edges: &[Edge], include_edge_linked: bool) -> ChildrenIndex {
    let by_id = node_map(nodes);
    let cluster_ids: FxHashSet<&str> = nodes
        .iter()
        .filter(|node| node.is_cluster())
        .map(|node| node.id.as_str())
        .collect();
    let mut index = ChildrenIndex::new();

    for node in nodes {
        if node.is_core() {
            continue;
        }
        let Some(parent) = node.parent_cluster_id() else {
            continue;
        };
        if cluster_ids.contains(parent) {
            add_child(&mut index, parent, &node.id);
        }
    }

    if !include_edge_linked {
        return index;
    }

    for edge in edges {
        if !cluster_ids.contains(edge.source.as_str()) {
            continue;
        }
        let Some(target) = by_id.get(edge.target.as_str()) else {
            continue;
        };
        if target.is_core() {
            continue;
        }
        if let Some(parent) = target.parent_cluster_id() {
            if parent != edge.source {
                continue;
            }
        }
        add_child(&mut index, &edge.source, &target.id);
    }

    index
}

fn add_child(index: &mut ChildrenIndex, cluster_id: &str, child_id: &str) {
    if cluster_id == child_id {
        return;
    }
    index
        .entry(cluster_id.to_string())
        .or_default()
        .insert(child_id.to_string());
}

/// Breadth-first descendants of `root_cluster_id`, root excluded.
///
/// Each node is reported once at its first-discovered depth. Nodes deeper than
/// `max_depth` are neither reported nor expanded.
pub fn collect_descendants<'a>(
    root_cluster_id: &str,
    nodes: &'a [Node],
    edges: &[Edge],
    options: TreeOptions,
) -> Vec<ClusterDescendant<'a>> {
    let by_id = node_map(nodes);
    let index = build_children_index(nodes, edges, options.include_edge_linked);
    let mut descendants = Vec::new();
    let mut visited: FxHashSet<String> = FxHashSet::default();
    visited.insert(root_cluster_id.to_string());

    let Some(root) = by_id.get(root_cluster_id).copied() else {
        return descendants;
    };
    let mut queue: VecDeque<(&str, usize, &'a str)> = VecDeque::new();
    if let Some(children) = index.get(root_cluster_id) {
        for child in children {
            queue.push_back((child.as_str(), 1, root.id.as_str()));
        }
    }

    while let Some((id, depth, parent_id)) = queue.pop_front() {
        if !visited.insert(id.to_string()) {
            continue;
        }
        if options.max_depth.is_some_and(|max| depth > max) {
            continue;
        }
        let Some(node) = by_id.get(id).copied() else {
            continue;
        };

        descendants.push(ClusterDescendant {
            id: node.id.as_str(),
            node,
            depth,
            parent_id,
        });

        if let Some(children) = index.get(id) {
            for child in children {
                queue.push_back((child.as_str(), depth + 1, node.id.as_str()));
            }
        }
    }

    descendants
}

pub fn collect_descendant_ids(
    root_cluster_id: &str,
    nodes: &[Node],
    edges: &[Edge],
    options: TreeOptions,
) -> Vec<String> {
    collect_descendants(root_cluster_id, nodes, edges, options)
        .into_iter()
        .map(|item| item.id.to_string())
        .collect()
}

pub fn compute_scope_visibility_sets(
    scope_id: &str,
    nodes: &[Node],
    edges: &[Edge],
    lod: SubspaceLod,
) -> VisibilitySets {
    let mut sets = VisibilitySets::default();
    sets.focus_ids.insert(scope_id.to_string());

    let focus_limit = lod.focus_depth_limit();
    let ghost_depth = lod.ghost_depth();
    let max_depth = ghost_depth.unwrap_or(focus_limit);
    if max_depth == 0 {
        return sets;
    }

    let options = TreeOptions::default().with_max_depth(max_depth);
    for item in collect_descendants(scope_id, nodes, edges, options) {
        if item.depth <= focus_limit {
            sets.focus_ids.insert(item.id.to_string());
        } else if Some(item.depth) == ghost_depth {
            sets.ghost_ids.insert(item.id.to_string());
        }
    }
    sets
}

/// Drop selected clusters that already have a selected ancestor.
///
/// Ancestry is walked through `parentClusterId`; reaching an id already on the walk
/// (the start included) ends it and the selection is kept as top-level.
pub fn top_level_cluster_selection(selected_ids: &[String], nodes: &[Node]) -> Vec<String> {
    let by_id = node_map(nodes);
    let selected: FxHashSet<&str> = selected_ids.iter().map(String::as_str).collect();

    selected_ids
        .iter()
        .filter(|cluster_id| {
            let mut seen: FxHashSet<&str> = FxHashSet::default();
            seen.insert(cluster_id.as_str());
            let mut current = by_id.get(cluster_id.as_str()).copied();
            while let Some(node) = current {
                let Some(parent) = node.parent_cluster_id() else {
                    return true;
                };
                if seen.contains(parent) {
                    return true;
                }
                if selected.contains(parent) {
                    return false;
                }
                seen.insert(parent);
                current = by_id.get(parent).copied();
            }
            true
        })
        .cloned()
        .collect()
}

/// Detach every descendant from the hierarchy without deleting it.
///
/// `update_meta` receives each descendant id with its released meta. Returns the ids
/// that were detached, in traversal order.
pub fn release_cluster_subtree<F>(root_cluster_id: &str, nodes: &[Node], edges: &[Edge], mut update_meta: F) -> Vec<String>
where
    F: FnMut(&str, NodeMeta),
{
    let descendants = collect_descendants(root_cluster_id, nodes, edges, TreeOptions::default());
    for item in &descendants {
        update_meta(item.id, item.node.meta.released());
    }
    descendants.into_iter().map(|item| item.id.to_string()).collect()
}

/// Remove every descendant, deepest first. The caller removes the root itself.
pub fn delete_cluster_subtree<F>(root_cluster_id: &str, nodes: &[Node], edges: &[Edge], mut remove_node: F) -> Vec<String>
where
    F: FnMut(&str),
{
    let mut descendants = collect_descendants(root_cluster_id, nodes, edges, TreeOptions::default());
    descendants.sort_by(|a, b| b.depth.cmp(&a.depth));
    for item in &descendants {
        remove_node(item.id);
    }
    descendants.into_iter().map(|item| item.id.to_string()).collect()
}

impl SpaceData {
    /// Delete a cluster and its whole subtree from this snapshot, then drop edges left
    /// dangling. Returns the removed ids, root last.
    pub fn remove_cluster_subtree(&mut self, root_cluster_id: &str) -> Vec<String> {
        if self.node(root_cluster_id).is_none() {
            return Vec::new();
        }
        let mut removed = delete_cluster_subtree(root_cluster_id, &self.nodes, &self.edges, |_| {});
        removed.push(root_cluster_id.to_string());

        let doomed: FxHashSet<&str> = removed.iter().map(String::as_str).collect();
        self.nodes.retain(|node| !doomed.contains(node.id.as_str()));
        self.prune_dangling_edges();
        removed
    }

    /// Remove several selected clusters, recursing only from top-level picks.
    pub fn remove_clusters(&mut self, selected_ids: &[String]) -> Vec<String> {
        let roots = top_level_cluster_selection(selected_ids, &self.nodes);
        let mut removed = Vec::new();
        for root in roots {
            removed.extend(self.remove_cluster_subtree(&root));
        }
        removed
    }
}
