/*
 * Flattened, immutable snapshot of a `SelectionTree` used for text filtering.
 *
 * The snapshot stores the tree in post-order together with one lower-cased search key
 * per node and the index of each node's parent inside the same arrays. A filter pass is
 * then a single linear scan: because every child precedes its parent, a child can flag
 * its parent slot before the parent is evaluated. The scan only reads the snapshot, so
 * it can run on a worker thread while the live tree keeps being edited; the result is a
 * plain `Vec<bool>` aligned to the snapshot.
 */
use crate::core::selection_tree::{NodeId, SelectionTree};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

/* Outcome of a scan whose cancel flag was raised. Callers discard it. */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterCancelled;

impl fmt::Display for FilterCancelled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Filter computation was cancelled")
    }
}

impl std::error::Error for FilterCancelled {}

#[derive(Debug, Clone, Default)]
pub struct FlatIndex {
    version: u64,
    nodes: Vec<NodeId>,
    keys: Vec<String>,
    parents: Vec<Option<usize>>,
}

/* Visibility per snapshot slot, tagged with the term and tree version it was computed for. */
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisibilityResult {
    pub version: u64,
    pub term: String,
    pub visible: Vec<bool>,
}

impl FlatIndex {
    pub fn build(tree: &SelectionTree) -> Self {
        let nodes = tree.post_order();
        let slot_of: HashMap<NodeId, usize> = nodes
            .iter()
            .enumerate()
            .map(|(slot, id)| (*id, slot))
            .collect();

        let mut keys = Vec::with_capacity(nodes.len());
        let mut parents = Vec::with_capacity(nodes.len());
        for id in &nodes {
            let node = tree.node(*id);
            let mut key = node.name.to_lowercase();
            if let Some(path) = &node.path {
                key.push_str(&path.to_string_lossy().to_lowercase());
            }
            keys.push(key);
            parents.push(node.parent().and_then(|parent| slot_of.get(&parent).copied()));
        }

        log::debug!(
            "FlatIndex: Built snapshot of {} nodes for tree version {}.",
            nodes.len(),
            tree.version()
        );
        FlatIndex {
            version: tree.version(),
            nodes,
            keys,
            parents,
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node_at(&self, slot: usize) -> NodeId {
        self.nodes[slot]
    }

    pub fn key_at(&self, slot: usize) -> &str {
        &self.keys[slot]
    }

    pub fn parent_slot(&self, slot: usize) -> Option<usize> {
        self.parents[slot]
    }

    /*
     * Computes visibility for `term` in one post-order pass. A node is visible when its
     * key contains the lower-cased term or any of its children is visible. The term is
     * matched as typed, surrounding spaces included. The cancel flag is checked before
     * every node.
     */
    pub fn compute_visibility(
        &self,
        term: &str,
        cancel: &AtomicBool,
    ) -> Result<VisibilityResult, FilterCancelled> {
        let needle = term.to_lowercase();
        let mut has_visible_child = vec![false; self.nodes.len()];
        let mut visible = vec![false; self.nodes.len()];

        for slot in 0..self.nodes.len() {
            if cancel.load(Ordering::Relaxed) {
                return Err(FilterCancelled);
            }
            let self_match = self.keys[slot].contains(&needle);
            if self_match || has_visible_child[slot] {
                visible[slot] = true;
                if let Some(parent) = self.parents[slot] {
                    has_visible_child[parent] = true;
                }
            }
        }

        Ok(VisibilityResult {
            version: self.version,
            term: needle,
            visible,
        })
    }
}
