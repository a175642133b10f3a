/*
    index.rs - Spatial index over live entity bounds

    A dynamic R-tree keyed by entity id. The index mirrors the entity store:
    every live entity with derivable bounds has exactly one entry, carrying
    exactly those bounds. The replica keeps it in step on every applied
    operation; `rebuild` recovers from any drift.

    Node churn from repeated updates is tracked against the node count an
    STR-packed tree would need. Once the live tree exceeds that by
    `rebuild_factor` it is repacked in one pass.
*/

use super::aabb::Aabb;
use super::bulk;
use super::node::{Child, Entry, Insertion, Node};
use super::query::RegionQuery;
use crate::core_canvas::model::{EntityId, Rect};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Tuning knobs for the R-tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Maximum entries per node
    pub max_entries: usize,

    /// Minimum entries per non-root node
    pub min_entries: usize,

    /// Repack once node count exceeds the packed ideal by this factor
    pub rebuild_factor: f64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        IndexConfig { max_entries: 16, min_entries: 6, rebuild_factor: 2.0 }
    }
}

#[derive(Debug, Clone)]
pub struct SpatialIndex {
    pub(super) root: Node,
    locations: HashMap<EntityId, Rect>,
    node_count: usize,
    rebuilds: u64,
    config: IndexConfig,
}

impl Default for SpatialIndex {
    fn default() -> Self {
        Self::new(IndexConfig::default())
    }
}

impl SpatialIndex {
    pub fn new(config: IndexConfig) -> Self {
        SpatialIndex {
            root: Node::empty_leaf(),
            locations: HashMap::new(),
            node_count: 1,
            rebuilds: 0,
            config,
        }
    }

    /// Build an index from a full entry set in one pass
    pub fn bulk_load<I>(config: IndexConfig, items: I) -> Self
    where
        I: IntoIterator<Item = (EntityId, Rect)>,
    {
        let mut index = Self::new(config);
        index.locations = items.into_iter().collect();
        index.repack();
        index
    }

    /// Insert or move an entity; returns its previous bounds
    pub fn insert(&mut self, id: EntityId, rect: Rect) -> Option<Rect> {
        let previous = self.detach(&id);
        self.locations.insert(id, rect);
        self.insert_entry(Entry { id, bbox: Aabb::from_rect(&rect) });
        self.maybe_repack();
        previous
    }

    /// Alias of `insert` that reads better at call sites moving an entity
    pub fn update(&mut self, id: EntityId, rect: Rect) -> Option<Rect> {
        self.insert(id, rect)
    }

    /// Remove an entity; returns its bounds if it was indexed
    pub fn remove(&mut self, id: &EntityId) -> Option<Rect> {
        let previous = self.detach(id);
        if previous.is_some() {
            self.maybe_repack();
        }
        previous
    }

    /// Lazily enumerate entities whose bounds intersect `region`
    pub fn query(&self, region: Rect) -> RegionQuery<'_> {
        RegionQuery::new(self, region)
    }

    /// Replace the whole contents with `items`
    pub fn rebuild<I>(&mut self, items: I)
    where
        I: IntoIterator<Item = (EntityId, Rect)>,
    {
        self.locations = items.into_iter().collect();
        self.repack();
    }

    pub fn get(&self, id: &EntityId) -> Option<Rect> {
        self.locations.get(id).copied()
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.locations.contains_key(id)
    }

    /// Every indexed (entity, bounds) pair, in no particular order
    pub fn entries(&self) -> impl Iterator<Item = (EntityId, Rect)> + '_ {
        self.locations.iter().map(|(id, rect)| (*id, *rect))
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    pub fn node_count(&self) -> usize {
        self.node_count
    }

    pub fn height(&self) -> usize {
        self.root.height()
    }

    /// Number of full repacks since creation
    pub fn rebuilds(&self) -> u64 {
        self.rebuilds
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    pub fn clear(&mut self) {
        self.root = Node::empty_leaf();
        self.locations.clear();
        self.node_count = 1;
    }

    fn insert_entry(&mut self, entry: Entry) {
        let IndexConfig { max_entries, min_entries, .. } = self.config;
        if let Insertion::Split { kept, sibling } =
            self.root.insert(entry, max_entries, min_entries, &mut self.node_count)
        {
            let old_root = std::mem::replace(&mut self.root, Node::empty_leaf());
            self.root = Node::Internal(vec![Child { bbox: kept, node: Box::new(old_root) }, sibling]);
            self.node_count += 1;
        }
    }

    fn detach(&mut self, id: &EntityId) -> Option<Rect> {
        let rect = self.locations.remove(id)?;
        let bbox = Aabb::from_rect(&rect);
        let mut orphans = Vec::new();
        let found = self.root.remove(id, &bbox, self.config.min_entries, &mut orphans, &mut self.node_count);

        if !found {
            // Tree and location map disagree; repack from the map.
            debug!(entity = %id, "entry missing from tree during removal, repacking");
            self.repack();
            return Some(rect);
        }

        self.collapse_root();
        for orphan in orphans {
            self.insert_entry(orphan);
        }
        Some(rect)
    }

    fn collapse_root(&mut self) {
        loop {
            match &mut self.root {
                Node::Internal(children) if children.len() == 1 => {
                    if let Some(only) = children.pop() {
                        self.root = *only.node;
                        self.node_count -= 1;
                    }
                }
                Node::Internal(children) if children.is_empty() => {
                    self.root = Node::empty_leaf();
                }
                _ => break,
            }
        }
    }

    fn maybe_repack(&mut self) {
        let ideal = bulk::packed_node_count(self.locations.len(), self.config.max_entries);
        if self.node_count as f64 > self.config.rebuild_factor * ideal as f64 {
            debug!(nodes = self.node_count, ideal, "spatial index fragmented, repacking");
            self.repack();
        }
    }

    fn repack(&mut self) {
        let entries: Vec<Entry> = self
            .locations
            .iter()
            .map(|(id, rect)| Entry { id: *id, bbox: Aabb::from_rect(rect) })
            .collect();
        let (root, nodes) = bulk::pack(entries, self.config.max_entries);
        self.root = root;
        self.node_count = nodes;
        self.rebuilds += 1;
    }

    /// Structural self-check used by tests
    #[cfg(test)]
    pub(crate) fn verify(&self) -> Result<(), String> {
        fn walk(
            node: &Node,
            depth: usize,
            leaf_depth: &mut Option<usize>,
            max: usize,
            seen: &mut Vec<Entry>,
        ) -> Result<(), String> {
            if node.len() > max {
                return Err(format!("node with {} items exceeds {}", node.len(), max));
            }
            match node {
                Node::Leaf(entries) => {
                    match leaf_depth {
                        Some(d) if *d != depth => return Err(format!("leaf at depth {depth}, expected {d}")),
                        _ => *leaf_depth = Some(depth),
                    }
                    seen.extend(entries.iter().copied());
                }
                Node::Internal(children) => {
                    for child in children {
                        if child.node.bbox() != Some(child.bbox) {
                            return Err("stale child bounding box".to_string());
                        }
                        walk(&child.node, depth + 1, leaf_depth, max, seen)?;
                    }
                }
            }
            Ok(())
        }

        let mut seen = Vec::new();
        walk(&self.root, 0, &mut None, self.config.max_entries, &mut seen)?;
        if seen.len() != self.locations.len() {
            return Err(format!("{} tree entries, {} locations", seen.len(), self.locations.len()));
        }
        for entry in &seen {
            match self.locations.get(&entry.id) {
                Some(rect) if Aabb::from_rect(rect) == entry.bbox => {}
                _ => return Err(format!("entry {} disagrees with location map", entry.id)),
            }
        }
        if self.root.count_nodes() != self.node_count {
            return Err(format!("node count {} but tree has {}", self.node_count, self.root.count_nodes()));
        }
        Ok(())
    }
}
