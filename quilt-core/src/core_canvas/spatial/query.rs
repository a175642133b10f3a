/*
    query.rs - Lazy region queries

    A `RegionQuery` is a description, not a result: every call to `iter`
    walks the tree afresh, so the same query can be replayed each frame
    without re-creating it. The walk keeps an explicit stack and only
    descends into children whose boxes touch the region.
*/

use super::aabb::Aabb;
use super::index::SpatialIndex;
use super::node::{Child, Entry, Node};
use crate::core_canvas::model::{EntityId, Rect};
use std::slice;

/// Finite, restartable set of entities intersecting a region
#[derive(Clone, Copy)]
pub struct RegionQuery<'a> {
    index: &'a SpatialIndex,
    region: Rect,
}

impl<'a> RegionQuery<'a> {
    pub(super) fn new(index: &'a SpatialIndex, region: Rect) -> Self {
        RegionQuery { index, region }
    }

    pub fn region(&self) -> Rect {
        self.region
    }

    /// Start a fresh walk
    pub fn iter(&self) -> QueryIter<'a> {
        let region = Aabb::from_rect(&self.region);
        let mut iter = QueryIter { region, stack: Vec::new(), leaf: [].iter() };
        iter.enter(&self.index.root);
        iter
    }
}

impl<'a> IntoIterator for &RegionQuery<'a> {
    type Item = EntityId;
    type IntoIter = QueryIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a> IntoIterator for RegionQuery<'a> {
    type Item = EntityId;
    type IntoIter = QueryIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

pub struct QueryIter<'a> {
    region: Aabb,
    stack: Vec<slice::Iter<'a, Child>>,
    leaf: slice::Iter<'a, Entry>,
}

impl<'a> QueryIter<'a> {
    fn enter(&mut self, node: &'a Node) {
        match node {
            Node::Leaf(entries) => self.leaf = entries.iter(),
            Node::Internal(children) => self.stack.push(children.iter()),
        }
    }
}

impl<'a> Iterator for QueryIter<'a> {
    type Item = EntityId;

    fn next(&mut self) -> Option<EntityId> {
        loop {
            let region = self.region;
            if let Some(entry) = self.leaf.by_ref().find(|e| e.bbox.intersects(&region)) {
                return Some(entry.id);
            }

            let top = self.stack.last_mut()?;
            match top.by_ref().find(|c| c.bbox.intersects(&region)) {
                Some(child) => self.enter(&child.node),
                None => {
                    self.stack.pop();
                }
            }
        }
    }
}
