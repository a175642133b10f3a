/*
    node.rs - R-tree nodes, insertion and removal

    Leaves hold (entity, box) entries; internal nodes hold children with
    their cached bounding box. All leaves sit at the same depth.

    Insertion descends by least enlargement and splits overflowing nodes
    with the quadratic algorithm. Removal collects the entries of any node
    that underflows so the caller can reinsert them.
*/

use super::aabb::Aabb;
use crate::core_canvas::model::EntityId;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Entry {
    pub id: EntityId,
    pub bbox: Aabb,
}

#[derive(Debug, Clone)]
pub struct Child {
    pub bbox: Aabb,
    pub node: Box<Node>,
}

#[derive(Debug, Clone)]
pub enum Node {
    Leaf(Vec<Entry>),
    Internal(Vec<Child>),
}

/// Result of inserting into a subtree
pub enum Insertion {
    Fit,
    Split { kept: Aabb, sibling: Child },
}

impl Node {
    pub fn empty_leaf() -> Self {
        Node::Leaf(Vec::new())
    }

    pub fn len(&self) -> usize {
        match self {
            Node::Leaf(entries) => entries.len(),
            Node::Internal(children) => children.len(),
        }
    }

    pub fn bbox(&self) -> Option<Aabb> {
        match self {
            Node::Leaf(entries) => Aabb::union_all(entries.iter().map(|e| e.bbox)),
            Node::Internal(children) => Aabb::union_all(children.iter().map(|c| c.bbox)),
        }
    }

    /// Insert `entry` below this node. `nodes` counts allocated nodes.
    pub fn insert(&mut self, entry: Entry, max: usize, min: usize, nodes: &mut usize) -> Insertion {
        match self {
            Node::Leaf(entries) => {
                entries.push(entry);
                if entries.len() <= max {
                    return Insertion::Fit;
                }
                let (keep, kept, split, split_box) = quadratic_split(std::mem::take(entries), min, |e| e.bbox);
                *entries = keep;
                *nodes += 1;
                Insertion::Split { kept, sibling: Child { bbox: split_box, node: Box::new(Node::Leaf(split)) } }
            }
            Node::Internal(children) => {
                let idx = choose_subtree(children, &entry.bbox);
                let child = &mut children[idx];
                match child.node.insert(entry, max, min, nodes) {
                    Insertion::Fit => child.bbox = child.bbox.union(&entry.bbox),
                    Insertion::Split { kept, sibling } => {
                        child.bbox = kept;
                        children.push(sibling);
                    }
                }
                if children.len() <= max {
                    return Insertion::Fit;
                }
                let (keep, kept, split, split_box) = quadratic_split(std::mem::take(children), min, |c| c.bbox);
                *children = keep;
                *nodes += 1;
                Insertion::Split { kept, sibling: Child { bbox: split_box, node: Box::new(Node::Internal(split)) } }
            }
        }
    }

    /// Remove the entry for `id` whose box is `bbox`.
    ///
    /// Children that drop below `min` are detached; their remaining entries
    /// land in `orphans` and the detached node count is subtracted from
    /// `nodes`. Returns whether the entry was found.
    pub fn remove(
        &mut self,
        id: &EntityId,
        bbox: &Aabb,
        min: usize,
        orphans: &mut Vec<Entry>,
        nodes: &mut usize,
    ) -> bool {
        match self {
            Node::Leaf(entries) => match entries.iter().position(|e| e.id == *id) {
                Some(pos) => {
                    entries.swap_remove(pos);
                    true
                }
                None => false,
            },
            Node::Internal(children) => {
                for i in 0..children.len() {
                    if !children[i].bbox.contains(bbox) {
                        continue;
                    }
                    if !children[i].node.remove(id, bbox, min, orphans, nodes) {
                        continue;
                    }
                    if children[i].node.len() < min {
                        let detached = children.swap_remove(i);
                        *nodes -= detached.node.drain_into(orphans);
                    } else if let Some(shrunk) = children[i].node.bbox() {
                        children[i].bbox = shrunk;
                    }
                    return true;
                }
                false
            }
        }
    }

    /// Move every entry of this subtree into `out`; returns the number of
    /// nodes consumed, this one included
    pub fn drain_into(self, out: &mut Vec<Entry>) -> usize {
        match self {
            Node::Leaf(entries) => {
                out.extend(entries);
                1
            }
            Node::Internal(children) => {
                1 + children.into_iter().map(|c| c.node.drain_into(out)).sum::<usize>()
            }
        }
    }

    pub fn count_nodes(&self) -> usize {
        match self {
            Node::Leaf(_) => 1,
            Node::Internal(children) => 1 + children.iter().map(|c| c.node.count_nodes()).sum::<usize>(),
        }
    }

    pub fn height(&self) -> usize {
        match self {
            Node::Leaf(_) => 1,
            Node::Internal(children) => 1 + children.first().map_or(0, |c| c.node.height()),
        }
    }
}

/// Child needing the least enlargement to hold `bbox`; ties go to the
/// smaller child
fn choose_subtree(children: &[Child], bbox: &Aabb) -> usize {
    let mut best = 0;
    let mut best_cost = (f64::INFINITY, f64::INFINITY);
    for (i, child) in children.iter().enumerate() {
        let cost = (child.bbox.enlargement(bbox), child.bbox.area());
        if cost.0 < best_cost.0 || (cost.0 == best_cost.0 && cost.1 < best_cost.1) {
            best = i;
            best_cost = cost;
        }
    }
    best
}

/// Guttman's quadratic split. Both groups end up with at least `min` items.
fn quadratic_split<T>(
    mut items: Vec<T>,
    min: usize,
    bbox: impl Fn(&T) -> Aabb,
) -> (Vec<T>, Aabb, Vec<T>, Aabb) {
    let (s1, s2) = pick_seeds(&items, &bbox);
    // s1 < s2, so removing s2 first leaves s1 in place
    let b = items.swap_remove(s2);
    let a = items.swap_remove(s1);

    let mut box_a = bbox(&a);
    let mut box_b = bbox(&b);
    let mut group_a = vec![a];
    let mut group_b = vec![b];

    while !items.is_empty() {
        if group_a.len() + items.len() <= min {
            for item in items.drain(..) {
                box_a = box_a.union(&bbox(&item));
                group_a.push(item);
            }
            break;
        }
        if group_b.len() + items.len() <= min {
            for item in items.drain(..) {
                box_b = box_b.union(&bbox(&item));
                group_b.push(item);
            }
            break;
        }

        let next = pick_next(&items, &box_a, &box_b, &bbox);
        let item = items.swap_remove(next);
        let r = bbox(&item);
        let grow_a = box_a.enlargement(&r);
        let grow_b = box_b.enlargement(&r);
        let to_a = if grow_a != grow_b {
            grow_a < grow_b
        } else if box_a.area() != box_b.area() {
            box_a.area() < box_b.area()
        } else {
            group_a.len() <= group_b.len()
        };
        if to_a {
            box_a = box_a.union(&r);
            group_a.push(item);
        } else {
            box_b = box_b.union(&r);
            group_b.push(item);
        }
    }

    (group_a, box_a, group_b, box_b)
}

/// The pair wasting the most area when grouped together
fn pick_seeds<T>(items: &[T], bbox: &impl Fn(&T) -> Aabb) -> (usize, usize) {
    let mut seeds = (0, 1);
    let mut worst = f64::NEG_INFINITY;
    for i in 0..items.len() {
        let a = bbox(&items[i]);
        for j in (i + 1)..items.len() {
            let b = bbox(&items[j]);
            let waste = a.union(&b).area() - a.area() - b.area();
            if waste > worst {
                worst = waste;
                seeds = (i, j);
            }
        }
    }
    seeds
}

/// The item with the strongest preference for one group
fn pick_next<T>(items: &[T], box_a: &Aabb, box_b: &Aabb, bbox: &impl Fn(&T) -> Aabb) -> usize {
    let mut best = 0;
    let mut best_diff = f64::NEG_INFINITY;
    for (i, item) in items.iter().enumerate() {
        let r = bbox(item);
        let diff = (box_a.enlargement(&r) - box_b.enlargement(&r)).abs();
        if diff > best_diff {
            best_diff = diff;
            best = i;
        }
    }
    best
}
