/*
    bulk.rs - Sort-Tile-Recursive packing

    Builds a tree bottom-up from a known entry set: sort by x center, cut
    into vertical slices, sort each slice by y center, chunk into nodes of
    `max` items, then repeat one level up until a single root remains.
*/

use super::aabb::Aabb;
use super::node::{Child, Entry, Node};

/// Pack `entries` into a tree. Returns the root and its node count.
pub fn pack(entries: Vec<Entry>, max: usize) -> (Node, usize) {
    if entries.len() <= max {
        return (Node::Leaf(entries), 1);
    }

    let mut nodes = 0;
    let mut level: Vec<Child> = tile(entries, max, |e| e.bbox)
        .into_iter()
        .filter_map(|group| {
            let bbox = Aabb::union_all(group.iter().map(|e| e.bbox))?;
            nodes += 1;
            Some(Child { bbox, node: Box::new(Node::Leaf(group)) })
        })
        .collect();

    while level.len() > max {
        level = tile(level, max, |c| c.bbox)
            .into_iter()
            .filter_map(|group| {
                let bbox = Aabb::union_all(group.iter().map(|c| c.bbox))?;
                nodes += 1;
                Some(Child { bbox, node: Box::new(Node::Internal(group)) })
            })
            .collect();
    }

    (Node::Internal(level), nodes + 1)
}

/// Ideal node count for `len` entries packed at full fanout
pub fn packed_node_count(len: usize, max: usize) -> usize {
    let mut total = 1;
    let mut width = len.div_ceil(max.max(2));
    while width > 1 {
        total += width;
        width = width.div_ceil(max.max(2));
    }
    total
}

fn tile<T>(mut items: Vec<T>, max: usize, bbox: impl Fn(&T) -> Aabb) -> Vec<Vec<T>> {
    let node_total = items.len().div_ceil(max);
    let slices = (node_total as f64).sqrt().ceil() as usize;
    let slice_len = slices.max(1) * max;

    items.sort_by(|a, b| bbox(a).center_x().total_cmp(&bbox(b).center_x()));

    let mut groups = Vec::with_capacity(node_total);
    let mut rest = items;
    while !rest.is_empty() {
        let tail = rest.split_off(slice_len.min(rest.len()));
        let mut slice = rest;
        rest = tail;

        slice.sort_by(|a, b| bbox(a).center_y().total_cmp(&bbox(b).center_y()));
        while !slice.is_empty() {
            let tail = slice.split_off(max.min(slice.len()));
            groups.push(slice);
            slice = tail;
        }
    }
    groups
}
