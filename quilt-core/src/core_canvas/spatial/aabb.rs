/*
    aabb.rs - Corner-form bounding boxes used inside the R-tree

    Nodes keep their bounds as (min, max) corners rather than (x, y, w, h)
    so unions are exact: min/max never round, which keeps containment
    checks during removal reliable.
*/

use crate::core_canvas::model::Rect;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Aabb {
    pub fn from_rect(rect: &Rect) -> Self {
        Aabb { min_x: rect.min_x(), min_y: rect.min_y(), max_x: rect.max_x(), max_y: rect.max_y() }
    }

    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    pub fn area(&self) -> f64 {
        (self.max_x - self.min_x) * (self.max_y - self.min_y)
    }

    pub fn enlargement(&self, other: &Aabb) -> f64 {
        self.union(other).area() - self.area()
    }

    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min_x <= other.max_x
            && other.min_x <= self.max_x
            && self.min_y <= other.max_y
            && other.min_y <= self.max_y
    }

    pub fn contains(&self, other: &Aabb) -> bool {
        self.min_x <= other.min_x
            && self.min_y <= other.min_y
            && other.max_x <= self.max_x
            && other.max_y <= self.max_y
    }

    pub fn center_x(&self) -> f64 {
        (self.min_x + self.max_x) / 2.0
    }

    pub fn center_y(&self) -> f64 {
        (self.min_y + self.max_y) / 2.0
    }

    /// Union of all boxes, `None` for an empty input
    pub fn union_all<I: IntoIterator<Item = Aabb>>(boxes: I) -> Option<Aabb> {
        boxes.into_iter().reduce(|acc, b| acc.union(&b))
    }
}
