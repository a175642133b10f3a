/*
    Spatial subsystem - R-tree index over live entity bounds
*/
mod aabb;
mod bulk;
pub mod index;
mod node;
pub mod query;

pub use index::{IndexConfig, SpatialIndex};
pub use query::{QueryIter, RegionQuery};
