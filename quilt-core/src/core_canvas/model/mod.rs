/*
    Canvas data model - entities, operations, values and geometry
*/

pub mod entity;
pub mod operation;
pub mod types;

pub use entity::Entity;
pub use operation::Operation;
pub use types::{fields, EntityId, FieldValue, Rect};
