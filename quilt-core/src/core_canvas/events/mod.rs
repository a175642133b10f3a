//! Change notifications for rendering subscribers

pub mod broadcaster;

pub use broadcaster::{ChangeBroadcaster, ChangeEvent, ChangeOrigin};
