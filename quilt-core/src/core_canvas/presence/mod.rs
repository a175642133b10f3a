/*
    Presence subsystem - ephemeral per-peer state with expiry
*/
pub mod channel;
pub mod sweeper;

pub use channel::{PresenceChannel, PresenceEntry, PresenceMessage};
pub use sweeper::{spawn_sweeper, SweeperHandle};
