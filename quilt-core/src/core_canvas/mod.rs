/*
    core_canvas - Replicated spatial canvas engine

    The document layer for collaborative canvases. Handles:
    - Data model (entities, field values, bounds)
    - CRDT merge (Lamport-stamped LWW registers, version summaries, op log)
    - Spatial indexing of live entity bounds
    - Change notification for renderers
    - Ephemeral presence
    - Delta sync between replicas
*/

pub mod crdt;
pub mod events;
pub mod model;
pub mod presence;
pub mod replica;
pub mod spatial;
pub mod store;
pub mod sync;

#[cfg(test)]
pub mod tests;

// Re-export commonly used types
pub use crdt::{LogicalClock, Site, VersionSummary};
pub use events::{ChangeEvent, ChangeOrigin};
pub use model::{fields, Entity, EntityId, FieldValue, Operation, Rect};
pub use presence::{PresenceChannel, PresenceMessage};
pub use replica::{lock_replica, ImportReport, Replica, ReplicaOptions, SharedReplica};
pub use spatial::{IndexConfig, SpatialIndex};
pub use store::{StoreError, StoreResult};
pub use sync::{memory_transport, SyncSession, SyncState, Transport};
