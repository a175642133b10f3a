/*
    Sync subsystem - delta negotiation and streaming between replicas

    Components:
    - wire: frame codec (OP, VERSION_SUMMARY, PRESENCE)
    - reconciler: per-peer state machine, no IO
    - transport: the seam a session sends frames through
    - session: async driver tying the three to a shared replica
*/
pub mod reconciler;
pub mod session;
pub mod transport;
pub mod wire;

pub use reconciler::{compute_delta, SyncReconciler, SyncState};
pub use session::{SessionEnd, SessionReport, SyncSession};
pub use transport::{memory_transport, MemoryTransport, Transport};
pub use wire::{Frame, WireOp, WirePresence, WireStamp, WireSummary, WireSummaryEntry, MAX_FRAME_LEN};
