/*
    CRDT subsystem - Conflict-Free Replicated Data Types

    Clocks, last-writer-wins registers, version summaries and the operation
    log that together make every canvas edit commutative, associative and
    idempotent.
*/

pub mod clock;
pub mod lww_register;
pub mod oplog;
pub mod traits;
pub mod version_summary;

pub use clock::{Clock, LogicalClock, Site};
pub use lww_register::LWWRegister;
pub use oplog::{OpExport, OpLog};
pub use traits::Crdt;
pub use version_summary::VersionSummary;
