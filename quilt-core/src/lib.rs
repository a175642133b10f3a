//! quilt: a replicated spatial canvas engine
//!
//! Each replica holds a set of entities whose fields are last-writer-wins
//! registers, plus an R-tree over the bounds of live entities. Replicas
//! exchange operations through a `Transport`; version summaries let a
//! reconnecting peer receive exactly what it missed. Ephemeral presence
//! travels beside the document and expires on its own.

pub mod config;
pub mod core_canvas;
pub mod logging;
pub mod metrics;
pub mod simulate;
pub mod test_utils;

pub use config::{ConfigError, EngineConfig};
pub use core_canvas::{Replica, ReplicaOptions, StoreError, StoreResult};
pub use logging::{init_logging, init_logging_with_config, LogConfig, LogLevel};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_exports() {
        let config = EngineConfig::default();
        let replica = Replica::with_options(config.site(), config.replica_options());
        assert!(replica.store().is_empty());
        assert_eq!(LogLevel::default(), config.logging.level);
    }
}
