//! Test utilities and helpers for quilt
//!
//! Deterministic randomness, fixtures, assertions and async helpers shared
//! by unit tests, integration tests and benches.

pub mod assertions;
pub mod async_helpers;
pub mod deterministic_rng;
pub mod fixtures;

pub use assertions::*;
pub use async_helpers::*;
pub use deterministic_rng::*;
pub use fixtures::*;
