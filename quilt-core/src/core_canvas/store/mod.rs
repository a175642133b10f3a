/*
    Store subsystem - the authoritative entity set and its guards
*/

pub mod entity_store;
pub mod errors;
pub mod validator;

pub use entity_store::{ApplyOutcome, EntityStore};
pub use errors::{StoreError, StoreResult};
pub use validator::{OperationValidator, ValidationRules};
