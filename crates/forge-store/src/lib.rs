//! Single-file SQLite persistence for Forge state.
//!
//! Explicit save/load only; there is no autosave. The engine, scheduler and
//! ingestion service call `save_job` at state transitions. Between
//! transitions, in-memory objects may diverge from the store; consumers that
//! need durable truth read through the store.

mod error;
mod schema;
mod store;

pub use error::{StoreError, StoreResult};
pub use schema::SCHEMA_VERSION;
pub use store::Store;
