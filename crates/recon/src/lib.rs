//! Reconciliation orchestrator: wires statement import, the match scorer
//! and a pluggable store into the match/unmatch state machine.

pub mod memory;
pub mod reconciler;
pub mod store;

pub use memory::MemoryStore;
pub use reconciler::{ImportOutcome, ReconError, Reconciler};
pub use store::{ReconStore, StoreError};
