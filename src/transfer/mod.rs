//! Container transfers
//!
//! A transfer moves every content row of container A into container B.
//! Rows whose substance is already present in B are merged into B's row
//! with a volume-weighted concentration; the others are relocated as-is.
//! Each moved row produces one [`TransferLog`].
//!
//! # Flow
//!
//! ```text
//! TransferCoordinator ── begin ──> StoreTx
//!        │                            │
//!        └─ execute_group ─> execute_plan (per plan, by order)
//!                                │  capacity check
//!                                │  merge / relocate
//!                                └─ insert_log (group-wide order)
//!        commit on success, rollback on any error
//! ```
//!
//! # Invariants
//!
//! 1. A plan is refused if A's content plus B's content exceeds B's capacity
//! 2. Every operation of the coordinator is one transaction
//! 3. Log order numbers never repeat within a group

pub mod coordinator;
pub mod error;
pub mod executor;
pub mod merge;
pub mod store;
pub mod types;


// Re-exports for convenience
pub use coordinator::TransferCoordinator;
pub use error::TransferError;
pub use executor::{execute_group, execute_plan};
pub use merge::merge;
pub use store::{MemoryStore, PgStore, StoreTx, TransferStore, connect};
pub use types::{
    Actor, GroupReport, TransferGroup, TransferLog, TransferOutcome, TransferPlan,
};
