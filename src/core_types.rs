//! Core types used throughout the crate
//!
//! Row identities are `i64` so they map 1:1 onto BIGSERIAL primary keys.
//! The memory backend hands out ids from the same kind of sequence.

/// Unit ID - a row in the unit table (ml, ul, ...)
pub type UnitId = i64;

/// Container kind ID - e.g. "1ml test tube"
pub type KindId = i64;

/// Container ID - unique per physical vessel
pub type ContainerId = i64;

/// Substance ID
pub type SubstanceId = i64;

/// Content ID - one (substance, container) row
pub type ContentId = i64;

/// Transfer group ID
pub type GroupId = i64;

/// Transfer plan ID
pub type PlanId = i64;

/// Transfer log ID
pub type LogId = i64;

/// User ID of an authenticated principal, owned by the auth layer
pub type UserId = i64;

/// Position of a plan or log entry inside its group.
///
/// Stored as INTEGER; strictly increasing per group.
pub type PlanOrder = i32;
