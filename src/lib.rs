//! Tubes - transfer engine for chemical containers
//!
//! Moves every substance held by one container into another, averaging
//! concentrations where both hold the same substance, refusing transfers
//! that would overflow the destination, and recording an ordered audit
//! log. Groups of transfers run atomically.
//!
//! # Modules
//!
//! - [`core_types`] - Row identifiers (ContainerId, GroupId, etc.)
//! - [`volume`] - Units and unit-aware volumes
//! - [`models`] - Containers, substances and content rows
//! - [`transfer`] - Merge rule, executor, coordinator and stores
//! - [`config`] - YAML application config
//! - [`logging`] - tracing subscriber setup

// Core types - must be first!
pub mod core_types;

pub mod config;
pub mod logging;
pub mod models;
pub mod transfer;
pub mod volume;

// Convenient re-exports at crate root
pub use config::{AppConfig, ConfigError, StoreBackend, StoreConfig};
pub use core_types::{ContainerId, GroupId, PlanOrder, SubstanceId, UnitId, UserId};
pub use models::{Container, ContainerKind, ContainerState, Content, Substance};
pub use transfer::{
    Actor, MemoryStore, PgStore, TransferCoordinator, TransferError, TransferGroup, TransferLog,
    TransferPlan, TransferStore,
};
pub use volume::{Unit, Volume, VolumeError};
