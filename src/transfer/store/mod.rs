//! Storage backends
//!
//! The engine never talks to a database directly. It opens a [`StoreTx`]
//! through a [`TransferStore`], performs every read and write of one unit of
//! work through it, and commits or rolls back at the end.
//!
//! # Backend contract
//!
//! - A transaction is isolated: nothing it writes is visible to others
//!   before `commit`, and a concurrent write to the same containers either
//!   waits or fails the transaction with `TransferError::Conflict`.
//! - Dropping an uncommitted transaction discards it.
//! - Uniqueness constraints are enforced by the backend and reported as
//!   `TransferError::Duplicate`.

pub mod memory;
pub mod postgres;
pub mod schema;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use super::error::TransferError;
use super::types::{NewTransferLog, TransferGroup, TransferLog, TransferPlan};
use crate::config::{StoreBackend, StoreConfig};
use crate::core_types::{
    ContainerId, ContentId, GroupId, KindId, PlanOrder, SubstanceId, UnitId,
};
use crate::models::{Container, ContainerKind, ContainerState, Content, NewContent, Substance};
use crate::volume::{Unit, Volume};

/// Factory for transactions
#[async_trait]
pub trait TransferStore: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &'static str;

    /// Open a new isolated transaction
    async fn begin(&self) -> Result<Box<dyn StoreTx>, TransferError>;
}

/// One open unit of work
#[async_trait]
pub trait StoreTx: Send {
    // === Catalog ===

    async fn insert_unit(
        &mut self,
        short_name: &str,
        long_name: &str,
        to_ml: f64,
    ) -> Result<Unit, TransferError>;

    async fn insert_kind(
        &mut self,
        name: &str,
        quantity: f64,
        unit_id: UnitId,
    ) -> Result<ContainerKind, TransferError>;

    async fn insert_container(
        &mut self,
        name: &str,
        kind_id: KindId,
    ) -> Result<Container, TransferError>;

    async fn insert_substance(&mut self, name: &str) -> Result<Substance, TransferError>;

    async fn insert_content(&mut self, content: &NewContent) -> Result<Content, TransferError>;

    // === Reads ===

    async fn container(&mut self, id: ContainerId) -> Result<Option<Container>, TransferError>;

    /// Current contents of a container, ascending by id
    async fn contents(&mut self, container: ContainerId) -> Result<Vec<Content>, TransferError>;

    async fn content_for(
        &mut self,
        container: ContainerId,
        substance: SubstanceId,
    ) -> Result<Option<Content>, TransferError>;

    async fn group(&mut self, id: GroupId) -> Result<Option<TransferGroup>, TransferError>;

    /// Plans of a group, ascending by order
    async fn plans(&mut self, group: GroupId) -> Result<Vec<TransferPlan>, TransferError>;

    /// Logs of a group, ascending by order
    async fn logs(&mut self, group: GroupId) -> Result<Vec<TransferLog>, TransferError>;

    // === Writes ===

    /// Persist quantity, unit, concentration and container of an existing row
    async fn save_content(&mut self, content: &Content) -> Result<(), TransferError>;

    async fn delete_content(&mut self, id: ContentId) -> Result<(), TransferError>;

    async fn insert_group(&mut self) -> Result<TransferGroup, TransferError>;

    async fn insert_plan(
        &mut self,
        group: GroupId,
        container_a: ContainerId,
        container_b: ContainerId,
        order: PlanOrder,
    ) -> Result<TransferPlan, TransferError>;

    async fn insert_log(&mut self, log: &NewTransferLog) -> Result<TransferLog, TransferError>;

    /// Persist the execution stamp of a group
    async fn save_group(&mut self, group: &TransferGroup) -> Result<(), TransferError>;

    // === Completion ===

    async fn commit(&mut self) -> Result<(), TransferError>;

    async fn rollback(&mut self) -> Result<(), TransferError>;
}

/// Load a container together with its current contents
pub async fn load_state(
    tx: &mut dyn StoreTx,
    id: ContainerId,
) -> Result<ContainerState, TransferError> {
    let container = tx
        .container(id)
        .await?
        .ok_or(TransferError::ContainerNotFound(id))?;
    let contents = tx.contents(id).await?;
    Ok(ContainerState::new(container, contents))
}

/// Field checks shared by every backend before a content row is written
pub(crate) fn validate_content(concentration: f64, volume: &Volume) -> Result<(), TransferError> {
    volume.validate()?;
    if !concentration.is_finite() || concentration < 0.0 {
        return Err(TransferError::InvalidInput(format!(
            "concentration must be a non-negative number, got {}",
            concentration
        )));
    }
    Ok(())
}

pub(crate) fn validate_name(field: &str, name: &str, max_len: usize) -> Result<(), TransferError> {
    if name.trim().is_empty() {
        return Err(TransferError::InvalidInput(format!("{} must not be empty", field)));
    }
    if name.chars().count() > max_len {
        return Err(TransferError::InvalidInput(format!(
            "{} exceeds {} characters",
            field, max_len
        )));
    }
    Ok(())
}

/// Column widths shared by both backends
pub(crate) const UNIT_SHORT_NAME_MAX: usize = 5;
pub(crate) const UNIT_LONG_NAME_MAX: usize = 30;
pub(crate) const NAME_MAX: usize = 100;

/// Build the store selected by configuration
pub async fn connect(config: &StoreConfig) -> Result<Arc<dyn TransferStore>, TransferError> {
    match config.backend {
        StoreBackend::Memory => {
            info!("Using in-memory transfer store");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreBackend::Postgres => {
            let url = config.postgres_url.as_deref().ok_or_else(|| {
                TransferError::SystemError("postgres backend requires postgres_url".to_string())
            })?;
            let pool = PgPoolOptions::new()
                .max_connections(config.max_connections)
                .connect(url)
                .await?;
            info!(
                max_connections = config.max_connections,
                "Connected to PostgreSQL transfer store"
            );
            Ok(Arc::new(PgStore::new(pool)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::Unit;

    #[test]
    fn test_validate_content() {
        let ml = Unit::new(1, "ml", "Millilitres", 1.0);
        assert!(validate_content(25.0, &Volume::new(0.5, ml.clone())).is_ok());
        assert!(validate_content(-1.0, &Volume::new(0.5, ml.clone())).is_err());
        assert!(matches!(
            validate_content(25.0, &Volume::new(-0.5, ml)),
            Err(TransferError::InvalidVolume(_))
        ));
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("name", "TubeA", NAME_MAX).is_ok());
        assert!(validate_name("name", "  ", NAME_MAX).is_err());
        assert!(validate_name("short_name", "toolong", UNIT_SHORT_NAME_MAX).is_err());
    }

    #[tokio::test]
    async fn test_connect_memory() {
        let store = connect(&StoreConfig::default()).await.unwrap();
        assert_eq!(store.name(), "memory");
    }

    #[tokio::test]
    async fn test_connect_postgres_requires_url() {
        let config = StoreConfig {
            backend: StoreBackend::Postgres,
            postgres_url: None,
            max_connections: 1,
        };
        assert!(matches!(
            connect(&config).await,
            Err(TransferError::SystemError(_))
        ));
    }
}
