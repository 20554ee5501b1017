//! Transfer Coordinator
//!
//! Entry point for the boundary layer. Each public operation opens exactly
//! one store transaction, runs the executor inside it, and either commits
//! everything or rolls everything back.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};

use super::error::TransferError;
use super::executor;
use super::store::{StoreTx, TransferStore, load_state};
use super::types::{
    Actor, GroupReport, TransferGroup, TransferLog, TransferOutcome, TransferPlan,
};
use crate::core_types::{ContainerId, GroupId, PlanOrder};
use crate::models::ContainerState;

/// Transfer Coordinator - owns transaction boundaries
pub struct TransferCoordinator {
    store: Arc<dyn TransferStore>,
}

impl TransferCoordinator {
    /// Create a new TransferCoordinator
    pub fn new(store: Arc<dyn TransferStore>) -> Self {
        Self { store }
    }

    /// Access to the store, e.g. for seeding catalog rows
    pub fn store(&self) -> &Arc<dyn TransferStore> {
        &self.store
    }

    /// Immediately move everything in `from` into `into`.
    ///
    /// Creates a one-plan group and executes it in a single transaction.
    /// Returns the post-transfer state of both containers.
    pub async fn transfer_all(
        &self,
        from: ContainerId,
        into: ContainerId,
        actor: Option<&Actor>,
    ) -> Result<TransferOutcome, TransferError> {
        let mut tx = self.store.begin().await?;
        let result = Self::run_transfer_all(tx.as_mut(), from, into, actor).await;
        let outcome = self.finish(tx, result).await?;

        info!(
            group_id = outcome.group.id,
            from = %outcome.origin.container.name,
            into = %outcome.destination.container.name,
            moved = outcome.logs.len(),
            content_volume = outcome.destination.content_volume(),
            "Transfer committed"
        );
        Ok(outcome)
    }

    async fn run_transfer_all(
        tx: &mut dyn StoreTx,
        from: ContainerId,
        into: ContainerId,
        actor: Option<&Actor>,
    ) -> Result<TransferOutcome, TransferError> {
        if from == into {
            return Err(TransferError::SameContainer);
        }
        // Both must exist before a group is created for them
        for id in [from, into] {
            if tx.container(id).await?.is_none() {
                return Err(TransferError::ContainerNotFound(id));
            }
        }

        let group = tx.insert_group().await?;
        tx.insert_plan(group.id, from, into, 0).await?;
        let report = executor::execute_group(tx, group.id, actor, Utc::now()).await?;

        Ok(TransferOutcome {
            origin: load_state(tx, from).await?,
            destination: load_state(tx, into).await?,
            group: report.group,
            logs: report.logs,
        })
    }

    /// Build a group from an ordered list of `(from, into)` routes.
    ///
    /// Plans are numbered `0..routes.len()` in the given order. Nothing is
    /// executed.
    pub async fn create_group(
        &self,
        routes: &[(ContainerId, ContainerId)],
    ) -> Result<(TransferGroup, Vec<TransferPlan>), TransferError> {
        let mut seen = HashSet::new();
        for &(from, into) in routes {
            if from == into {
                return Err(TransferError::SameContainer);
            }
            if !seen.insert((from, into)) {
                return Err(TransferError::InvalidInput(format!(
                    "route {} -> {} appears twice",
                    from, into
                )));
            }
        }

        let mut tx = self.store.begin().await?;
        let result = Self::run_create_group(tx.as_mut(), routes).await;
        let (group, plans) = self.finish(tx, result).await?;

        info!(group_id = group.id, plans = plans.len(), "Transfer group created");
        Ok((group, plans))
    }

    async fn run_create_group(
        tx: &mut dyn StoreTx,
        routes: &[(ContainerId, ContainerId)],
    ) -> Result<(TransferGroup, Vec<TransferPlan>), TransferError> {
        let group = tx.insert_group().await?;
        let mut plans = Vec::with_capacity(routes.len());
        for (order, &(from, into)) in routes.iter().enumerate() {
            let order = PlanOrder::try_from(order)
                .map_err(|_| TransferError::InvalidInput("too many plans".to_string()))?;
            plans.push(tx.insert_plan(group.id, from, into, order).await?);
        }
        Ok((group, plans))
    }

    /// Append one plan at an explicit position to a group not yet executed
    pub async fn add_plan(
        &self,
        group_id: GroupId,
        from: ContainerId,
        into: ContainerId,
        order: PlanOrder,
    ) -> Result<TransferPlan, TransferError> {
        if from == into {
            return Err(TransferError::SameContainer);
        }
        let mut tx = self.store.begin().await?;
        let result = Self::run_add_plan(tx.as_mut(), group_id, from, into, order).await;
        self.finish(tx, result).await
    }

    async fn run_add_plan(
        tx: &mut dyn StoreTx,
        group_id: GroupId,
        from: ContainerId,
        into: ContainerId,
        order: PlanOrder,
    ) -> Result<TransferPlan, TransferError> {
        let group = tx
            .group(group_id)
            .await?
            .ok_or(TransferError::GroupNotFound(group_id))?;
        if group.is_stamped() || !tx.logs(group_id).await?.is_empty() {
            return Err(TransferError::AlreadyExecuted(group_id));
        }
        tx.insert_plan(group_id, from, into, order).await
    }

    /// Execute a prepared group as one atomic unit of work
    pub async fn execute_group(
        &self,
        group_id: GroupId,
        actor: Option<&Actor>,
    ) -> Result<GroupReport, TransferError> {
        let mut tx = self.store.begin().await?;
        let result = executor::execute_group(tx.as_mut(), group_id, actor, Utc::now()).await;
        let report = self.finish(tx, result).await?;

        info!(
            group_id,
            logs = report.logs.len(),
            executed_by = ?report.group.executed_by,
            "Transfer group committed"
        );
        Ok(report)
    }

    /// Current state of one container
    pub async fn container_state(&self, id: ContainerId) -> Result<ContainerState, TransferError> {
        let mut tx = self.store.begin().await?;
        let result = load_state(tx.as_mut(), id).await;
        self.finish_read(tx, result).await
    }

    /// Audit trail of a group, ascending by order
    pub async fn group_logs(
        &self,
        group_id: GroupId,
    ) -> Result<Vec<TransferLog>, TransferError> {
        let mut tx = self.store.begin().await?;
        let result = match tx.group(group_id).await {
            Ok(Some(_)) => tx.logs(group_id).await,
            Ok(None) => Err(TransferError::GroupNotFound(group_id)),
            Err(e) => Err(e),
        };
        self.finish_read(tx, result).await
    }

    /// Commit on success, roll back on failure.
    ///
    /// A failing rollback is logged; the original error is returned.
    async fn finish<T>(
        &self,
        mut tx: Box<dyn StoreTx>,
        result: Result<T, TransferError>,
    ) -> Result<T, TransferError> {
        match result {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(e) => {
                if e.is_invariant_fault() {
                    error!(store = self.store.name(), error = %e, "Transfer aborted on invariant fault");
                } else {
                    warn!(store = self.store.name(), code = e.code(), error = %e, "Transfer rejected");
                }
                if let Err(rb) = tx.rollback().await {
                    error!(error = %rb, "Rollback failed");
                }
                Err(e)
            }
        }
    }

    /// Read-only transactions are always rolled back
    async fn finish_read<T>(
        &self,
        mut tx: Box<dyn StoreTx>,
        result: Result<T, TransferError>,
    ) -> Result<T, TransferError> {
        if let Err(rb) = tx.rollback().await {
            warn!(error = %rb, "Rollback of read transaction failed");
        }
        result
    }
}
