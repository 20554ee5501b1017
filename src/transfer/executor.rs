//! Plan and group execution
//!
//! Both functions run inside a transaction owned by the caller and never
//! commit. A returned error means the caller must roll the transaction back;
//! partial effects are never meant to be kept.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::error::TransferError;
use super::merge::merge;
use super::store::{StoreTx, load_state};
use super::types::{Actor, GroupReport, NewTransferLog, TransferLog, TransferPlan};
use crate::core_types::{GroupId, PlanOrder};

/// Move everything in `plan.container_a` into `plan.container_b`.
///
/// Logs are numbered from `starting_order`; the number of logs returned is
/// what the next plan of the group must add to its own starting order.
pub async fn execute_plan(
    tx: &mut dyn StoreTx,
    plan: &TransferPlan,
    starting_order: PlanOrder,
) -> Result<Vec<TransferLog>, TransferError> {
    if plan.container_a == plan.container_b {
        return Err(TransferError::SameContainer);
    }

    let origin = load_state(tx, plan.container_a).await?;
    let destination = load_state(tx, plan.container_b).await?;

    // 1. Capacity check before any write
    let sum_volume = origin.content_volume() + destination.content_volume();
    if sum_volume > destination.container_volume() {
        warn!(
            group_id = plan.group_id,
            from = %origin.container.name,
            into = %destination.container.name,
            sum_volume,
            capacity = destination.container_volume(),
            "Transfer would overflow destination"
        );
        return Err(TransferError::Overflow {
            container: destination.container.name.clone(),
        });
    }

    let from = origin.container.to_ref();
    let into = destination.container.to_ref();

    // 2. Relocate each content row of A; `origin.contents` is a fixed snapshot
    let mut logs = Vec::with_capacity(origin.contents.len());
    for content in origin.contents {
        match tx.content_for(into.id, content.substance.id).await? {
            Some(existing) => {
                let merged = merge(&existing, &content)?;
                tx.save_content(&merged).await?;
                tx.delete_content(content.id).await?;
            }
            None => {
                let mut moved = content.clone();
                moved.container_id = into.id;
                tx.save_content(&moved).await?;
            }
        }

        let order = advance_order(starting_order, logs.len())?;
        let log = tx
            .insert_log(&NewTransferLog {
                group_id: plan.group_id,
                order,
                container_a: from.clone(),
                container_b: into.clone(),
                substance: content.substance,
                volume: content.volume,
            })
            .await?;
        debug!(group_id = plan.group_id, order, "{}", log);
        logs.push(log);
    }

    Ok(logs)
}

/// `order + by`, failing instead of wrapping
fn advance_order(order: PlanOrder, by: usize) -> Result<PlanOrder, TransferError> {
    PlanOrder::try_from(by)
        .ok()
        .and_then(|by| order.checked_add(by))
        .ok_or_else(|| TransferError::SystemError("log order overflow".to_string()))
}

/// Execute every plan of a group in ascending order, then stamp the group.
///
/// Each plan sees the state left by the plans before it. Log order numbers
/// continue across plans instead of restarting at zero.
pub async fn execute_group(
    tx: &mut dyn StoreTx,
    group_id: GroupId,
    actor: Option<&Actor>,
    now: DateTime<Utc>,
) -> Result<GroupReport, TransferError> {
    let mut group = tx
        .group(group_id)
        .await?
        .ok_or(TransferError::GroupNotFound(group_id))?;

    if group.is_stamped() || !tx.logs(group_id).await?.is_empty() {
        return Err(TransferError::AlreadyExecuted(group_id));
    }

    let plans = tx.plans(group_id).await?;
    let mut next_order: PlanOrder = 0;
    let mut logs = Vec::new();

    for plan in &plans {
        let created = execute_plan(tx, plan, next_order).await?;
        next_order = advance_order(next_order, created.len())?;
        logs.extend(created);
    }

    if let Some(actor) = actor {
        group.stamp(actor, now);
        tx.save_group(&group).await?;
        info!(
            group_id,
            user_id = actor.user_id,
            username = %actor.username,
            "Transfer group stamped"
        );
    }

    Ok(GroupReport { group, logs })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Container, NewContent, Substance};
    use crate::transfer::store::{MemoryStore, TransferStore};
    use crate::volume::Unit;

    struct Fixture {
        ml: Unit,
        a: Container,
        b: Container,
        cyt: Substance,
        bor: Substance,
    }

    async fn fixture(tx: &mut dyn StoreTx) -> Fixture {
        let ml = tx.insert_unit("ml", "Millilitres", 1.0).await.unwrap();
        let kind = tx.insert_kind("Tube", 1.0, ml.id).await.unwrap();
        let a = tx.insert_container("TubeA", kind.id).await.unwrap();
        let b = tx.insert_container("TubeB", kind.id).await.unwrap();
        let cyt = tx.insert_substance("Cytarabine").await.unwrap();
        let bor = tx.insert_substance("Bortezomib").await.unwrap();
        Fixture {
            ml,
            a,
            b,
            cyt,
            bor,
        }
    }

    async fn put(tx: &mut dyn StoreTx, f: &Fixture, c: &Container, s: &Substance, q: f64) {
        tx.insert_content(&NewContent {
            container_id: c.id,
            substance_id: s.id,
            concentration: 25.0,
            quantity: q,
            unit_id: f.ml.id,
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_plan_logs_start_at_offset() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let f = fixture(tx.as_mut()).await;
        put(tx.as_mut(), &f, &f.a, &f.cyt, 0.5).await;
        put(tx.as_mut(), &f, &f.a, &f.bor, 0.2).await;
        let group = tx.insert_group().await.unwrap();
        let plan = tx.insert_plan(group.id, f.a.id, f.b.id, 0).await.unwrap();

        let logs = execute_plan(tx.as_mut(), &plan, 5).await.unwrap();
        let orders: Vec<_> = logs.iter().map(|l| l.order).collect();
        assert_eq!(orders, vec![5, 6]);
        assert!(tx.contents(f.a.id).await.unwrap().is_empty());
        assert_eq!(tx.contents(f.b.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_plan_same_container_rejected() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let f = fixture(tx.as_mut()).await;
        put(tx.as_mut(), &f, &f.a, &f.cyt, 0.5).await;
        let plan = TransferPlan {
            id: 0,
            group_id: 0,
            container_a: f.a.id,
            container_b: f.a.id,
            order: 0,
        };

        let err = execute_plan(tx.as_mut(), &plan, 0).await.unwrap_err();
        assert_eq!(err, TransferError::SameContainer);
        assert_eq!(tx.contents(f.a.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_plan_missing_container() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let f = fixture(tx.as_mut()).await;
        let plan = TransferPlan {
            id: 0,
            group_id: 0,
            container_a: f.a.id,
            container_b: 9999,
            order: 0,
        };

        let err = execute_plan(tx.as_mut(), &plan, 0).await.unwrap_err();
        assert_eq!(err, TransferError::ContainerNotFound(9999));
    }

    #[tokio::test]
    async fn test_empty_source_moves_nothing() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let f = fixture(tx.as_mut()).await;
        let group = tx.insert_group().await.unwrap();
        tx.insert_plan(group.id, f.a.id, f.b.id, 0).await.unwrap();

        let report = execute_group(tx.as_mut(), group.id, None, Utc::now())
            .await
            .unwrap();
        assert!(report.logs.is_empty());
        assert!(!report.group.is_stamped());
    }

    #[tokio::test]
    async fn test_group_stamped_only_for_actor() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let f = fixture(tx.as_mut()).await;
        put(tx.as_mut(), &f, &f.a, &f.cyt, 0.5).await;
        let group = tx.insert_group().await.unwrap();
        tx.insert_plan(group.id, f.a.id, f.b.id, 0).await.unwrap();

        let now = Utc::now();
        let actor = Actor::new(42, "tmp");
        let report = execute_group(tx.as_mut(), group.id, Some(&actor), now)
            .await
            .unwrap();
        assert_eq!(report.group.executed_by, Some(42));
        assert_eq!(report.group.execution_date, Some(now));
        assert_eq!(tx.group(group.id).await.unwrap(), Some(report.group));

        // a second run of the same group is refused
        let err = execute_group(tx.as_mut(), group.id, None, now)
            .await
            .unwrap_err();
        assert_eq!(err, TransferError::AlreadyExecuted(group.id));
    }

    #[test]
    fn test_advance_order_overflow() {
        assert_eq!(advance_order(3, 2), Ok(5));
        assert!(matches!(
            advance_order(PlanOrder::MAX, 1),
            Err(TransferError::SystemError(_))
        ));
        assert!(matches!(
            advance_order(0, usize::MAX),
            Err(TransferError::SystemError(_))
        ));
    }

    #[tokio::test]
    async fn test_plan_starting_near_max_order_fails() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let f = fixture(tx.as_mut()).await;
        put(tx.as_mut(), &f, &f.a, &f.cyt, 0.5).await;
        put(tx.as_mut(), &f, &f.a, &f.bor, 0.2).await;
        let group = tx.insert_group().await.unwrap();
        let plan = tx.insert_plan(group.id, f.a.id, f.b.id, 0).await.unwrap();

        let err = execute_plan(tx.as_mut(), &plan, PlanOrder::MAX)
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::SystemError(_)));
    }

    #[tokio::test]
    async fn test_unknown_group() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let err = execute_group(tx.as_mut(), 77, None, Utc::now())
            .await
            .unwrap_err();
        assert_eq!(err, TransferError::GroupNotFound(77));
    }
}
