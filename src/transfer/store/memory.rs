//! In-memory store
//!
//! The whole inventory sits behind one async mutex. A transaction holds the
//! owned guard for its lifetime, so transactions are fully serialized, and
//! it edits a private working copy that replaces the shared state only on
//! commit. Dropping a transaction without committing leaves the shared
//! state untouched.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{
    NAME_MAX, StoreTx, TransferStore, UNIT_LONG_NAME_MAX, UNIT_SHORT_NAME_MAX, validate_content,
    validate_name,
};
use crate::core_types::{
    ContainerId, ContentId, GroupId, KindId, LogId, PlanId, PlanOrder, SubstanceId, UnitId,
};
use crate::models::{Container, ContainerKind, Content, NewContent, Substance};
use crate::transfer::error::TransferError;
use crate::transfer::types::{NewTransferLog, TransferGroup, TransferLog, TransferPlan};
use crate::volume::{Unit, Volume};

#[derive(Debug, Clone)]
struct ContainerRow {
    id: ContainerId,
    name: String,
    kind_id: KindId,
}

/// Every table of the memory backend
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    units: BTreeMap<UnitId, Unit>,
    kinds: BTreeMap<KindId, ContainerKind>,
    containers: BTreeMap<ContainerId, ContainerRow>,
    substances: BTreeMap<SubstanceId, Substance>,
    contents: BTreeMap<ContentId, Content>,
    groups: BTreeMap<GroupId, TransferGroup>,
    plans: BTreeMap<PlanId, TransferPlan>,
    logs: BTreeMap<LogId, TransferLog>,
    last_id: i64,
}

impl Inventory {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }

    fn unit(&self, id: UnitId) -> Result<&Unit, TransferError> {
        self.units.get(&id).ok_or(TransferError::UnitNotFound(id))
    }

    fn load_container(&self, row: &ContainerRow) -> Result<Container, TransferError> {
        let kind = self
            .kinds
            .get(&row.kind_id)
            .ok_or(TransferError::KindNotFound(row.kind_id))?;
        Ok(Container {
            id: row.id,
            name: row.name.clone(),
            kind: kind.clone(),
        })
    }

    fn duplicate(what: &str) -> TransferError {
        TransferError::Duplicate(format!("duplicate {}", what))
    }

    /// Number of content rows across all containers
    pub fn content_count(&self) -> usize {
        self.contents.len()
    }

    /// Number of transfer groups, executed or not
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Number of log rows across all groups
    pub fn log_count(&self) -> usize {
        self.logs.len()
    }
}

/// Memory-backed [`TransferStore`]
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<Inventory>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clone of the committed state, for inspection in tests and tooling
    pub async fn snapshot(&self) -> Inventory {
        self.state.lock().await.clone()
    }
}

#[async_trait]
impl TransferStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn begin(&self) -> Result<Box<dyn StoreTx>, TransferError> {
        let guard = self.state.clone().lock_owned().await;
        let work = guard.clone();
        Ok(Box::new(MemoryTx {
            guard: Some(guard),
            work,
        }))
    }
}

/// An open memory transaction
pub struct MemoryTx {
    guard: Option<OwnedMutexGuard<Inventory>>,
    work: Inventory,
}

impl MemoryTx {
    fn ensure_open(&self) -> Result<(), TransferError> {
        if self.guard.is_some() {
            Ok(())
        } else {
            Err(TransferError::SystemError(
                "transaction already finished".to_string(),
            ))
        }
    }
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn insert_unit(
        &mut self,
        short_name: &str,
        long_name: &str,
        to_ml: f64,
    ) -> Result<Unit, TransferError> {
        self.ensure_open()?;
        validate_name("short_name", short_name, UNIT_SHORT_NAME_MAX)?;
        validate_name("long_name", long_name, UNIT_LONG_NAME_MAX)?;
        if self.work.units.values().any(|u| u.long_name == long_name) {
            return Err(Inventory::duplicate("unit long_name"));
        }
        let mut unit = Unit::new(0, short_name, long_name, to_ml);
        unit.validate()?;
        unit.id = self.work.next_id();
        self.work.units.insert(unit.id, unit.clone());
        Ok(unit)
    }

    async fn insert_kind(
        &mut self,
        name: &str,
        quantity: f64,
        unit_id: UnitId,
    ) -> Result<ContainerKind, TransferError> {
        self.ensure_open()?;
        validate_name("name", name, NAME_MAX)?;
        if self.work.kinds.values().any(|k| k.name == name) {
            return Err(Inventory::duplicate("container kind name"));
        }
        let capacity = Volume::new(quantity, self.work.unit(unit_id)?.clone());
        capacity.validate()?;
        let id = self.work.next_id();
        let kind = ContainerKind {
            id,
            name: name.to_string(),
            capacity,
        };
        self.work.kinds.insert(id, kind.clone());
        Ok(kind)
    }

    async fn insert_container(
        &mut self,
        name: &str,
        kind_id: KindId,
    ) -> Result<Container, TransferError> {
        self.ensure_open()?;
        validate_name("name", name, NAME_MAX)?;
        if self.work.containers.values().any(|c| c.name == name) {
            return Err(Inventory::duplicate("container name"));
        }
        let id = self.work.next_id();
        let row = ContainerRow {
            id,
            name: name.to_string(),
            kind_id,
        };
        let container = self.work.load_container(&row)?;
        self.work.containers.insert(id, row);
        Ok(container)
    }

    async fn insert_substance(&mut self, name: &str) -> Result<Substance, TransferError> {
        self.ensure_open()?;
        validate_name("name", name, NAME_MAX)?;
        if self.work.substances.values().any(|s| s.name == name) {
            return Err(Inventory::duplicate("substance name"));
        }
        let id = self.work.next_id();
        let substance = Substance {
            id,
            name: name.to_string(),
        };
        self.work.substances.insert(id, substance.clone());
        Ok(substance)
    }

    async fn insert_content(&mut self, new: &NewContent) -> Result<Content, TransferError> {
        self.ensure_open()?;
        if !self.work.containers.contains_key(&new.container_id) {
            return Err(TransferError::ContainerNotFound(new.container_id));
        }
        let substance = self
            .work
            .substances
            .get(&new.substance_id)
            .ok_or(TransferError::SubstanceNotFound(new.substance_id))?
            .clone();
        let volume = Volume::new(new.quantity, self.work.unit(new.unit_id)?.clone());
        validate_content(new.concentration, &volume)?;
        if self
            .work
            .contents
            .values()
            .any(|c| c.container_id == new.container_id && c.substance.id == new.substance_id)
        {
            return Err(Inventory::duplicate("content (substance, container)"));
        }
        let id = self.work.next_id();
        let content = Content {
            id,
            substance,
            container_id: new.container_id,
            concentration: new.concentration,
            volume,
        };
        self.work.contents.insert(id, content.clone());
        Ok(content)
    }

    async fn container(&mut self, id: ContainerId) -> Result<Option<Container>, TransferError> {
        self.ensure_open()?;
        match self.work.containers.get(&id) {
            Some(row) => Ok(Some(self.work.load_container(row)?)),
            None => Ok(None),
        }
    }

    async fn contents(&mut self, container: ContainerId) -> Result<Vec<Content>, TransferError> {
        self.ensure_open()?;
        Ok(self
            .work
            .contents
            .values()
            .filter(|c| c.container_id == container)
            .cloned()
            .collect())
    }

    async fn content_for(
        &mut self,
        container: ContainerId,
        substance: SubstanceId,
    ) -> Result<Option<Content>, TransferError> {
        self.ensure_open()?;
        Ok(self
            .work
            .contents
            .values()
            .find(|c| c.container_id == container && c.substance.id == substance)
            .cloned())
    }

    async fn group(&mut self, id: GroupId) -> Result<Option<TransferGroup>, TransferError> {
        self.ensure_open()?;
        Ok(self.work.groups.get(&id).cloned())
    }

    async fn plans(&mut self, group: GroupId) -> Result<Vec<TransferPlan>, TransferError> {
        self.ensure_open()?;
        let mut plans: Vec<TransferPlan> = self
            .work
            .plans
            .values()
            .filter(|p| p.group_id == group)
            .cloned()
            .collect();
        plans.sort_by_key(|p| p.order);
        Ok(plans)
    }

    async fn logs(&mut self, group: GroupId) -> Result<Vec<TransferLog>, TransferError> {
        self.ensure_open()?;
        let mut logs: Vec<TransferLog> = self
            .work
            .logs
            .values()
            .filter(|l| l.group_id == group)
            .cloned()
            .collect();
        logs.sort_by_key(|l| l.order);
        Ok(logs)
    }

    async fn save_content(&mut self, content: &Content) -> Result<(), TransferError> {
        self.ensure_open()?;
        validate_content(content.concentration, &content.volume)?;
        if !self.work.containers.contains_key(&content.container_id) {
            return Err(TransferError::ContainerNotFound(content.container_id));
        }
        if self.work.contents.values().any(|c| {
            c.id != content.id
                && c.container_id == content.container_id
                && c.substance.id == content.substance.id
        }) {
            return Err(Inventory::duplicate("content (substance, container)"));
        }
        match self.work.contents.get_mut(&content.id) {
            Some(row) => {
                *row = content.clone();
                Ok(())
            }
            None => Err(TransferError::ContentNotFound(content.id)),
        }
    }

    async fn delete_content(&mut self, id: ContentId) -> Result<(), TransferError> {
        self.ensure_open()?;
        self.work
            .contents
            .remove(&id)
            .map(|_| ())
            .ok_or(TransferError::ContentNotFound(id))
    }

    async fn insert_group(&mut self) -> Result<TransferGroup, TransferError> {
        self.ensure_open()?;
        let id = self.work.next_id();
        let group = TransferGroup::new(id);
        self.work.groups.insert(id, group.clone());
        Ok(group)
    }

    async fn insert_plan(
        &mut self,
        group: GroupId,
        container_a: ContainerId,
        container_b: ContainerId,
        order: PlanOrder,
    ) -> Result<TransferPlan, TransferError> {
        self.ensure_open()?;
        if !self.work.groups.contains_key(&group) {
            return Err(TransferError::GroupNotFound(group));
        }
        for id in [container_a, container_b] {
            if !self.work.containers.contains_key(&id) {
                return Err(TransferError::ContainerNotFound(id));
            }
        }
        let clash = self.work.plans.values().any(|p| {
            p.group_id == group
                && (p.order == order
                    || (p.container_a == container_a && p.container_b == container_b))
        });
        if clash {
            return Err(Inventory::duplicate("plan (group, order) or (A, B, group)"));
        }
        let id = self.work.next_id();
        let plan = TransferPlan {
            id,
            group_id: group,
            container_a,
            container_b,
            order,
        };
        self.work.plans.insert(id, plan.clone());
        Ok(plan)
    }

    async fn insert_log(&mut self, new: &NewTransferLog) -> Result<TransferLog, TransferError> {
        self.ensure_open()?;
        let clash = self.work.logs.values().any(|l| {
            l.group_id == new.group_id
                && (l.order == new.order
                    || (l.container_a.id == new.container_a.id
                        && l.container_b.id == new.container_b.id
                        && l.substance.id == new.substance.id))
        });
        if clash {
            return Err(Inventory::duplicate(
                "log (group, order) or (A, B, group, substance)",
            ));
        }
        let id = self.work.next_id();
        let log = TransferLog {
            id,
            group_id: new.group_id,
            order: new.order,
            container_a: new.container_a.clone(),
            container_b: new.container_b.clone(),
            substance: new.substance.clone(),
            volume: new.volume.clone(),
        };
        self.work.logs.insert(id, log.clone());
        Ok(log)
    }

    async fn save_group(&mut self, group: &TransferGroup) -> Result<(), TransferError> {
        self.ensure_open()?;
        match self.work.groups.get_mut(&group.id) {
            Some(row) => {
                *row = group.clone();
                Ok(())
            }
            None => Err(TransferError::GroupNotFound(group.id)),
        }
    }

    async fn commit(&mut self) -> Result<(), TransferError> {
        let mut guard = self.guard.take().ok_or_else(|| {
            TransferError::SystemError("transaction already finished".to_string())
        })?;
        *guard = std::mem::take(&mut self.work);
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), TransferError> {
        self.guard = None;
        self.work = Inventory::default();
        Ok(())
    }
}
