//! Transfer Core Types
//!
//! Groups, plans and the audit log rows they produce.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core_types::{ContainerId, GroupId, LogId, PlanId, PlanOrder, UserId};
use crate::models::{ContainerRef, ContainerState, Substance};
use crate::volume::Volume;

/// An authenticated principal executing transfers.
///
/// Anonymous callers are represented by `None` wherever an
/// `Option<&Actor>` is taken.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub username: String,
}

impl Actor {
    pub fn new(user_id: UserId, username: &str) -> Self {
        Self {
            user_id,
            username: username.to_string(),
        }
    }
}

/// A batch of plans executed as one unit of work.
///
/// Stamped with actor and time once, on successful execution by an
/// authenticated actor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferGroup {
    pub id: GroupId,
    pub execution_date: Option<DateTime<Utc>>,
    pub executed_by: Option<UserId>,
}

impl TransferGroup {
    pub fn new(id: GroupId) -> Self {
        Self {
            id,
            execution_date: None,
            executed_by: None,
        }
    }

    #[inline]
    pub fn is_stamped(&self) -> bool {
        self.execution_date.is_some() || self.executed_by.is_some()
    }

    /// Record who executed the group and when
    pub fn stamp(&mut self, actor: &Actor, now: DateTime<Utc>) {
        self.executed_by = Some(actor.user_id);
        self.execution_date = Some(now);
    }
}

/// "Transfer everything from A to B", at position `order` in its group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferPlan {
    pub id: PlanId,
    pub group_id: GroupId,
    pub container_a: ContainerId,
    pub container_b: ContainerId,
    pub order: PlanOrder,
}

/// Immutable record of one substance moved from A to B
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferLog {
    pub id: LogId,
    pub group_id: GroupId,
    pub order: PlanOrder,
    pub container_a: ContainerRef,
    pub container_b: ContainerRef,
    pub substance: Substance,
    /// The amount moved, not the destination total
    pub volume: Volume,
}

impl fmt::Display for TransferLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Transfer of {} of {} from {} to {}",
            self.volume, self.substance, self.container_a, self.container_b
        )
    }
}

/// Fields for a log row that has not been inserted yet
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransferLog {
    pub group_id: GroupId,
    pub order: PlanOrder,
    pub container_a: ContainerRef,
    pub container_b: ContainerRef,
    pub substance: Substance,
    pub volume: Volume,
}

/// Result of executing a whole group
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupReport {
    pub group: TransferGroup,
    /// Every log produced, ascending by order
    pub logs: Vec<TransferLog>,
}

/// Result of an immediate two-container transfer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferOutcome {
    pub origin: ContainerState,
    pub destination: ContainerState,
    pub group: TransferGroup,
    pub logs: Vec<TransferLog>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::Unit;

    #[test]
    fn test_stamp() {
        let mut group = TransferGroup::new(7);
        assert!(!group.is_stamped());

        let now = Utc::now();
        group.stamp(&Actor::new(3, "tmp"), now);
        assert!(group.is_stamped());
        assert_eq!(group.executed_by, Some(3));
        assert_eq!(group.execution_date, Some(now));
    }

    fn sample_log() -> TransferLog {
        TransferLog {
            id: 1,
            group_id: 1,
            order: 0,
            container_a: ContainerRef {
                id: 1,
                name: "TubeA".into(),
            },
            container_b: ContainerRef {
                id: 2,
                name: "TubeB".into(),
            },
            substance: Substance {
                id: 1,
                name: "Cytarabine".into(),
            },
            volume: Volume::new(0.5, Unit::new(1, "ml", "Millilitres", 1.0)),
        }
    }

    #[test]
    fn test_log_display() {
        let log = sample_log();
        assert_eq!(
            log.to_string(),
            "Transfer of 0.5 ml of Cytarabine from TubeA to TubeB"
        );
    }

    #[test]
    fn test_group_report_json() {
        let report = GroupReport {
            group: TransferGroup::new(1),
            logs: vec![sample_log()],
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["group"]["executed_by"], serde_json::Value::Null);
        assert_eq!(json["logs"][0]["order"], 0);
        assert_eq!(json["logs"][0]["container_b"]["name"], "TubeB");
        assert_eq!(json["logs"][0]["volume"]["unit"]["short_name"], "ml");

        let log: TransferLog = serde_json::from_value(json["logs"][0].clone()).unwrap();
        assert_eq!(log, sample_log());
    }
}
