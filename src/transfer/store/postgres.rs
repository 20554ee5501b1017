//! PostgreSQL store
//!
//! Every transaction runs at SERIALIZABLE isolation and locks the container
//! rows it reads with `FOR UPDATE`, so the capacity check in a plan cannot
//! race a concurrent write to the same destination. Serialization failures
//! surface as `TransferError::Conflict` and are left to the caller to retry.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};

use super::{
    NAME_MAX, StoreTx, TransferStore, UNIT_LONG_NAME_MAX, UNIT_SHORT_NAME_MAX, validate_content,
    validate_name,
};
use crate::core_types::{ContainerId, ContentId, GroupId, KindId, PlanOrder, SubstanceId, UnitId};
use crate::models::{Container, ContainerKind, ContainerRef, Content, NewContent, Substance};
use crate::transfer::error::TransferError;
use crate::transfer::types::{NewTransferLog, TransferGroup, TransferLog, TransferPlan};
use crate::volume::{Unit, Volume};

/// PostgreSQL-backed [`TransferStore`]
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a new PgStore with the given connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TransferStore for PgStore {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn begin(&self) -> Result<Box<dyn StoreTx>, TransferError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await?;
        Ok(Box::new(PgTx { tx: Some(tx) }))
    }
}

/// An open PostgreSQL transaction
pub struct PgTx {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgTx {
    fn conn(&mut self) -> Result<&mut Transaction<'static, Postgres>, TransferError> {
        self.tx
            .as_mut()
            .ok_or_else(|| TransferError::SystemError("transaction already finished".to_string()))
    }
}

const SELECT_CONTAINER: &str = r#"
SELECT c.id, c.name,
       k.id AS kind_id, k.name AS kind_name, k.quantity AS kind_quantity,
       u.id AS unit_id, u.short_name, u.long_name, u.to_ml
FROM containers_tb c
JOIN container_kinds_tb k ON k.id = c.kind_id
JOIN units_tb u ON u.id = k.unit_id
WHERE c.id = $1
FOR UPDATE OF c
"#;

const SELECT_CONTENTS: &str = r#"
SELECT ct.id, ct.container_id, ct.concentration, ct.quantity,
       s.id AS substance_id, s.name AS substance_name,
       u.id AS unit_id, u.short_name, u.long_name, u.to_ml
FROM contents_tb ct
JOIN substances_tb s ON s.id = ct.substance_id
JOIN units_tb u ON u.id = ct.unit_id
"#;

const SELECT_LOGS: &str = r#"
SELECT l.id, l.transfer_group_id, l.order_no, l.quantity,
       a.id AS a_id, a.name AS a_name,
       b.id AS b_id, b.name AS b_name,
       s.id AS substance_id, s.name AS substance_name,
       u.id AS unit_id, u.short_name, u.long_name, u.to_ml
FROM transfer_logs_tb l
JOIN containers_tb a ON a.id = l.container_a_id
JOIN containers_tb b ON b.id = l.container_b_id
JOIN substances_tb s ON s.id = l.substance_id
JOIN units_tb u ON u.id = l.unit_id
"#;

fn row_to_unit(row: &PgRow) -> Unit {
    Unit {
        id: row.get("unit_id"),
        short_name: row.get("short_name"),
        long_name: row.get("long_name"),
        to_ml: row.get("to_ml"),
    }
}

fn row_to_container(row: &PgRow) -> Container {
    Container {
        id: row.get("id"),
        name: row.get("name"),
        kind: ContainerKind {
            id: row.get("kind_id"),
            name: row.get("kind_name"),
            capacity: Volume::new(row.get("kind_quantity"), row_to_unit(row)),
        },
    }
}

fn row_to_content(row: &PgRow) -> Content {
    Content {
        id: row.get("id"),
        substance: Substance {
            id: row.get("substance_id"),
            name: row.get("substance_name"),
        },
        container_id: row.get("container_id"),
        concentration: row.get("concentration"),
        volume: Volume::new(row.get("quantity"), row_to_unit(row)),
    }
}

fn row_to_log(row: &PgRow) -> TransferLog {
    TransferLog {
        id: row.get("id"),
        group_id: row.get("transfer_group_id"),
        order: row.get("order_no"),
        container_a: ContainerRef {
            id: row.get("a_id"),
            name: row.get("a_name"),
        },
        container_b: ContainerRef {
            id: row.get("b_id"),
            name: row.get("b_name"),
        },
        substance: Substance {
            id: row.get("substance_id"),
            name: row.get("substance_name"),
        },
        volume: Volume::new(row.get("quantity"), row_to_unit(row)),
    }
}

fn row_to_plan(row: &PgRow) -> TransferPlan {
    TransferPlan {
        id: row.get("id"),
        group_id: row.get("transfer_group_id"),
        container_a: row.get("container_a_id"),
        container_b: row.get("container_b_id"),
        order: row.get("order_no"),
    }
}

impl PgTx {
    async fn unit(&mut self, id: UnitId) -> Result<Unit, TransferError> {
        let row = sqlx::query(
            "SELECT id AS unit_id, short_name, long_name, to_ml FROM units_tb WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&mut **self.conn()?)
        .await?;
        row.as_ref()
            .map(row_to_unit)
            .ok_or(TransferError::UnitNotFound(id))
    }
}

#[async_trait]
impl StoreTx for PgTx {
    async fn insert_unit(
        &mut self,
        short_name: &str,
        long_name: &str,
        to_ml: f64,
    ) -> Result<Unit, TransferError> {
        validate_name("short_name", short_name, UNIT_SHORT_NAME_MAX)?;
        validate_name("long_name", long_name, UNIT_LONG_NAME_MAX)?;
        let mut unit = Unit::new(0, short_name, long_name, to_ml);
        unit.validate()?;

        unit.id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO units_tb (short_name, long_name, to_ml) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(short_name)
        .bind(long_name)
        .bind(to_ml)
        .fetch_one(&mut **self.conn()?)
        .await?;
        Ok(unit)
    }

    async fn insert_kind(
        &mut self,
        name: &str,
        quantity: f64,
        unit_id: UnitId,
    ) -> Result<ContainerKind, TransferError> {
        validate_name("name", name, NAME_MAX)?;
        let capacity = Volume::new(quantity, self.unit(unit_id).await?);
        capacity.validate()?;

        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO container_kinds_tb (name, quantity, unit_id) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(name)
        .bind(quantity)
        .bind(unit_id)
        .fetch_one(&mut **self.conn()?)
        .await?;
        Ok(ContainerKind {
            id,
            name: name.to_string(),
            capacity,
        })
    }

    async fn insert_container(
        &mut self,
        name: &str,
        kind_id: KindId,
    ) -> Result<Container, TransferError> {
        validate_name("name", name, NAME_MAX)?;
        let kind_exists = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM container_kinds_tb WHERE id = $1",
        )
        .bind(kind_id)
        .fetch_optional(&mut **self.conn()?)
        .await?;
        if kind_exists.is_none() {
            return Err(TransferError::KindNotFound(kind_id));
        }

        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO containers_tb (name, kind_id) VALUES ($1, $2) RETURNING id",
        )
        .bind(name)
        .bind(kind_id)
        .fetch_one(&mut **self.conn()?)
        .await?;
        self.container(id)
            .await?
            .ok_or(TransferError::ContainerNotFound(id))
    }

    async fn insert_substance(&mut self, name: &str) -> Result<Substance, TransferError> {
        validate_name("name", name, NAME_MAX)?;
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO substances_tb (name) VALUES ($1) RETURNING id",
        )
        .bind(name)
        .fetch_one(&mut **self.conn()?)
        .await?;
        Ok(Substance {
            id,
            name: name.to_string(),
        })
    }

    async fn insert_content(&mut self, new: &NewContent) -> Result<Content, TransferError> {
        let volume = Volume::new(new.quantity, self.unit(new.unit_id).await?);
        validate_content(new.concentration, &volume)?;
        if self.container(new.container_id).await?.is_none() {
            return Err(TransferError::ContainerNotFound(new.container_id));
        }
        let substance_exists = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM substances_tb WHERE id = $1",
        )
        .bind(new.substance_id)
        .fetch_optional(&mut **self.conn()?)
        .await?;
        if substance_exists.is_none() {
            return Err(TransferError::SubstanceNotFound(new.substance_id));
        }

        sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO contents_tb (substance_id, container_id, concentration, quantity, unit_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(new.substance_id)
        .bind(new.container_id)
        .bind(new.concentration)
        .bind(new.quantity)
        .bind(new.unit_id)
        .fetch_one(&mut **self.conn()?)
        .await?;

        self.content_for(new.container_id, new.substance_id)
            .await?
            .ok_or_else(|| TransferError::SystemError("inserted content vanished".to_string()))
    }

    async fn container(&mut self, id: ContainerId) -> Result<Option<Container>, TransferError> {
        let row = sqlx::query(SELECT_CONTAINER)
            .bind(id)
            .fetch_optional(&mut **self.conn()?)
            .await?;
        Ok(row.as_ref().map(row_to_container))
    }

    async fn contents(&mut self, container: ContainerId) -> Result<Vec<Content>, TransferError> {
        let sql = format!("{} WHERE ct.container_id = $1 ORDER BY ct.id", SELECT_CONTENTS);
        let rows = sqlx::query(&sql)
            .bind(container)
            .fetch_all(&mut **self.conn()?)
            .await?;
        Ok(rows.iter().map(row_to_content).collect())
    }

    async fn content_for(
        &mut self,
        container: ContainerId,
        substance: SubstanceId,
    ) -> Result<Option<Content>, TransferError> {
        let sql = format!(
            "{} WHERE ct.container_id = $1 AND ct.substance_id = $2",
            SELECT_CONTENTS
        );
        let row = sqlx::query(&sql)
            .bind(container)
            .bind(substance)
            .fetch_optional(&mut **self.conn()?)
            .await?;
        Ok(row.as_ref().map(row_to_content))
    }

    async fn group(&mut self, id: GroupId) -> Result<Option<TransferGroup>, TransferError> {
        let row = sqlx::query(
            "SELECT id, execution_date, executed_by FROM transfer_groups_tb WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut **self.conn()?)
        .await?;
        Ok(row.map(|r| TransferGroup {
            id: r.get("id"),
            execution_date: r.get("execution_date"),
            executed_by: r.get("executed_by"),
        }))
    }

    async fn plans(&mut self, group: GroupId) -> Result<Vec<TransferPlan>, TransferError> {
        let rows = sqlx::query(
            r#"
            SELECT id, transfer_group_id, container_a_id, container_b_id, order_no
            FROM transfer_plans_tb
            WHERE transfer_group_id = $1
            ORDER BY order_no ASC
            "#,
        )
        .bind(group)
        .fetch_all(&mut **self.conn()?)
        .await?;
        Ok(rows.iter().map(row_to_plan).collect())
    }

    async fn logs(&mut self, group: GroupId) -> Result<Vec<TransferLog>, TransferError> {
        let sql = format!(
            "{} WHERE l.transfer_group_id = $1 ORDER BY l.order_no ASC",
            SELECT_LOGS
        );
        let rows = sqlx::query(&sql)
            .bind(group)
            .fetch_all(&mut **self.conn()?)
            .await?;
        Ok(rows.iter().map(row_to_log).collect())
    }

    async fn save_content(&mut self, content: &Content) -> Result<(), TransferError> {
        validate_content(content.concentration, &content.volume)?;
        let result = sqlx::query(
            r#"
            UPDATE contents_tb
            SET container_id = $1, concentration = $2, quantity = $3, unit_id = $4
            WHERE id = $5
            "#,
        )
        .bind(content.container_id)
        .bind(content.concentration)
        .bind(content.volume.quantity)
        .bind(content.volume.unit.id)
        .bind(content.id)
        .execute(&mut **self.conn()?)
        .await?;

        if result.rows_affected() == 0 {
            return Err(TransferError::ContentNotFound(content.id));
        }
        Ok(())
    }

    async fn delete_content(&mut self, id: ContentId) -> Result<(), TransferError> {
        let result = sqlx::query("DELETE FROM contents_tb WHERE id = $1")
            .bind(id)
            .execute(&mut **self.conn()?)
            .await?;
        if result.rows_affected() == 0 {
            return Err(TransferError::ContentNotFound(id));
        }
        Ok(())
    }

    async fn insert_group(&mut self) -> Result<TransferGroup, TransferError> {
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO transfer_groups_tb (execution_date, executed_by) VALUES (NULL, NULL) RETURNING id",
        )
        .fetch_one(&mut **self.conn()?)
        .await?;
        Ok(TransferGroup::new(id))
    }

    async fn insert_plan(
        &mut self,
        group: GroupId,
        container_a: ContainerId,
        container_b: ContainerId,
        order: PlanOrder,
    ) -> Result<TransferPlan, TransferError> {
        if self.group(group).await?.is_none() {
            return Err(TransferError::GroupNotFound(group));
        }
        for id in [container_a, container_b] {
            if self.container(id).await?.is_none() {
                return Err(TransferError::ContainerNotFound(id));
            }
        }

        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO transfer_plans_tb (transfer_group_id, container_a_id, container_b_id, order_no)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(group)
        .bind(container_a)
        .bind(container_b)
        .bind(order)
        .fetch_one(&mut **self.conn()?)
        .await?;
        Ok(TransferPlan {
            id,
            group_id: group,
            container_a,
            container_b,
            order,
        })
    }

    async fn insert_log(&mut self, new: &NewTransferLog) -> Result<TransferLog, TransferError> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO transfer_logs_tb
                (transfer_group_id, container_a_id, container_b_id, order_no, substance_id, quantity, unit_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(new.group_id)
        .bind(new.container_a.id)
        .bind(new.container_b.id)
        .bind(new.order)
        .bind(new.substance.id)
        .bind(new.volume.quantity)
        .bind(new.volume.unit.id)
        .fetch_one(&mut **self.conn()?)
        .await?;
        Ok(TransferLog {
            id,
            group_id: new.group_id,
            order: new.order,
            container_a: new.container_a.clone(),
            container_b: new.container_b.clone(),
            substance: new.substance.clone(),
            volume: new.volume.clone(),
        })
    }

    async fn save_group(&mut self, group: &TransferGroup) -> Result<(), TransferError> {
        let result = sqlx::query(
            "UPDATE transfer_groups_tb SET execution_date = $1, executed_by = $2 WHERE id = $3",
        )
        .bind(group.execution_date)
        .bind(group.executed_by)
        .bind(group.id)
        .execute(&mut **self.conn()?)
        .await?;
        if result.rows_affected() == 0 {
            return Err(TransferError::GroupNotFound(group.id));
        }
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), TransferError> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| TransferError::SystemError("transaction already finished".to_string()))?;
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), TransferError> {
        if let Some(tx) = self.tx.take() {
            tx.rollback().await?;
        }
        Ok(())
    }
}
