//! PostgreSQL table layout for [`PgStore`](super::PgStore)
//!
//! `init_schema` is idempotent (`CREATE TABLE IF NOT EXISTS`) and only
//! bootstraps an empty database for development and tests. Evolving an
//! existing schema is the operator's job.

use sqlx::PgPool;
use tracing::info;

use crate::transfer::error::TransferError;

/// Create all tables if they are missing
pub async fn init_schema(pool: &PgPool) -> Result<(), TransferError> {
    info!("Initializing transfer schema...");

    for (table, ddl) in TABLES {
        sqlx::query(ddl).execute(pool).await.map_err(|e| {
            TransferError::DatabaseError(format!("Failed to create {}: {}", table, e))
        })?;
    }

    info!(tables = TABLES.len(), "Transfer schema ready");
    Ok(())
}

/// Creation order matters: referenced tables first
pub const TABLES: [(&str, &str); 8] = [
    ("units_tb", CREATE_UNITS_TABLE),
    ("container_kinds_tb", CREATE_CONTAINER_KINDS_TABLE),
    ("containers_tb", CREATE_CONTAINERS_TABLE),
    ("substances_tb", CREATE_SUBSTANCES_TABLE),
    ("contents_tb", CREATE_CONTENTS_TABLE),
    ("transfer_groups_tb", CREATE_TRANSFER_GROUPS_TABLE),
    ("transfer_plans_tb", CREATE_TRANSFER_PLANS_TABLE),
    ("transfer_logs_tb", CREATE_TRANSFER_LOGS_TABLE),
];

pub const CREATE_UNITS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS units_tb (
    id          BIGSERIAL PRIMARY KEY,
    short_name  VARCHAR(5) NOT NULL,
    long_name   VARCHAR(30) NOT NULL UNIQUE,
    to_ml       DOUBLE PRECISION NOT NULL CHECK (to_ml > 0)
)
"#;

pub const CREATE_CONTAINER_KINDS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS container_kinds_tb (
    id        BIGSERIAL PRIMARY KEY,
    name      VARCHAR(100) NOT NULL UNIQUE,
    quantity  DOUBLE PRECISION NOT NULL CHECK (quantity >= 0),
    unit_id   BIGINT NOT NULL REFERENCES units_tb(id) ON DELETE RESTRICT
)
"#;

pub const CREATE_CONTAINERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS containers_tb (
    id       BIGSERIAL PRIMARY KEY,
    name     VARCHAR(100) NOT NULL UNIQUE,
    kind_id  BIGINT NOT NULL REFERENCES container_kinds_tb(id) ON DELETE RESTRICT
)
"#;

pub const CREATE_SUBSTANCES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS substances_tb (
    id    BIGSERIAL PRIMARY KEY,
    name  VARCHAR(100) NOT NULL UNIQUE
)
"#;

pub const CREATE_CONTENTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS contents_tb (
    id             BIGSERIAL PRIMARY KEY,
    substance_id   BIGINT NOT NULL REFERENCES substances_tb(id) ON DELETE RESTRICT,
    container_id   BIGINT NOT NULL REFERENCES containers_tb(id) ON DELETE CASCADE,
    concentration  DOUBLE PRECISION NOT NULL,
    quantity       DOUBLE PRECISION NOT NULL,
    unit_id        BIGINT NOT NULL REFERENCES units_tb(id) ON DELETE RESTRICT,
    UNIQUE (substance_id, container_id)
)
"#;

pub const CREATE_TRANSFER_GROUPS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS transfer_groups_tb (
    id              BIGSERIAL PRIMARY KEY,
    execution_date  TIMESTAMPTZ NULL,
    executed_by     BIGINT NULL
)
"#;

pub const CREATE_TRANSFER_PLANS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS transfer_plans_tb (
    id                 BIGSERIAL PRIMARY KEY,
    transfer_group_id  BIGINT NOT NULL REFERENCES transfer_groups_tb(id) ON DELETE CASCADE,
    container_a_id     BIGINT NOT NULL REFERENCES containers_tb(id),
    container_b_id     BIGINT NOT NULL REFERENCES containers_tb(id),
    order_no           INTEGER NOT NULL DEFAULT 0,
    UNIQUE (container_a_id, container_b_id, transfer_group_id),
    UNIQUE (transfer_group_id, order_no)
)
"#;

pub const CREATE_TRANSFER_LOGS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS transfer_logs_tb (
    id                 BIGSERIAL PRIMARY KEY,
    transfer_group_id  BIGINT NOT NULL REFERENCES transfer_groups_tb(id) ON DELETE RESTRICT,
    container_a_id     BIGINT NOT NULL REFERENCES containers_tb(id),
    container_b_id     BIGINT NOT NULL REFERENCES containers_tb(id),
    order_no           INTEGER NOT NULL,
    substance_id       BIGINT NOT NULL REFERENCES substances_tb(id),
    quantity           DOUBLE PRECISION NOT NULL,
    unit_id            BIGINT NOT NULL REFERENCES units_tb(id) ON DELETE RESTRICT,
    UNIQUE (container_a_id, container_b_id, transfer_group_id, substance_id),
    UNIQUE (transfer_group_id, order_no)
)
"#;
