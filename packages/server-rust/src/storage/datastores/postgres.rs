//! `PostgreSQL` backend for [`PageStore`] and [`RowSink`].
//!
//! Statements come from [`crate::storage::sql`]; this module only binds
//! parameters and decodes rows. Rows are decoded by the kinds declared on the
//! plan's columns, so every `Int` column must be `BIGINT` and every
//! `Timestamp` column `TIMESTAMPTZ`.

use anyhow::Context;
use async_trait::async_trait;
use keyset_core::{Column, CountQuery, QueryPlan, Row, Value, ValueKind};
use sqlx::postgres::{PgArguments, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{PgPool, Postgres, Row as _};
use tracing::debug;

use crate::storage::sql::{
    render_count, render_delete, render_page, render_update, render_upsert, SqlStatement,
};
use crate::traits::{PageStore, RowSink};

/// Tables and sort-key indexes for every list the server exposes.
const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS vehicles (
        id BIGINT PRIMARY KEY,
        owner BYTEA NOT NULL,
        manufacturer_id BIGINT,
        make TEXT,
        model TEXT,
        year BIGINT,
        minted_at TIMESTAMPTZ NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS vehicles_owner_idx ON vehicles (owner, id DESC)",
    "CREATE TABLE IF NOT EXISTS aftermarket_devices (
        id BIGINT PRIMARY KEY,
        address BYTEA NOT NULL,
        owner BYTEA NOT NULL,
        manufacturer_id BIGINT,
        serial TEXT,
        vehicle_id BIGINT,
        minted_at TIMESTAMPTZ NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS aftermarket_devices_owner_idx ON aftermarket_devices (owner, id DESC)",
    "CREATE TABLE IF NOT EXISTS privileges (
        grant_id BYTEA PRIMARY KEY,
        token_id BIGINT NOT NULL,
        privilege_id BIGINT NOT NULL,
        grantee BYTEA NOT NULL,
        set_at TIMESTAMPTZ NOT NULL,
        expires_at TIMESTAMPTZ NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS privileges_token_idx ON privileges (token_id, set_at DESC, grant_id DESC)",
    "CREATE INDEX IF NOT EXISTS privileges_grantee_idx ON privileges (grantee, token_id)",
    "CREATE TABLE IF NOT EXISTS stakes (
        id BIGINT PRIMARY KEY,
        owner BYTEA NOT NULL,
        level BIGINT NOT NULL,
        amount TEXT NOT NULL,
        vehicle_id BIGINT,
        staked_at TIMESTAMPTZ NOT NULL,
        ends_at TIMESTAMPTZ NOT NULL,
        withdrawn_at TIMESTAMPTZ
    )",
    "CREATE INDEX IF NOT EXISTS stakes_owner_idx ON stakes (owner, id DESC)",
    "CREATE TABLE IF NOT EXISTS rewards (
        reward_id BYTEA PRIMARY KEY,
        recipient BYTEA NOT NULL,
        vehicle_id BIGINT NOT NULL,
        week BIGINT NOT NULL,
        amount TEXT NOT NULL,
        issued_at TIMESTAMPTZ NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS rewards_recipient_idx ON rewards (recipient, issued_at DESC, reward_id DESC)",
];

/// Connection settings for [`PostgresStore::connect`].
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub database_url: String,
    pub max_connections: u32,
}

impl PostgresConfig {
    #[must_use]
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: 10,
        }
    }
}

/// [`PageStore`] and [`RowSink`] over a `sqlx` connection pool.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Opens a pool against `config.database_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be reached.
    pub async fn connect(config: &PostgresConfig) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.database_url)
            .await
            .context("failed to connect to PostgreSQL")?;
        Ok(Self { pool })
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Creates the list tables and their indexes if they do not exist.
    ///
    /// # Errors
    ///
    /// Returns the first failing DDL statement's error.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .with_context(|| format!("schema statement failed: {statement}"))?;
        }
        Ok(())
    }
}

fn bind(statement: &SqlStatement) -> Query<'_, Postgres, PgArguments> {
    let mut query = sqlx::query(&statement.sql);
    for value in &statement.params {
        query = match value {
            Value::Int(v) | Value::Timestamp(v) => query.bind(*v),
            Value::Bool(v) => query.bind(*v),
            Value::Text(v) => query.bind(v.as_str()),
            Value::Bytes(v) => query.bind(v.as_slice()),
            Value::Null => query.bind(Option::<i64>::None),
        };
    }
    query
}

fn decode(row: &PgRow, columns: &[Column]) -> anyhow::Result<Row> {
    let mut out = Row::new();
    for column in columns {
        let name = column.name;
        let value = match column.kind {
            ValueKind::Int | ValueKind::Timestamp => {
                let v: Option<i64> = row.try_get(name)?;
                match (v, column.kind) {
                    (Some(v), ValueKind::Timestamp) => Value::Timestamp(v),
                    (v, _) => v.into(),
                }
            }
            ValueKind::Bool => row.try_get::<Option<bool>, _>(name)?.into(),
            ValueKind::Text => row.try_get::<Option<String>, _>(name)?.into(),
            ValueKind::Bytes => row.try_get::<Option<Vec<u8>>, _>(name)?.into(),
            ValueKind::Null => Value::Null,
        };
        out.insert(name, value);
    }
    Ok(out)
}

#[async_trait]
impl PageStore for PostgresStore {
    async fn query(&self, plan: &QueryPlan) -> anyhow::Result<Vec<Row>> {
        anyhow::ensure!(
            !plan.columns.is_empty(),
            "page query on {} declares no columns",
            plan.table
        );
        let statement = render_page(plan);
        debug!(sql = %statement.sql, params = statement.params.len(), "page query");

        let rows = bind(&statement)
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("page query on {} failed", plan.table))?;
        rows.iter().map(|r| decode(r, plan.columns)).collect()
    }

    async fn count(&self, query: &CountQuery) -> anyhow::Result<u64> {
        let statement = render_count(query);
        debug!(sql = %statement.sql, params = statement.params.len(), "count query");

        let row = bind(&statement)
            .fetch_one(&self.pool)
            .await
            .with_context(|| format!("count query on {} failed", query.table))?;
        let total: i64 = row.try_get(0)?;
        u64::try_from(total).context("negative count")
    }
}

#[async_trait]
impl RowSink for PostgresStore {
    async fn upsert(
        &self,
        table: &'static str,
        key_column: &'static str,
        row: Row,
    ) -> anyhow::Result<()> {
        let statement = render_upsert(table, key_column, &row);
        bind(&statement)
            .execute(&self.pool)
            .await
            .with_context(|| format!("upsert into {table} failed"))?;
        Ok(())
    }

    async fn update(
        &self,
        table: &'static str,
        key_column: &'static str,
        row: Row,
    ) -> anyhow::Result<bool> {
        let Some(statement) = render_update(table, key_column, &row) else {
            anyhow::ensure!(
                row.get(key_column).is_some(),
                "update of {table} without `{key_column}`"
            );
            return Ok(false);
        };
        let done = bind(&statement)
            .execute(&self.pool)
            .await
            .with_context(|| format!("update of {table} failed"))?;
        Ok(done.rows_affected() > 0)
    }

    async fn delete(
        &self,
        table: &'static str,
        key_column: &'static str,
        key: Value,
    ) -> anyhow::Result<()> {
        let statement = render_delete(table, key_column, &key);
        bind(&statement)
            .execute(&self.pool)
            .await
            .with_context(|| format!("delete from {table} failed"))?;
        Ok(())
    }
}
