use async_trait::async_trait;
use keyset_core::{CountQuery, QueryPlan, Row, Value};

/// Read side of a relational store, as consumed by the paginator.
/// Implementations: in-memory (dev, tests), `PostgreSQL` (`postgres` feature).
///
/// Connection lifecycle, migrations and transaction boundaries belong to the
/// implementation. The two calls are independent and may observe different
/// snapshots.
#[async_trait]
pub trait PageStore: Send + Sync {
    /// Run a windowed page query. Rows come back in `plan.order_by` order,
    /// at most `plan.limit` of them.
    async fn query(&self, plan: &QueryPlan) -> anyhow::Result<Vec<Row>>;

    /// Count rows matching `query.filter`, distinct on `query.distinct_on`
    /// when set.
    async fn count(&self, query: &CountQuery) -> anyhow::Result<u64>;
}

/// Write side used by event handlers to keep list tables current.
#[async_trait]
pub trait RowSink: Send + Sync {
    /// Insert a complete `row`, or overwrite the columns it carries on the
    /// existing row whose `key_column` equals the new row's value.
    async fn upsert(&self, table: &'static str, key_column: &'static str, row: Row)
        -> anyhow::Result<()>;

    /// Set the columns `row` carries on the existing row with the same
    /// `key_column` value. Never inserts. Returns `false` when no row has
    /// that key.
    async fn update(&self, table: &'static str, key_column: &'static str, row: Row)
        -> anyhow::Result<bool>;

    /// Delete the row whose `key_column` equals `key`. Missing rows are not
    /// an error.
    async fn delete(&self, table: &'static str, key_column: &'static str, key: Value)
        -> anyhow::Result<()>;
}
