//! In-memory [`PageStore`] and [`RowSink`] backed by [`DashMap`].
//!
//! Each table is a vector of rows guarded by its own `DashMap` shard.
//! Queries take a point-in-time snapshot of the tables they touch and then
//! filter, sort and truncate without holding any lock. Suitable for
//! development, tests, and replaying an event file at startup.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use async_trait::async_trait;
use dashmap::DashMap;
use keyset_core::{CountQuery, OrderBy, Predicate, QueryPlan, Row, Value};

use crate::traits::{PageStore, RowSink};

/// Table name to snapshot of its rows.
type Snapshots = HashMap<&'static str, Vec<Row>>;

/// In-memory relational store.
pub struct MemoryStore {
    tables: DashMap<&'static str, Vec<Row>>,
    query_calls: AtomicU64,
    count_calls: AtomicU64,
}

impl MemoryStore {
    /// Creates a new, empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tables: DashMap::new(),
            query_calls: AtomicU64::new(0),
            count_calls: AtomicU64::new(0),
        }
    }

    /// Appends a row without key deduplication.
    ///
    /// Used for join-shaped tables where the same entity id appears on
    /// several rows.
    pub fn append(&self, table: &'static str, row: Row) {
        self.tables.entry(table).or_default().push(row);
    }

    /// Number of rows currently stored in `table`.
    #[must_use]
    pub fn len(&self, table: &str) -> usize {
        self.tables.get(table).map_or(0, |rows| rows.len())
    }

    /// Returns `true` if `table` holds no rows.
    #[must_use]
    pub fn is_empty(&self, table: &str) -> bool {
        self.len(table) == 0
    }

    /// Number of [`PageStore::query`] calls served so far.
    #[must_use]
    pub fn query_calls(&self) -> u64 {
        self.query_calls.load(AtomicOrdering::Relaxed)
    }

    /// Number of [`PageStore::count`] calls served so far.
    #[must_use]
    pub fn count_calls(&self) -> u64 {
        self.count_calls.load(AtomicOrdering::Relaxed)
    }

    fn snapshot(&self, table: &'static str, filter: &Predicate) -> (Vec<Row>, Snapshots) {
        let rows = self
            .tables
            .get(table)
            .map(|rows| rows.clone())
            .unwrap_or_default();
        let mut related = HashMap::new();
        self.collect_related(filter, &mut related);
        (rows, related)
    }

    fn collect_related(&self, predicate: &Predicate, out: &mut Snapshots) {
        match predicate {
            Predicate::And(parts) | Predicate::Or(parts) => {
                for p in parts {
                    self.collect_related(p, out);
                }
            }
            Predicate::Related { table, filter, .. } => {
                if !out.contains_key(table) {
                    let rows = self
                        .tables
                        .get(table)
                        .map(|rows| rows.clone())
                        .unwrap_or_default();
                    out.insert(table, rows);
                }
                self.collect_related(filter, out);
            }
            Predicate::True
            | Predicate::Compare { .. }
            | Predicate::In { .. }
            | Predicate::IsNull { .. } => {}
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn column<'a>(row: &'a Row, name: &str) -> &'a Value {
    row.get(name).unwrap_or(&Value::Null)
}

/// Evaluates `predicate` against `row` with SQL-like NULL handling:
/// comparisons involving NULL, or values of different kinds, are false.
fn matches(predicate: &Predicate, row: &Row, related: &Snapshots) -> bool {
    match predicate {
        Predicate::True => true,
        Predicate::Compare { column: name, op, value } => {
            let lhs = column(row, name);
            if *lhs == Value::Null || *value == Value::Null || lhs.kind() != value.kind() {
                return false;
            }
            op.holds(lhs.cmp(value))
        }
        Predicate::In { column: name, values } => {
            let lhs = column(row, name);
            *lhs != Value::Null && values.contains(lhs)
        }
        Predicate::IsNull { column: name, negated } => {
            (*column(row, name) == Value::Null) != *negated
        }
        Predicate::And(parts) => parts.iter().all(|p| matches(p, row, related)),
        Predicate::Or(parts) => parts.iter().any(|p| matches(p, row, related)),
        Predicate::Related {
            table,
            local,
            foreign,
            filter,
        } => {
            let key = column(row, local);
            if *key == Value::Null {
                return false;
            }
            related.get(table).is_some_and(|rows| {
                rows.iter()
                    .any(|r| column(r, foreign) == key && matches(filter, r, related))
            })
        }
    }
}

fn compare_rows(a: &Row, b: &Row, order_by: &[OrderBy]) -> Ordering {
    order_by
        .iter()
        .map(|o| o.direction.apply(column(a, o.column).cmp(column(b, o.column))))
        .find(|o| o.is_ne())
        .unwrap_or(Ordering::Equal)
}

#[async_trait]
impl PageStore for MemoryStore {
    async fn query(&self, plan: &QueryPlan) -> anyhow::Result<Vec<Row>> {
        self.query_calls.fetch_add(1, AtomicOrdering::Relaxed);
        let (rows, related) = self.snapshot(plan.table, &plan.filter);

        let mut hits: Vec<Row> = rows
            .into_iter()
            .filter(|row| matches(&plan.filter, row, &related))
            .collect();
        hits.sort_by(|a, b| compare_rows(a, b, &plan.order_by));
        hits.truncate(plan.limit);
        Ok(hits)
    }

    async fn count(&self, query: &CountQuery) -> anyhow::Result<u64> {
        self.count_calls.fetch_add(1, AtomicOrdering::Relaxed);
        let (rows, related) = self.snapshot(query.table, &query.filter);

        let hits = rows
            .iter()
            .filter(|row| matches(&query.filter, row, &related));
        let total = match query.distinct_on {
            Some(name) => hits
                .map(|row| column(row, name))
                .filter(|v| **v != Value::Null)
                .collect::<HashSet<_>>()
                .len(),
            None => hits.count(),
        };
        Ok(total as u64)
    }
}

fn key_of(action: &str, table: &str, key_column: &str, row: &Row) -> anyhow::Result<Value> {
    row.get(key_column)
        .cloned()
        .filter(|v| *v != Value::Null)
        .ok_or_else(|| anyhow::anyhow!("{action} {table} without `{key_column}`"))
}

#[async_trait]
impl RowSink for MemoryStore {
    async fn upsert(
        &self,
        table: &'static str,
        key_column: &'static str,
        row: Row,
    ) -> anyhow::Result<()> {
        let key = key_of("upsert into", table, key_column, &row)?;
        let mut rows = self.tables.entry(table).or_default();
        match rows.iter_mut().find(|r| r.get(key_column) == Some(&key)) {
            Some(existing) => existing.merge(row),
            None => rows.push(row),
        }
        Ok(())
    }

    async fn update(
        &self,
        table: &'static str,
        key_column: &'static str,
        row: Row,
    ) -> anyhow::Result<bool> {
        let key = key_of("update of", table, key_column, &row)?;
        let Some(mut rows) = self.tables.get_mut(table) else {
            return Ok(false);
        };
        match rows.iter_mut().find(|r| r.get(key_column) == Some(&key)) {
            Some(existing) => {
                existing.merge(row);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(
        &self,
        table: &'static str,
        key_column: &'static str,
        key: Value,
    ) -> anyhow::Result<()> {
        if let Some(mut rows) = self.tables.get_mut(table) {
            rows.retain(|r| r.get(key_column) != Some(&key));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use keyset_core::{CompareOp, SortDirection};

    use super::*;

    fn plan(filter: Predicate, limit: usize) -> QueryPlan {
        QueryPlan {
            table: "things",
            columns: &[],
            filter,
            order_by: vec![OrderBy {
                column: "id",
                direction: SortDirection::Desc,
            }],
            limit,
        }
    }

    async fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        for (id, owner) in [(1, 0xa), (2, 0xb), (3, 0xa), (4, 0xa)] {
            store
                .upsert("things", "id", Row::new().with("id", id).with("owner", vec![owner]))
                .await
                .unwrap();
        }
        store
    }

    fn ids(rows: &[Row]) -> Vec<i64> {
        rows.iter().map(|r| r.int("id").unwrap()).collect()
    }

    #[tokio::test]
    async fn query_filters_orders_and_limits() {
        let store = seeded().await;
        let rows = store
            .query(&plan(Predicate::equals("owner", vec![0xau8]), 2))
            .await
            .unwrap();
        assert_eq!(ids(&rows), vec![4, 3]);
        assert_eq!(store.query_calls(), 1);
    }

    #[tokio::test]
    async fn comparisons_against_null_or_other_kinds_are_false() {
        let store = seeded().await;
        store
            .upsert("things", "id", Row::new().with("id", 5).with("owner", Value::Null))
            .await
            .unwrap();

        let rows = store
            .query(&plan(Predicate::compare("owner", CompareOp::Ne, vec![0xau8]), 10))
            .await
            .unwrap();
        assert_eq!(ids(&rows), vec![2]);

        let rows = store
            .query(&plan(Predicate::compare("id", CompareOp::Gt, "text"), 10))
            .await
            .unwrap();
        assert!(rows.is_empty());

        let rows = store.query(&plan(Predicate::is_null("owner"), 10)).await.unwrap();
        assert_eq!(ids(&rows), vec![5]);
    }

    #[tokio::test]
    async fn upsert_merges_columns_of_existing_rows() {
        let store = seeded().await;
        store
            .upsert("things", "id", Row::new().with("id", 2).with("owner", vec![0xcu8]))
            .await
            .unwrap();
        assert_eq!(store.len("things"), 4);

        let rows = store
            .query(&plan(Predicate::equals("id", 2), 10))
            .await
            .unwrap();
        assert_eq!(rows[0].bytes("owner").unwrap(), vec![0xc]);
    }

    #[tokio::test]
    async fn update_touches_existing_rows_only() {
        let store = seeded().await;
        let changed = store
            .update("things", "id", Row::new().with("id", 2).with("owner", vec![0xcu8]))
            .await
            .unwrap();
        assert!(changed);

        let missing = store
            .update("things", "id", Row::new().with("id", 9).with("owner", vec![0xcu8]))
            .await
            .unwrap();
        assert!(!missing);
        let untouched = store
            .update("nothing", "id", Row::new().with("id", 2))
            .await
            .unwrap();
        assert!(!untouched);
        assert_eq!(store.len("things"), 4);
        assert!(store.is_empty("nothing"));

        let rows = store
            .query(&plan(Predicate::equals("owner", vec![0xcu8]), 10))
            .await
            .unwrap();
        assert_eq!(ids(&rows), vec![2]);
    }

    #[tokio::test]
    async fn upsert_without_key_is_rejected() {
        let store = MemoryStore::new();
        let err = store
            .upsert("things", "id", Row::new().with("owner", vec![1u8]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("without `id`"));
    }

    #[tokio::test]
    async fn delete_removes_matching_row() {
        let store = seeded().await;
        store.delete("things", "id", Value::Int(3)).await.unwrap();
        store.delete("missing", "id", Value::Int(3)).await.unwrap();
        assert_eq!(store.len("things"), 3);
    }

    #[tokio::test]
    async fn related_predicate_is_a_semi_join() {
        let store = seeded().await;
        for (thing, tag) in [(1, "x"), (1, "y"), (3, "x")] {
            store.append("tags", Row::new().with("thing_id", thing).with("tag", tag));
        }

        let filter = Predicate::related("tags", "id", "thing_id", Predicate::equals("tag", "x"));
        let rows = store.query(&plan(filter, 10)).await.unwrap();
        assert_eq!(ids(&rows), vec![3, 1]);
    }

    #[tokio::test]
    async fn count_can_be_distinct() {
        let store = MemoryStore::new();
        // one row per (vehicle, grantee): vehicle 1 appears twice
        for (vehicle, grantee) in [(1, 0xa), (1, 0xb), (2, 0xa)] {
            store.append(
                "access",
                Row::new().with("id", vehicle).with("grantee", vec![grantee]),
            );
        }

        let plain = CountQuery {
            table: "access",
            filter: Predicate::True,
            distinct_on: None,
        };
        assert_eq!(store.count(&plain).await.unwrap(), 3);

        let distinct = CountQuery {
            distinct_on: Some("id"),
            ..plain
        };
        assert_eq!(store.count(&distinct).await.unwrap(), 2);
        assert_eq!(store.count_calls(), 2);
    }

    #[tokio::test]
    async fn unknown_table_is_empty() {
        let store = MemoryStore::new();
        assert!(store.query(&plan(Predicate::True, 10)).await.unwrap().is_empty());
        assert!(store.is_empty("things"));
    }
}
