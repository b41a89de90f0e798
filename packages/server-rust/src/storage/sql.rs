//! Renders [`QueryPlan`]s, [`CountQuery`]s and row writes as `PostgreSQL`.
//!
//! Pure string building with positional (`$n`) parameters; no database
//! access happens here. Identifiers are always double-quoted. The base table
//! is aliased `t`, tables inside semi-joins are aliased `r1`, `r2`, ...
//!
//! Timestamp columns are exchanged as epoch milliseconds: selected through
//! `EXTRACT(EPOCH ...)` and bound through `to_timestamp(...)`, so the rest of
//! the engine only ever sees `i64`s.

use std::fmt::Write as _;

use keyset_core::{Column, CountQuery, Predicate, QueryPlan, Row, Value, ValueKind};

const BASE_ALIAS: &str = "t";

/// A statement plus its positional parameters. `params[i]` binds `$i+1`.
///
/// `params` never contains [`Value::Null`]; nulls are rendered inline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlStatement {
    pub sql: String,
    pub params: Vec<Value>,
}

/// Quotes an identifier, doubling embedded quotes.
#[must_use]
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

#[derive(Default)]
struct Writer {
    sql: String,
    params: Vec<Value>,
    depth: usize,
}

impl Writer {
    fn push(&mut self, s: &str) {
        self.sql.push_str(s);
    }

    /// Appends a placeholder for `value`, or `NULL` inline.
    fn value(&mut self, value: &Value) {
        if *value == Value::Null {
            self.push("NULL");
            return;
        }
        self.params.push(value.clone());
        let n = self.params.len();
        match value {
            Value::Timestamp(_) => {
                let _ = write!(self.sql, "to_timestamp(${n}::BIGINT / 1000.0)");
            }
            _ => {
                let _ = write!(self.sql, "${n}");
            }
        }
    }

    fn column(&mut self, alias: &str, column: &str) {
        let _ = write!(self.sql, "{alias}.{}", quote_ident(column));
    }

    fn predicate(&mut self, predicate: &Predicate, alias: &str) {
        match predicate {
            Predicate::True => self.push("TRUE"),
            Predicate::Compare { column, op, value } => {
                self.column(alias, column);
                let _ = write!(self.sql, " {} ", op.as_sql());
                self.value(value);
            }
            Predicate::In { values, .. } if values.is_empty() => self.push("FALSE"),
            Predicate::In { column, values } => {
                self.column(alias, column);
                self.push(" IN (");
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        self.push(", ");
                    }
                    self.value(v);
                }
                self.push(")");
            }
            Predicate::IsNull { column, negated } => {
                self.column(alias, column);
                self.push(if *negated { " IS NOT NULL" } else { " IS NULL" });
            }
            Predicate::And(parts) => self.joined(parts, " AND ", "TRUE", alias),
            Predicate::Or(parts) => self.joined(parts, " OR ", "FALSE", alias),
            Predicate::Related {
                table,
                local,
                foreign,
                filter,
            } => {
                self.depth += 1;
                let inner = format!("r{}", self.depth);
                let _ = write!(
                    self.sql,
                    "EXISTS (SELECT 1 FROM {} {inner} WHERE ",
                    quote_ident(table)
                );
                self.column(&inner, foreign);
                self.push(" = ");
                self.column(alias, local);
                if **filter != Predicate::True {
                    self.push(" AND ");
                    self.predicate(filter, &inner);
                }
                self.push(")");
            }
        }
    }

    fn joined(&mut self, parts: &[Predicate], sep: &str, empty: &str, alias: &str) {
        if parts.is_empty() {
            self.push(empty);
            return;
        }
        self.push("(");
        for (i, p) in parts.iter().enumerate() {
            if i > 0 {
                self.push(sep);
            }
            self.predicate(p, alias);
        }
        self.push(")");
    }

    fn where_clause(&mut self, filter: &Predicate) {
        if *filter != Predicate::True {
            self.push(" WHERE ");
            self.predicate(filter, BASE_ALIAS);
        }
    }

    fn finish(self) -> SqlStatement {
        SqlStatement {
            sql: self.sql,
            params: self.params,
        }
    }
}

fn select_list(columns: &[Column]) -> String {
    columns
        .iter()
        .map(|c| {
            let ident = quote_ident(c.name);
            match c.kind {
                ValueKind::Timestamp => {
                    format!("(EXTRACT(EPOCH FROM {BASE_ALIAS}.{ident}) * 1000)::BIGINT AS {ident}")
                }
                _ => format!("{BASE_ALIAS}.{ident}"),
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// `SELECT cols FROM table t WHERE filter ORDER BY ... LIMIT n`.
///
/// Only the plan's declared columns are selected; callers must not pass a
/// plan with an empty column list.
#[must_use]
pub fn render_page(plan: &QueryPlan) -> SqlStatement {
    let mut w = Writer::default();
    let _ = write!(
        w.sql,
        "SELECT {} FROM {} {BASE_ALIAS}",
        select_list(plan.columns),
        quote_ident(plan.table)
    );
    w.where_clause(&plan.filter);

    if !plan.order_by.is_empty() {
        w.push(" ORDER BY ");
        for (i, o) in plan.order_by.iter().enumerate() {
            if i > 0 {
                w.push(", ");
            }
            w.column(BASE_ALIAS, o.column);
            let _ = write!(w.sql, " {}", o.direction.as_sql());
        }
    }
    let _ = write!(w.sql, " LIMIT {}", plan.limit);
    w.finish()
}

/// `SELECT COUNT(*)`, or `COUNT(DISTINCT col)` when the query asks for it.
#[must_use]
pub fn render_count(query: &CountQuery) -> SqlStatement {
    let mut w = Writer::default();
    let counted = match query.distinct_on {
        Some(column) => format!("DISTINCT {BASE_ALIAS}.{}", quote_ident(column)),
        None => "*".to_string(),
    };
    let _ = write!(
        w.sql,
        "SELECT COUNT({counted}) FROM {} {BASE_ALIAS}",
        quote_ident(query.table)
    );
    w.where_clause(&query.filter);
    w.finish()
}

/// `INSERT ... ON CONFLICT (key) DO UPDATE` setting every non-key column of
/// `row`. Columns absent from `row` keep their stored values.
#[must_use]
pub fn render_upsert(table: &str, key_column: &str, row: &Row) -> SqlStatement {
    let mut w = Writer::default();
    let names: Vec<String> = row.iter().map(|(c, _)| quote_ident(c)).collect();
    let _ = write!(
        w.sql,
        "INSERT INTO {} ({}) VALUES (",
        quote_ident(table),
        names.join(", ")
    );
    for (i, (_, v)) in row.iter().enumerate() {
        if i > 0 {
            w.push(", ");
        }
        w.value(v);
    }

    let updates: Vec<String> = row
        .iter()
        .filter(|(c, _)| *c != key_column)
        .map(|(c, _)| {
            let ident = quote_ident(c);
            format!("{ident} = EXCLUDED.{ident}")
        })
        .collect();
    let _ = write!(w.sql, ") ON CONFLICT ({}) DO ", quote_ident(key_column));
    if updates.is_empty() {
        w.push("NOTHING");
    } else {
        let _ = write!(w.sql, "UPDATE SET {}", updates.join(", "));
    }
    w.finish()
}

/// `UPDATE table SET col = $1, ... WHERE key = $n` for every non-key column
/// of `row`. `None` when `row` carries nothing but the key.
#[must_use]
pub fn render_update(table: &str, key_column: &str, row: &Row) -> Option<SqlStatement> {
    let key = row.get(key_column)?;
    let mut w = Writer::default();
    let _ = write!(w.sql, "UPDATE {} SET ", quote_ident(table));
    let mut first = true;
    for (column, value) in row.iter().filter(|(c, _)| *c != key_column) {
        if !first {
            w.push(", ");
        }
        first = false;
        let _ = write!(w.sql, "{} = ", quote_ident(column));
        w.value(value);
    }
    if first {
        return None;
    }
    let _ = write!(w.sql, " WHERE {} = ", quote_ident(key_column));
    w.value(key);
    Some(w.finish())
}

/// `DELETE FROM table WHERE key = $1`.
#[must_use]
pub fn render_delete(table: &str, key_column: &str, key: &Value) -> SqlStatement {
    let mut w = Writer::default();
    let _ = write!(
        w.sql,
        "DELETE FROM {} WHERE {} = ",
        quote_ident(table),
        quote_ident(key_column)
    );
    w.value(key);
    w.finish()
}

#[cfg(test)]
mod tests {
    use keyset_core::{
        plan_count, plan_page, BaseFilter, Collection, CompareOp, NormalizedRequest,
        PageDirection, SortDirection, SortKey, SortKeyDescriptor,
    };

    use super::*;

    const COLUMNS: &[Column] = &[
        Column::new("grant_id", ValueKind::Bytes),
        Column::new("set_at", ValueKind::Timestamp),
    ];

    fn privileges() -> Collection {
        Collection {
            name: "privileges",
            table: "privileges",
            columns: COLUMNS,
            descriptor: SortKeyDescriptor::timestamp_and_bytes(
                "set_at",
                "grant_id",
                SortDirection::Desc,
            ),
        }
    }

    fn key() -> SortKey {
        SortKey::new(vec![Value::Timestamp(1_000), Value::Bytes(vec![0xab])])
    }

    #[test]
    fn forward_page_renders_lexicographic_bound() {
        let request = NormalizedRequest {
            limit: 10,
            direction: PageDirection::Forward,
            after: Some(key()),
            before: None,
        };
        let base = BaseFilter::new(Predicate::equals("token_id", 7));
        let stmt = render_page(&plan_page(&privileges(), &base, &request));

        assert_eq!(
            stmt.sql,
            "SELECT t.\"grant_id\", (EXTRACT(EPOCH FROM t.\"set_at\") * 1000)::BIGINT AS \"set_at\" \
             FROM \"privileges\" t \
             WHERE (t.\"token_id\" = $1 AND (t.\"set_at\" < to_timestamp($2::BIGINT / 1000.0) \
             OR (t.\"set_at\" = to_timestamp($3::BIGINT / 1000.0) AND t.\"grant_id\" < $4))) \
             ORDER BY t.\"set_at\" DESC, t.\"grant_id\" DESC LIMIT 11"
        );
        assert_eq!(
            stmt.params,
            vec![
                Value::Int(7),
                Value::Timestamp(1_000),
                Value::Timestamp(1_000),
                Value::Bytes(vec![0xab]),
            ]
        );
    }

    #[test]
    fn backward_page_reverses_order_and_operators() {
        let request = NormalizedRequest {
            limit: 2,
            direction: PageDirection::Backward,
            after: None,
            before: Some(key()),
        };
        let stmt = render_page(&plan_page(&privileges(), &BaseFilter::none(), &request));
        assert!(stmt.sql.contains("t.\"set_at\" > to_timestamp($1::BIGINT / 1000.0)"));
        assert!(stmt.sql.contains("t.\"grant_id\" > $3"));
        assert!(stmt.sql.ends_with("ORDER BY t.\"set_at\" ASC, t.\"grant_id\" ASC LIMIT 3"));
    }

    #[test]
    fn unfiltered_page_has_no_where_clause() {
        let request = NormalizedRequest {
            limit: 1,
            direction: PageDirection::Forward,
            after: None,
            before: None,
        };
        let stmt = render_page(&plan_page(&privileges(), &BaseFilter::none(), &request));
        assert!(!stmt.sql.contains("WHERE"));
        assert!(stmt.params.is_empty());
    }

    #[test]
    fn distinct_count_over_semi_join() {
        let collection = Collection {
            name: "vehicles",
            table: "vehicles",
            columns: &[],
            descriptor: SortKeyDescriptor::scalar("id", SortDirection::Desc),
        };
        let filter = Predicate::related(
            "privileges",
            "id",
            "token_id",
            Predicate::all(vec![
                Predicate::equals("grantee", vec![1u8]),
                Predicate::compare("expires_at", CompareOp::Gt, Value::Timestamp(5)),
            ]),
        );
        let stmt = render_count(&plan_count(&collection, &BaseFilter::new(filter).distinct()));
        assert_eq!(
            stmt.sql,
            "SELECT COUNT(DISTINCT t.\"id\") FROM \"vehicles\" t WHERE \
             EXISTS (SELECT 1 FROM \"privileges\" r1 WHERE r1.\"token_id\" = t.\"id\" AND \
             (r1.\"grantee\" = $1 AND r1.\"expires_at\" > to_timestamp($2::BIGINT / 1000.0)))"
        );
    }

    #[test]
    fn empty_disjunctions_and_in_lists_match_nothing() {
        let count = CountQuery {
            table: "x",
            filter: Predicate::And(vec![
                Predicate::Or(vec![]),
                Predicate::is_in("id", vec![]),
                Predicate::And(vec![]),
            ]),
            distinct_on: None,
        };
        assert_eq!(
            render_count(&count).sql,
            "SELECT COUNT(*) FROM \"x\" t WHERE (FALSE AND FALSE AND TRUE)"
        );
    }

    #[test]
    fn nulls_render_inline() {
        let stmt = render_delete("x", "id", &Value::Null);
        assert_eq!(stmt.sql, "DELETE FROM \"x\" WHERE \"id\" = NULL");
        assert!(stmt.params.is_empty());
    }

    #[test]
    fn upsert_updates_only_supplied_columns() {
        let row = Row::new().with("id", 3).with("owner", vec![9u8]);
        let stmt = render_upsert("vehicles", "id", &row);
        assert_eq!(
            stmt.sql,
            "INSERT INTO \"vehicles\" (\"id\", \"owner\") VALUES ($1, $2) \
             ON CONFLICT (\"id\") DO UPDATE SET \"owner\" = EXCLUDED.\"owner\""
        );

        let stmt = render_upsert("vehicles", "id", &Row::new().with("id", 3));
        assert!(stmt.sql.ends_with("DO NOTHING"));
    }

    #[test]
    fn update_sets_supplied_columns_by_key() {
        let row = Row::new()
            .with("id", 3)
            .with("vehicle_id", Value::Null)
            .with("withdrawn_at", Value::Timestamp(4_000));
        let stmt = render_update("stakes", "id", &row).unwrap();
        assert_eq!(
            stmt.sql,
            "UPDATE \"stakes\" SET \"vehicle_id\" = NULL, \
             \"withdrawn_at\" = to_timestamp($1::BIGINT / 1000.0) WHERE \"id\" = $2"
        );
        assert_eq!(stmt.params, vec![Value::Timestamp(4_000), Value::Int(3)]);

        assert!(render_update("stakes", "id", &Row::new().with("id", 3)).is_none());
        assert!(render_update("stakes", "id", &Row::new().with("owner", 1)).is_none());
    }

    #[test]
    fn identifiers_are_quoted() {
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }
}
