use std::sync::{Arc, Mutex};

use rusqlite::types::Value as SqlValue;
use rusqlite::Connection;
use serde_json::{Map, Number, Value};

use crate::error::StoreError;
use crate::query::{Filter, Op, Query};
use crate::schema::{self, BOOL_COLUMNS, JSON_COLUMNS};
use crate::StoreBackend;

/// Local file-backed backend. rusqlite is synchronous, so every query runs
/// on the blocking pool behind a shared connection.
pub struct SqliteBackend {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteBackend {
    pub async fn open(path: &str) -> Result<Self, StoreError> {
        let path = path.to_string();
        let conn = tokio::task::spawn_blocking(move || -> Result<Connection, StoreError> {
            let conn = if path == ":memory:" {
                Connection::open_in_memory()?
            } else {
                Connection::open(&path)?
            };
            schema::init_db(&conn)?;
            Ok(conn)
        })
        .await
        .map_err(|e| StoreError::Sql(e.to_string()))??;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn run<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().map_err(|_| {
                StoreError::Sql("store connection poisoned".to_string())
            })?;
            f(&guard)
        })
        .await
        .map_err(|e| StoreError::Sql(e.to_string()))?
    }
}

#[async_trait::async_trait]
impl StoreBackend for SqliteBackend {
    async fn select(&self, q: &Query) -> Result<Vec<Value>, StoreError> {
        let q = q.clone();
        self.run(move |conn| select_rows(conn, &q)).await
    }

    async fn write(&self, q: &Query) -> Result<u64, StoreError> {
        let q = q.clone();
        self.run(move |conn| match q.op {
            Op::Insert | Op::Upsert => write_rows(conn, &q),
            Op::Update => update_rows(conn, &q),
            Op::Delete => delete_rows(conn, &q),
            Op::Select => Err(StoreError::Validation("select passed to write path".into())),
        })
        .await
    }
}

fn select_rows(conn: &Connection, q: &Query) -> Result<Vec<Value>, StoreError> {
    let (where_sql, params) = render_filters(&q.filters);
    let mut sql = format!("SELECT {} FROM {}", q.columns, q.table);
    if !where_sql.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&where_sql);
    }
    if let Some((ref col, asc)) = q.order {
        sql.push_str(&format!(
            " ORDER BY {col} {}",
            if asc { "ASC" } else { "DESC" }
        ));
    }
    if let Some(limit) = q.limit {
        sql.push_str(&format!(" LIMIT {limit} OFFSET {}", q.offset));
    }

    let mut stmt = conn.prepare(&sql)?;
    let column_names: Vec<String> = stmt
        .column_names()
        .into_iter()
        .map(String::from)
        .collect();

    let mut rows = stmt.query(rusqlite::params_from_iter(params))?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut obj = Map::new();
        for (i, name) in column_names.iter().enumerate() {
            obj.insert(name.clone(), column_to_json(row, i, name)?);
        }
        out.push(Value::Object(obj));
    }
    Ok(out)
}

fn write_rows(conn: &Connection, q: &Query) -> Result<u64, StoreError> {
    let mut written = 0u64;
    for row in &q.rows {
        let obj = row
            .as_object()
            .ok_or_else(|| StoreError::Validation("row must be a JSON object".into()))?;
        let cols: Vec<&String> = obj.keys().collect();
        let placeholders: Vec<String> = (1..=cols.len()).map(|i| format!("?{i}")).collect();

        let mut sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            q.table,
            cols.iter()
                .map(|c| c.as_str())
                .collect::<Vec<_>>()
                .join(", "),
            placeholders.join(", "),
        );

        if q.op == Op::Upsert {
            let keys: Vec<&str> = q
                .on_conflict
                .as_deref()
                .unwrap_or("")
                .split(',')
                .map(str::trim)
                .collect();
            let updates: Vec<String> = cols
                .iter()
                .filter(|c| !keys.contains(&c.as_str()))
                .map(|c| format!("{c} = excluded.{c}"))
                .collect();
            if updates.is_empty() {
                sql.push_str(&format!(" ON CONFLICT({}) DO NOTHING", keys.join(", ")));
            } else {
                sql.push_str(&format!(
                    " ON CONFLICT({}) DO UPDATE SET {}",
                    keys.join(", "),
                    updates.join(", ")
                ));
            }
        }

        let params: Vec<SqlValue> = obj.values().map(json_to_sql).collect();
        written += conn.execute(&sql, rusqlite::params_from_iter(params))? as u64;
    }
    Ok(written)
}

fn update_rows(conn: &Connection, q: &Query) -> Result<u64, StoreError> {
    let patch = q
        .patch
        .as_ref()
        .and_then(Value::as_object)
        .ok_or_else(|| StoreError::Validation("update patch must be a JSON object".into()))?;

    let mut params: Vec<SqlValue> = Vec::new();
    let sets: Vec<String> = patch
        .iter()
        .map(|(k, v)| {
            params.push(json_to_sql(v));
            format!("{k} = ?{}", params.len())
        })
        .collect();

    let (where_sql, where_params) = render_filters_offset(&q.filters, params.len());
    params.extend(where_params);

    let mut sql = format!("UPDATE {} SET {}", q.table, sets.join(", "));
    if !where_sql.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&where_sql);
    }
    Ok(conn.execute(&sql, rusqlite::params_from_iter(params))? as u64)
}

fn delete_rows(conn: &Connection, q: &Query) -> Result<u64, StoreError> {
    let (where_sql, params) = render_filters(&q.filters);
    let mut sql = format!("DELETE FROM {}", q.table);
    if !where_sql.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&where_sql);
    }
    Ok(conn.execute(&sql, rusqlite::params_from_iter(params))? as u64)
}

fn render_filters(filters: &[Filter]) -> (String, Vec<SqlValue>) {
    render_filters_offset(filters, 0)
}

fn render_filters_offset(filters: &[Filter], param_offset: usize) -> (String, Vec<SqlValue>) {
    let mut params = Vec::new();
    let terms: Vec<String> = filters
        .iter()
        .map(|f| render_filter(f, &mut params, param_offset))
        .collect();
    (terms.join(" AND "), params)
}

fn bind(params: &mut Vec<SqlValue>, offset: usize, v: &Value) -> String {
    params.push(json_to_sql(v));
    format!("?{}", offset + params.len())
}

fn render_filter(f: &Filter, params: &mut Vec<SqlValue>, offset: usize) -> String {
    match f {
        Filter::Eq(c, v) => format!("{c} = {}", bind(params, offset, v)),
        Filter::Neq(c, v) => format!("{c} != {}", bind(params, offset, v)),
        Filter::Gte(c, v) => format!("{c} >= {}", bind(params, offset, v)),
        Filter::Lt(c, v) => format!("{c} < {}", bind(params, offset, v)),
        Filter::In(c, vs) => {
            let ps: Vec<String> = vs.iter().map(|v| bind(params, offset, v)).collect();
            format!("{c} IN ({})", ps.join(", "))
        }
        Filter::Ilike(c, p) => {
            let ph = bind(params, offset, &Value::String(p.clone()));
            format!("LOWER({c}) LIKE LOWER({ph})")
        }
        Filter::Or(terms) => {
            let inner: Vec<String> = terms
                .iter()
                .map(|t| render_filter(t, params, offset))
                .collect();
            format!("({})", inner.join(" OR "))
        }
    }
}

fn json_to_sql(v: &Value) -> SqlValue {
    match v {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(*b as i64),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                SqlValue::Integer(i)
            } else if let Some(u) = n.as_u64() {
                SqlValue::Integer(u as i64)
            } else {
                SqlValue::Real(n.as_f64().unwrap_or(0.0))
            }
        }
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

fn column_to_json(
    row: &rusqlite::Row<'_>,
    idx: usize,
    name: &str,
) -> Result<Value, StoreError> {
    use rusqlite::types::ValueRef;
    let v = match row.get_ref(idx)? {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => {
            if BOOL_COLUMNS.contains(&name) {
                Value::Bool(i != 0)
            } else {
                Value::Number(Number::from(i))
            }
        }
        ValueRef::Real(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        ValueRef::Text(t) => {
            let s = String::from_utf8_lossy(t).to_string();
            if JSON_COLUMNS.contains(&name) {
                serde_json::from_str(&s).unwrap_or(Value::String(s))
            } else {
                Value::String(s)
            }
        }
        ValueRef::Blob(_) => Value::Null,
    };
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::TableQuery;
    use serde_json::json;

    async fn backend() -> SqliteBackend {
        SqliteBackend::open(":memory:").await.unwrap()
    }

    fn msg_row(id: u64, channel: u64, content: &str) -> Value {
        json!({
            "message_id": id,
            "channel_id": channel,
            "author_id": 1,
            "content": content,
            "created_at": "2025-03-10T08:00:00Z",
            "attachments": "[]",
            "reactors": "[]",
            "indexed_at": "2025-03-10T08:00:01Z",
        })
    }

    #[tokio::test]
    async fn upsert_is_idempotent() {
        let b = backend().await;
        let rows = vec![msg_row(1, 10, "hello")];
        TableQuery::new(&b, "messages")
            .upsert(rows.clone(), "message_id")
            .await
            .unwrap();
        TableQuery::new(&b, "messages")
            .upsert(rows, "message_id")
            .await
            .unwrap();

        let out = TableQuery::new(&b, "messages").fetch().await.unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0]["content"], "hello");
    }

    #[tokio::test]
    async fn partial_upsert_keeps_unmentioned_columns() {
        let b = backend().await;
        TableQuery::new(&b, "members")
            .upsert(
                vec![json!({"member_id": 5, "username": "a", "sharing_consent": true})],
                "member_id",
            )
            .await
            .unwrap();
        // Identity-only refresh must not clobber the stored preference.
        TableQuery::new(&b, "members")
            .upsert(vec![json!({"member_id": 5, "username": "b"})], "member_id")
            .await
            .unwrap();

        let row = TableQuery::new(&b, "members")
            .eq("member_id", 5)
            .fetch_one()
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row["username"], "b");
        assert_eq!(row["sharing_consent"], json!(true));
    }

    #[tokio::test]
    async fn ilike_is_case_insensitive() {
        let b = backend().await;
        TableQuery::new(&b, "messages")
            .insert(vec![msg_row(1, 10, "New ControlNet shipped")])
            .await
            .unwrap();
        let out = TableQuery::new(&b, "messages")
            .ilike("content", "%controlnet%")
            .fetch()
            .await
            .unwrap();
        assert_eq!(out.len(), 1);
    }

    #[tokio::test]
    async fn or_filter_matches_either_branch() {
        let b = backend().await;
        TableQuery::new(&b, "channels")
            .insert(vec![
                json!({"channel_id": 1, "name": "general", "category_id": 7}),
                json!({"channel_id": 2, "name": "art", "category_id": 9}),
            ])
            .await
            .unwrap();
        let out = TableQuery::new(&b, "channels")
            .or(vec![
                Filter::Eq("channel_id".into(), json!(2)),
                Filter::Eq("category_id".into(), json!(7)),
            ])
            .fetch()
            .await
            .unwrap();
        assert_eq!(out.len(), 2);
    }

    #[tokio::test]
    async fn json_columns_come_back_as_values() {
        let b = backend().await;
        let mut row = msg_row(1, 10, "x");
        row["reactors"] = Value::String("[\"7\",\"42\"]".into());
        TableQuery::new(&b, "messages").insert(vec![row]).await.unwrap();

        let out = TableQuery::new(&b, "messages").fetch_one().await.unwrap().unwrap();
        assert_eq!(out["reactors"], json!(["7", "42"]));
        assert_eq!(out["is_deleted"], json!(false));
    }

    #[tokio::test]
    async fn update_with_filters() {
        let b = backend().await;
        TableQuery::new(&b, "messages")
            .insert(vec![msg_row(1, 10, "x")])
            .await
            .unwrap();
        let n = TableQuery::new(&b, "messages")
            .eq("message_id", 1)
            .update(json!({"is_deleted": true}))
            .await
            .unwrap();
        assert_eq!(n, 1);
        let row = TableQuery::new(&b, "messages").fetch_one().await.unwrap().unwrap();
        assert_eq!(row["is_deleted"], json!(true));
    }
}
