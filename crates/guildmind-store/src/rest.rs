use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Method, StatusCode};
use serde_json::Value;

use crate::error::StoreError;
use crate::query::{Filter, Op, Query};
use crate::{retry, StoreBackend};

/// PostgREST-speaking backend (Supabase REST surface).
pub struct RestBackend {
    client: reqwest::Client,
    base_url: String,
}

impl RestBackend {
    pub fn new(base_url: String, service_key: String) -> Result<Self, StoreError> {
        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bearer {service_key}"))
            .map_err(|e| StoreError::Validation(e.to_string()))?;
        let apikey = HeaderValue::from_str(&service_key)
            .map_err(|e| StoreError::Validation(e.to_string()))?;
        headers.insert("Authorization", auth);
        headers.insert("apikey", apikey);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    async fn send(
        &self,
        method: Method,
        q: &Query,
        prefer: Option<&str>,
        body: Option<&Value>,
    ) -> Result<(StatusCode, Option<u64>, Vec<Value>), StoreError> {
        let mut req = self
            .client
            .request(method, self.endpoint(&q.table))
            .query(&query_params(q));

        if let Some(p) = prefer {
            req = req.header("Prefer", p);
        }
        if let Some(b) = body {
            req = req.json(b);
        }

        let resp = req.send().await?;
        let status = resp.status();
        let affected = content_range_total(resp.headers());

        if status.as_u16() == 429 || status.is_server_error() {
            let text = resp.text().await.unwrap_or_default();
            return Err(StoreError::Transient(format!("{status}: {text}")));
        }
        if status.is_client_error() {
            let text = resp.text().await.unwrap_or_default();
            return Err(StoreError::Validation(format!("{status}: {text}")));
        }

        let rows = if status == StatusCode::NO_CONTENT {
            Vec::new()
        } else {
            let text = resp.text().await.unwrap_or_default();
            if text.trim().is_empty() {
                Vec::new()
            } else {
                serde_json::from_str(&text)?
            }
        };

        Ok((status, affected, rows))
    }
}

#[async_trait::async_trait]
impl StoreBackend for RestBackend {
    async fn select(&self, q: &Query) -> Result<Vec<Value>, StoreError> {
        retry::with_backoff("rest.select", || async {
            let (_, _, rows) = self.send(Method::GET, q, None, None).await?;
            Ok(rows)
        })
        .await
    }

    async fn write(&self, q: &Query) -> Result<u64, StoreError> {
        retry::with_backoff("rest.write", || async {
            match q.op {
                Op::Insert => {
                    let body = Value::Array(q.rows.clone());
                    self.send(Method::POST, q, Some("return=minimal"), Some(&body))
                        .await?;
                    Ok(q.rows.len() as u64)
                }
                Op::Upsert => {
                    let body = Value::Array(q.rows.clone());
                    self.send(
                        Method::POST,
                        q,
                        Some("resolution=merge-duplicates,return=minimal"),
                        Some(&body),
                    )
                    .await?;
                    Ok(q.rows.len() as u64)
                }
                Op::Update => {
                    let patch = q.patch.clone().unwrap_or(Value::Null);
                    let (_, affected, rows) = self
                        .send(
                            Method::PATCH,
                            q,
                            Some("return=representation,count=exact"),
                            Some(&patch),
                        )
                        .await?;
                    Ok(affected.unwrap_or(rows.len() as u64))
                }
                Op::Delete => {
                    let (_, affected, rows) = self
                        .send(
                            Method::DELETE,
                            q,
                            Some("return=representation,count=exact"),
                            None,
                        )
                        .await?;
                    Ok(affected.unwrap_or(rows.len() as u64))
                }
                Op::Select => Err(StoreError::Validation(
                    "select passed to write path".into(),
                )),
            }
        })
        .await
    }
}

fn query_params(q: &Query) -> Vec<(String, String)> {
    let mut params = Vec::new();

    if q.op == Op::Select {
        params.push(("select".to_string(), q.columns.clone()));
    }
    if let Some(ref oc) = q.on_conflict {
        params.push(("on_conflict".to_string(), oc.clone()));
    }

    for f in &q.filters {
        match f {
            Filter::Or(terms) => {
                let inner: Vec<String> = terms.iter().filter_map(render_or_term).collect();
                params.push(("or".to_string(), format!("({})", inner.join(","))));
            }
            other => {
                if let Some((col, expr)) = render_filter(other) {
                    params.push((col, expr));
                }
            }
        }
    }

    if let Some((ref col, asc)) = q.order {
        let dir = if asc { "asc" } else { "desc" };
        params.push(("order".to_string(), format!("{col}.{dir}")));
    }
    if let Some(limit) = q.limit {
        params.push(("limit".to_string(), limit.to_string()));
    }
    if q.offset > 0 {
        params.push(("offset".to_string(), q.offset.to_string()));
    }

    params
}

fn render_filter(f: &Filter) -> Option<(String, String)> {
    match f {
        Filter::Eq(c, v) => Some((c.clone(), format!("eq.{}", lit(v)))),
        Filter::Neq(c, v) => Some((c.clone(), format!("neq.{}", lit(v)))),
        Filter::Gte(c, v) => Some((c.clone(), format!("gte.{}", lit(v)))),
        Filter::Lt(c, v) => Some((c.clone(), format!("lt.{}", lit(v)))),
        Filter::In(c, vs) => {
            let joined: Vec<String> = vs.iter().map(lit).collect();
            Some((c.clone(), format!("in.({})", joined.join(","))))
        }
        // PostgREST wildcards are `*`, the port API uses `%`.
        Filter::Ilike(c, p) => Some((c.clone(), format!("ilike.{}", p.replace('%', "*")))),
        Filter::Or(_) => None,
    }
}

fn render_or_term(f: &Filter) -> Option<String> {
    render_filter(f).map(|(col, expr)| format!("{col}.{expr}"))
}

fn lit(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

/// `Content-Range: 0-24/3573` → 3573 affected/total rows.
fn content_range_total(headers: &HeaderMap) -> Option<u64> {
    let raw = headers.get("content-range")?.to_str().ok()?;
    let total = raw.rsplit('/').next()?;
    total.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Query;
    use serde_json::json;

    fn select_query() -> Query {
        Query {
            table: "messages".into(),
            op: Op::Select,
            columns: "message_id,content".into(),
            filters: vec![
                Filter::Eq("channel_id".into(), json!("123")),
                Filter::Gte("created_at".into(), json!("2025-03-10T07:00:00Z")),
                Filter::Ilike("content".into(), "%controlnet%".into()),
            ],
            order: Some(("created_at".into(), true)),
            limit: Some(100),
            offset: 0,
            rows: vec![],
            patch: None,
            on_conflict: None,
        }
    }

    #[test]
    fn renders_postgrest_filter_params() {
        let params = query_params(&select_query());
        assert!(params.contains(&("channel_id".into(), "eq.123".into())));
        assert!(params.contains(&("created_at".into(), "gte.2025-03-10T07:00:00Z".into())));
        assert!(params.contains(&("content".into(), "ilike.*controlnet*".into())));
        assert!(params.contains(&("order".into(), "created_at.asc".into())));
        assert!(params.contains(&("limit".into(), "100".into())));
    }

    #[test]
    fn renders_or_groups() {
        let mut q = select_query();
        q.filters = vec![Filter::Or(vec![
            Filter::Eq("channel_id".into(), json!("1")),
            Filter::Eq("category_id".into(), json!("2")),
        ])];
        let params = query_params(&q);
        assert!(params.contains(&("or".into(), "(channel_id.eq.1,category_id.eq.2)".into())));
    }

    #[test]
    fn parses_content_range_total() {
        let mut headers = HeaderMap::new();
        headers.insert("content-range", HeaderValue::from_static("0-24/3573"));
        assert_eq!(content_range_total(&headers), Some(3573));
    }
}
