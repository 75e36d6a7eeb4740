// Copyright 2022 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::any::{AnyPool, AnyPoolOptions, AnyRow};
use sqlx::pool::PoolConnection;
use sqlx::{Any, Column, Row};
use uuid::Uuid;

use crate::error::GraphStoreError;

/// A single node/edge property value or bound query parameter, independent of the wire
/// `fabric.v1.relational.QueryParam` oneof the proto reuses for this backend's properties.
#[derive(Clone, Debug)]
pub enum ScalarValue {
    Str(String),
    Int(i64),
    Double(f64),
    Bool(bool),
    Bytes(Vec<u8>),
}

pub type PropertyMap = HashMap<String, ScalarValue>;
pub type GraphRow = HashMap<String, ScalarValue>;

#[derive(Clone, Debug, Default)]
pub struct QueryOutcome {
    pub rows: Vec<GraphRow>,
    pub has_next: bool,
}

fn properties_to_json(properties: &PropertyMap) -> String {
    let as_json: HashMap<String, serde_json::Value> = properties
        .iter()
        .map(|(k, v)| {
            let json = match v {
                ScalarValue::Str(s) => serde_json::Value::String(s.clone()),
                ScalarValue::Int(i) => serde_json::json!(i),
                ScalarValue::Double(d) => serde_json::json!(d),
                ScalarValue::Bool(b) => serde_json::Value::Bool(*b),
                ScalarValue::Bytes(b) => serde_json::Value::String(hex::encode_bytes(b)),
            };
            (k.clone(), json)
        })
        .collect();
    serde_json::to_string(&as_json).unwrap_or_default()
}

/// Minimal hex helper; kept local rather than pulling in a `hex` crate dependency for one
/// call site.
mod hex {
    pub fn encode_bytes(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }
}

/// The graph-store adapter maintains its own `nodes`/`edges` tables (spec §4.2's graph
/// backend is modeled as a property graph over a relational substrate, since neither the
/// teacher nor the wider example pack carries a native graph-database client crate to ground
/// one on) and exposes `RunQuery` as a parameterized SQL query over those tables.
/// `schema` is the tenant's physical namespace from the Tenant Rewriter (spec §4.2);
/// implementations must scope every statement to it (I1).
#[async_trait]
pub trait GraphConnection: Send + Sync {
    async fn create_node(
        &self,
        schema: &str,
        label: &str,
        properties: &PropertyMap,
    ) -> Result<String, GraphStoreError>;

    async fn create_edge(
        &self,
        schema: &str,
        from_node_id: &str,
        to_node_id: &str,
        edge_label: &str,
        properties: &PropertyMap,
    ) -> Result<String, GraphStoreError>;

    /// `params` are keyed by placeholder name (spec's `RunQueryRequest.params` is a map, not a
    /// positional list), referenced in `query` as `:name` tokens; see `bind_named_params`.
    async fn run_query(
        &self,
        schema: &str,
        query: &str,
        params: &PropertyMap,
        max_rows: u32,
    ) -> Result<QueryOutcome, GraphStoreError>;

    async fn ping(&self) -> bool;
}

fn decode_row(row: &AnyRow) -> GraphRow {
    let mut out = HashMap::with_capacity(row.columns().len());
    for column in row.columns() {
        let name = column.name().to_owned();
        let value = if let Ok(v) = row.try_get::<i64, _>(column.ordinal()) {
            ScalarValue::Int(v)
        } else if let Ok(v) = row.try_get::<f64, _>(column.ordinal()) {
            ScalarValue::Double(v)
        } else if let Ok(v) = row.try_get::<bool, _>(column.ordinal()) {
            ScalarValue::Bool(v)
        } else if let Ok(v) = row.try_get::<Vec<u8>, _>(column.ordinal()) {
            ScalarValue::Bytes(v)
        } else {
            ScalarValue::Str(row.try_get::<String, _>(column.ordinal()).unwrap_or_default())
        };
        out.insert(name, value);
    }
    out
}

/// Rewrites `:name` placeholder tokens in `query` into positional `?` markers in the order
/// they appear, returning the matching bind values. Errors if a referenced name is missing
/// from `params`.
fn bind_named_params(query: &str, params: &PropertyMap) -> Result<(String, Vec<ScalarValue>), GraphStoreError> {
    let mut rewritten = String::with_capacity(query.len());
    let mut values = Vec::new();
    let mut chars = query.char_indices().peekable();
    while let Some((_, c)) = chars.next() {
        if c == ':' && chars.peek().map(|(_, c)| c.is_alphabetic() || *c == '_').unwrap_or(false) {
            let mut name = String::new();
            while let Some((_, c)) = chars.peek() {
                if c.is_alphanumeric() || *c == '_' {
                    name.push(*c);
                    chars.next();
                } else {
                    break;
                }
            }
            let value = params
                .get(&name)
                .ok_or_else(|| GraphStoreError::InvalidArgument(format!("missing param :{name}")))?;
            values.push(value.clone());
            rewritten.push('?');
        } else {
            rewritten.push(c);
        }
    }
    Ok((rewritten, values))
}

pub struct SqlGraphConnection {
    pool: AnyPool,
    is_postgres: bool,
}

impl SqlGraphConnection {
    pub async fn connect(database_url: &str) -> Result<Self, GraphStoreError> {
        let is_postgres = database_url.starts_with("postgres");
        let pool = AnyPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        if !is_postgres {
            sqlx::query(
                "CREATE TABLE IF NOT EXISTS graph_nodes (id TEXT PRIMARY KEY, label TEXT NOT NULL, properties TEXT NOT NULL)",
            )
            .execute(&pool)
            .await?;
            sqlx::query(
                "CREATE TABLE IF NOT EXISTS graph_edges (id TEXT PRIMARY KEY, from_node_id TEXT NOT NULL, to_node_id TEXT NOT NULL, edge_label TEXT NOT NULL, properties TEXT NOT NULL)",
            )
            .execute(&pool)
            .await?;
        }
        Ok(SqlGraphConnection { pool, is_postgres })
    }

    /// Checks out a single connection and, on Postgres, scopes it to the tenant's own schema
    /// via `SET search_path` before ensuring that schema's `graph_nodes`/`graph_edges` tables
    /// exist (spec §4.2; I1). SQLite has no schema concept, so `schema` is a no-op there and
    /// the tables created once at `connect` time are shared across tenants in the pool.
    async fn scoped_connection(&self, schema: &str) -> Result<PoolConnection<Any>, GraphStoreError> {
        let mut conn = self.pool.acquire().await?;
        if self.is_postgres {
            sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS \"{schema}\""))
                .execute(&mut *conn)
                .await?;
            sqlx::query(&format!("SET search_path TO \"{schema}\""))
                .execute(&mut *conn)
                .await?;
            sqlx::query(
                "CREATE TABLE IF NOT EXISTS graph_nodes (id TEXT PRIMARY KEY, label TEXT NOT NULL, properties TEXT NOT NULL)",
            )
            .execute(&mut *conn)
            .await?;
            sqlx::query(
                "CREATE TABLE IF NOT EXISTS graph_edges (id TEXT PRIMARY KEY, from_node_id TEXT NOT NULL, to_node_id TEXT NOT NULL, edge_label TEXT NOT NULL, properties TEXT NOT NULL)",
            )
            .execute(&mut *conn)
            .await?;
        }
        Ok(conn)
    }
}

#[async_trait]
impl GraphConnection for SqlGraphConnection {
    async fn create_node(
        &self,
        schema: &str,
        label: &str,
        properties: &PropertyMap,
    ) -> Result<String, GraphStoreError> {
        let mut conn = self.scoped_connection(schema).await?;
        let node_id = Uuid::new_v4().to_string();
        sqlx::query("INSERT INTO graph_nodes (id, label, properties) VALUES (?, ?, ?)")
            .bind(node_id.clone())
            .bind(label.to_owned())
            .bind(properties_to_json(properties))
            .execute(&mut *conn)
            .await?;
        Ok(node_id)
    }

    async fn create_edge(
        &self,
        schema: &str,
        from_node_id: &str,
        to_node_id: &str,
        edge_label: &str,
        properties: &PropertyMap,
    ) -> Result<String, GraphStoreError> {
        let mut conn = self.scoped_connection(schema).await?;
        for node_id in [from_node_id, to_node_id] {
            let exists = sqlx::query("SELECT id FROM graph_nodes WHERE id = ?")
                .bind(node_id.to_owned())
                .fetch_optional(&mut *conn)
                .await?;
            if exists.is_none() {
                return Err(GraphStoreError::NotFound(format!("node {node_id} does not exist")));
            }
        }

        let edge_id = Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO graph_edges (id, from_node_id, to_node_id, edge_label, properties) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(edge_id.clone())
        .bind(from_node_id.to_owned())
        .bind(to_node_id.to_owned())
        .bind(edge_label.to_owned())
        .bind(properties_to_json(properties))
        .execute(&mut *conn)
        .await?;
        Ok(edge_id)
    }

    async fn run_query(
        &self,
        schema: &str,
        query: &str,
        params: &PropertyMap,
        max_rows: u32,
    ) -> Result<QueryOutcome, GraphStoreError> {
        let mut conn = self.scoped_connection(schema).await?;
        let (query, params) = bind_named_params(query, params)?;
        let mut bound = sqlx::query(&query);
        for param in &params {
            bound = match param {
                ScalarValue::Str(v) => bound.bind(v.clone()),
                ScalarValue::Int(v) => bound.bind(*v),
                ScalarValue::Double(v) => bound.bind(*v),
                ScalarValue::Bool(v) => bound.bind(*v),
                ScalarValue::Bytes(v) => bound.bind(v.clone()),
            };
        }

        let mut rows = bound.fetch_all(&mut *conn).await?;
        let limit = if max_rows == 0 { usize::MAX } else { max_rows as usize };
        let has_next = rows.len() > limit;
        rows.truncate(limit);

        Ok(QueryOutcome {
            rows: rows.iter().map(decode_row).collect(),
            has_next,
        })
    }

    async fn ping(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_SCHEMA: &str = "tenant_acme";

    async fn connection() -> SqlGraphConnection {
        SqlGraphConnection::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn create_node_then_create_edge_between_them() {
        let conn = connection().await;
        let mut props = PropertyMap::new();
        props.insert("name".to_owned(), ScalarValue::Str("alice".to_owned()));
        let a = conn.create_node(TEST_SCHEMA, "Person", &props).await.unwrap();
        let b = conn
            .create_node(TEST_SCHEMA, "Person", &PropertyMap::new())
            .await
            .unwrap();

        let edge_id = conn
            .create_edge(TEST_SCHEMA, &a, &b, "KNOWS", &PropertyMap::new())
            .await
            .unwrap();
        assert!(!edge_id.is_empty());
    }

    #[tokio::test]
    async fn create_edge_rejects_dangling_endpoint() {
        let conn = connection().await;
        let a = conn
            .create_node(TEST_SCHEMA, "Person", &PropertyMap::new())
            .await
            .unwrap();
        let result = conn
            .create_edge(TEST_SCHEMA, &a, "missing-node", "KNOWS", &PropertyMap::new())
            .await;
        assert!(matches!(result, Err(GraphStoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn run_query_selects_created_nodes() {
        let conn = connection().await;
        conn.create_node(TEST_SCHEMA, "Person", &PropertyMap::new())
            .await
            .unwrap();
        conn.create_node(TEST_SCHEMA, "Person", &PropertyMap::new())
            .await
            .unwrap();

        let mut params = PropertyMap::new();
        params.insert("label".to_owned(), ScalarValue::Str("Person".to_owned()));
        let outcome = conn
            .run_query(
                TEST_SCHEMA,
                "SELECT id FROM graph_nodes WHERE label = :label",
                &params,
                10,
            )
            .await
            .unwrap();
        assert_eq!(outcome.rows.len(), 2);
    }

    #[tokio::test]
    async fn run_query_rejects_missing_named_param() {
        let conn = connection().await;
        let result = conn
            .run_query(
                TEST_SCHEMA,
                "SELECT id FROM graph_nodes WHERE label = :label",
                &PropertyMap::new(),
                10,
            )
            .await;
        assert!(matches!(result, Err(GraphStoreError::InvalidArgument(_))));
    }
}
