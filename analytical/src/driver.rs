// Copyright 2022 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::any::{AnyPool, AnyPoolOptions, AnyRow};
use sqlx::pool::PoolConnection;
use sqlx::{Any, Column, Row};

use crate::error::AnalyticalError;

#[derive(Clone, Debug)]
pub enum ScalarValue {
    Str(String),
    Int(i64),
    Double(f64),
    Bool(bool),
    Bytes(Vec<u8>),
}

pub type AnalyticalRow = HashMap<String, ScalarValue>;

#[derive(Clone, Debug, Default)]
pub struct QueryOutcome {
    pub rows: Vec<AnalyticalRow>,
    pub has_next: bool,
}

/// The analytical backend is an OLAP-shaped sibling of `relational`: ad hoc parameterized
/// `Query`, plus a bulk `Ingest` that appends pre-shaped rows to a table rather than accepting
/// a write `statement` (spec's analytical engine is write-through-append, read-aggregate).
/// `schema` is the tenant's physical namespace from the Tenant Rewriter (spec §4.2);
/// implementations must scope the statement to it (I1).
#[async_trait]
pub trait AnalyticalConnection: Send + Sync {
    async fn query(
        &self,
        schema: &str,
        statement: &str,
        params: &[ScalarValue],
        max_rows: u32,
    ) -> Result<QueryOutcome, AnalyticalError>;

    async fn ingest(
        &self,
        schema: &str,
        table: &str,
        rows: &[AnalyticalRow],
    ) -> Result<u64, AnalyticalError>;

    async fn ping(&self) -> bool;
}

fn decode_row(row: &AnyRow) -> AnalyticalRow {
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

fn is_valid_identifier(name: &str) -> bool {
    !name.is_empty()
        && name.chars().next().map(|c| c.is_alphabetic() || c == '_').unwrap_or(false)
        && name.chars().all(|c| c.is_alphanumeric() || c == '_')
}

pub struct AnyAnalyticalConnection {
    pool: AnyPool,
    is_postgres: bool,
}

impl AnyAnalyticalConnection {
    pub async fn connect(database_url: &str) -> Result<Self, AnalyticalError> {
        let is_postgres = database_url.starts_with("postgres");
        let pool = AnyPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(AnyAnalyticalConnection { pool, is_postgres })
    }

    /// Checks out a single connection and, on Postgres, scopes every statement run on it to
    /// the tenant's own schema via `SET search_path` (spec §4.2). SQLite has no schema
    /// concept, so `schema` is a no-op there.
    async fn scoped_connection(
        &self,
        schema: &str,
    ) -> Result<PoolConnection<Any>, AnalyticalError> {
        let mut conn = self.pool.acquire().await?;
        if self.is_postgres {
            sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS \"{schema}\""))
                .execute(&mut *conn)
                .await?;
            sqlx::query(&format!("SET search_path TO \"{schema}\""))
                .execute(&mut *conn)
                .await?;
        }
        Ok(conn)
    }
}

#[async_trait]
impl AnalyticalConnection for AnyAnalyticalConnection {
    async fn query(
        &self,
        schema: &str,
        statement: &str,
        params: &[ScalarValue],
        max_rows: u32,
    ) -> Result<QueryOutcome, AnalyticalError> {
        let mut conn = self.scoped_connection(schema).await?;
        let mut bound = sqlx::query(statement);
        for param in params {
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

    async fn ingest(
        &self,
        schema: &str,
        table: &str,
        rows: &[AnalyticalRow],
    ) -> Result<u64, AnalyticalError> {
        if !is_valid_identifier(table) {
            return Err(AnalyticalError::InvalidArgument(format!(
                "invalid table name: {table}"
            )));
        }

        let mut conn = self.scoped_connection(schema).await?;
        let mut ingested = 0u64;
        for row in rows {
            if row.is_empty() {
                continue;
            }
            let mut columns: Vec<&String> = row.keys().collect();
            columns.sort();
            for column in &columns {
                if !is_valid_identifier(column) {
                    return Err(AnalyticalError::InvalidArgument(format!(
                        "invalid column name: {column}"
                    )));
                }
            }
            let column_list = columns
                .iter()
                .map(|c| c.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            let placeholders = columns.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
            let statement = format!("INSERT INTO {table} ({column_list}) VALUES ({placeholders})");

            let mut bound = sqlx::query(&statement);
            for column in &columns {
                bound = match &row[*column] {
                    ScalarValue::Str(v) => bound.bind(v.clone()),
                    ScalarValue::Int(v) => bound.bind(*v),
                    ScalarValue::Double(v) => bound.bind(*v),
                    ScalarValue::Bool(v) => bound.bind(*v),
                    ScalarValue::Bytes(v) => bound.bind(v.clone()),
                };
            }
            bound.execute(&mut *conn).await?;
            ingested += 1;
        }
        Ok(ingested)
    }

    async fn ping(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_SCHEMA: &str = "tenant_acme";

    async fn connection() -> AnyAnalyticalConnection {
        let conn = AnyAnalyticalConnection::connect("sqlite::memory:").await.unwrap();
        sqlx::query("CREATE TABLE events (id INTEGER, name TEXT)")
            .execute(&conn.pool)
            .await
            .unwrap();
        conn
    }

    #[tokio::test]
    async fn ingest_then_query_returns_rows() {
        let conn = connection().await;
        let mut row = AnalyticalRow::new();
        row.insert("id".to_owned(), ScalarValue::Int(1));
        row.insert("name".to_owned(), ScalarValue::Str("pageview".to_owned()));
        let ingested = conn.ingest(TEST_SCHEMA, "events", &[row]).await.unwrap();
        assert_eq!(ingested, 1);

        let outcome = conn
            .query(TEST_SCHEMA, "SELECT id, name FROM events", &[], 10)
            .await
            .unwrap();
        assert_eq!(outcome.rows.len(), 1);
    }

    #[tokio::test]
    async fn ingest_rejects_invalid_table_name() {
        let conn = connection().await;
        let mut row = AnalyticalRow::new();
        row.insert("id".to_owned(), ScalarValue::Int(1));
        let result = conn.ingest(TEST_SCHEMA, "events; DROP TABLE events", &[row]).await;
        assert!(matches!(result, Err(AnalyticalError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn query_respects_max_rows() {
        let conn = connection().await;
        for i in 0..4 {
            let mut row = AnalyticalRow::new();
            row.insert("id".to_owned(), ScalarValue::Int(i));
            row.insert("name".to_owned(), ScalarValue::Str("x".to_owned()));
            conn.ingest(TEST_SCHEMA, "events", &[row]).await.unwrap();
        }
        let outcome = conn
            .query(TEST_SCHEMA, "SELECT id FROM events", &[], 2)
            .await
            .unwrap();
        assert_eq!(outcome.rows.len(), 2);
        assert!(outcome.has_next);
    }
}
