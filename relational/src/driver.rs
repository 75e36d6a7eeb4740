// Copyright 2022 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::any::{AnyPool, AnyPoolOptions, AnyRow};
use sqlx::pool::PoolConnection;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Any, Column, Row, SqlitePool};

use crate::error::RelationalError;

/// A single bound parameter, independent of the wire `QueryParam` oneof so this driver never
/// depends on `fabric_proto` directly (spec §9 layering).
#[derive(Clone, Debug)]
pub enum ScalarValue {
    Str(String),
    Int(i64),
    Double(f64),
    Bool(bool),
    Bytes(Vec<u8>),
}

pub type RelationalRow = HashMap<String, ScalarValue>;

#[derive(Clone, Debug, Default)]
pub struct QueryOutcome {
    pub rows: Vec<RelationalRow>,
    pub has_next: bool,
}

/// The operations the Adapter Skeleton dispatches to: a parameterized read query bounded by
/// `max_rows`, and a parameterized write/DDL statement returning the number of rows
/// affected. `schema` is the tenant's physical namespace from the Tenant Rewriter (spec
/// §4.2); implementations must scope the statement to it so no tenant can read or write
/// another tenant's rows through the same pool (I1).
#[async_trait]
pub trait RelationalConnection: Send + Sync {
    async fn query(
        &self,
        schema: &str,
        statement: &str,
        params: &[ScalarValue],
        max_rows: u32,
    ) -> Result<QueryOutcome, RelationalError>;

    async fn execute(
        &self,
        schema: &str,
        statement: &str,
        params: &[ScalarValue],
    ) -> Result<u64, RelationalError>;

    async fn ping(&self) -> bool;
}

fn decode_any_row(row: &AnyRow) -> RelationalRow {
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

/// The production driver: an `sqlx::any::AnyPool`, which dispatches to Postgres or SQLite
/// based on the connection URL scheme (spec's relational backend is Postgres-shaped, but the
/// `Any` driver lets `relational_server` point at either without a second code path).
pub struct AnyRelationalConnection {
    pool: AnyPool,
    is_postgres: bool,
}

impl AnyRelationalConnection {
    pub async fn connect(database_url: &str) -> Result<Self, RelationalError> {
        let is_postgres = database_url.starts_with("postgres");
        let pool = AnyPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(AnyRelationalConnection { pool, is_postgres })
    }

    /// Checks out a single connection and, on Postgres, scopes every statement run on it to
    /// the tenant's own schema via `SET search_path` before handing it back to the caller
    /// (spec §4.2). SQLite has no schema concept, so `schema` is a no-op there; tenant
    /// isolation on the SQLite path is left to deployments that run one database per tenant.
    async fn scoped_connection(
        &self,
        schema: &str,
    ) -> Result<PoolConnection<Any>, RelationalError> {
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
impl RelationalConnection for AnyRelationalConnection {
    async fn query(
        &self,
        schema: &str,
        statement: &str,
        params: &[ScalarValue],
        max_rows: u32,
    ) -> Result<QueryOutcome, RelationalError> {
        let mut conn = self.scoped_connection(schema).await?;
        let mut query = sqlx::query(statement);
        for param in params {
            query = match param {
                ScalarValue::Str(v) => query.bind(v.clone()),
                ScalarValue::Int(v) => query.bind(*v),
                ScalarValue::Double(v) => query.bind(*v),
                ScalarValue::Bool(v) => query.bind(*v),
                ScalarValue::Bytes(v) => query.bind(v.clone()),
            };
        }

        let mut rows = query.fetch_all(&mut *conn).await?;
        let limit = if max_rows == 0 { usize::MAX } else { max_rows as usize };
        let has_next = rows.len() > limit;
        rows.truncate(limit);

        Ok(QueryOutcome {
            rows: rows.iter().map(decode_any_row).collect(),
            has_next,
        })
    }

    async fn execute(
        &self,
        schema: &str,
        statement: &str,
        params: &[ScalarValue],
    ) -> Result<u64, RelationalError> {
        let mut conn = self.scoped_connection(schema).await?;
        let mut query = sqlx::query(statement);
        for param in params {
            query = match param {
                ScalarValue::Str(v) => query.bind(v.clone()),
                ScalarValue::Int(v) => query.bind(*v),
                ScalarValue::Double(v) => query.bind(*v),
                ScalarValue::Bool(v) => query.bind(*v),
                ScalarValue::Bytes(v) => query.bind(v.clone()),
            };
        }
        let result = query.execute(&mut *conn).await?;
        Ok(result.rows_affected())
    }

    async fn ping(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

/// In-memory driver-level test double: a private `SQLite` database, exercised the same way
/// production traffic exercises `AnyRelationalConnection`.
pub struct SqliteRelationalConnection {
    pool: SqlitePool,
}

impl SqliteRelationalConnection {
    pub async fn connect_in_memory() -> Result<Self, RelationalError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Ok(SqliteRelationalConnection { pool })
    }
}

#[async_trait]
impl RelationalConnection for SqliteRelationalConnection {
    async fn query(
        &self,
        _schema: &str,
        statement: &str,
        params: &[ScalarValue],
        max_rows: u32,
    ) -> Result<QueryOutcome, RelationalError> {
        let mut query = sqlx::query(statement);
        for param in params {
            query = match param {
                ScalarValue::Str(v) => query.bind(v.clone()),
                ScalarValue::Int(v) => query.bind(*v),
                ScalarValue::Double(v) => query.bind(*v),
                ScalarValue::Bool(v) => query.bind(*v),
                ScalarValue::Bytes(v) => query.bind(v.clone()),
            };
        }
        let mut rows = query.fetch_all(&self.pool).await?;
        let limit = if max_rows == 0 { usize::MAX } else { max_rows as usize };
        let has_next = rows.len() > limit;
        rows.truncate(limit);

        let decoded = rows
            .iter()
            .map(|row| {
                let mut out = HashMap::with_capacity(row.columns().len());
                for column in row.columns() {
                    let name = column.name().to_owned();
                    let value = if let Ok(v) = row.try_get::<i64, _>(column.ordinal()) {
                        ScalarValue::Int(v)
                    } else if let Ok(v) = row.try_get::<f64, _>(column.ordinal()) {
                        ScalarValue::Double(v)
                    } else if let Ok(v) = row.try_get::<Vec<u8>, _>(column.ordinal()) {
                        ScalarValue::Bytes(v)
                    } else {
                        ScalarValue::Str(row.try_get::<String, _>(column.ordinal()).unwrap_or_default())
                    };
                    out.insert(name, value);
                }
                out
            })
            .collect();

        Ok(QueryOutcome {
            rows: decoded,
            has_next,
        })
    }

    async fn execute(
        &self,
        _schema: &str,
        statement: &str,
        params: &[ScalarValue],
    ) -> Result<u64, RelationalError> {
        let mut query = sqlx::query(statement);
        for param in params {
            query = match param {
                ScalarValue::Str(v) => query.bind(v.clone()),
                ScalarValue::Int(v) => query.bind(*v),
                ScalarValue::Double(v) => query.bind(*v),
                ScalarValue::Bool(v) => query.bind(*v),
                ScalarValue::Bytes(v) => query.bind(v.clone()),
            };
        }
        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn ping(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_SCHEMA: &str = "tenant_acme";

    #[tokio::test]
    async fn sqlite_connection_executes_ddl_then_queries_rows() {
        let conn = SqliteRelationalConnection::connect_in_memory().await.unwrap();
        conn.execute(TEST_SCHEMA, "CREATE TABLE widgets (id INTEGER, name TEXT)", &[])
            .await
            .unwrap();
        conn.execute(
            TEST_SCHEMA,
            "INSERT INTO widgets (id, name) VALUES (?, ?)",
            &[ScalarValue::Int(1), ScalarValue::Str("acme".to_owned())],
        )
        .await
        .unwrap();

        let outcome = conn
            .query(TEST_SCHEMA, "SELECT id, name FROM widgets", &[], 10)
            .await
            .unwrap();
        assert_eq!(outcome.rows.len(), 1);
        assert!(!outcome.has_next);
    }

    #[tokio::test]
    async fn sqlite_connection_respects_max_rows() {
        let conn = SqliteRelationalConnection::connect_in_memory().await.unwrap();
        conn.execute(TEST_SCHEMA, "CREATE TABLE widgets (id INTEGER)", &[])
            .await
            .unwrap();
        for i in 0..5 {
            conn.execute(
                TEST_SCHEMA,
                "INSERT INTO widgets (id) VALUES (?)",
                &[ScalarValue::Int(i)],
            )
            .await
            .unwrap();
        }

        let outcome = conn
            .query(TEST_SCHEMA, "SELECT id FROM widgets", &[], 3)
            .await
            .unwrap();
        assert_eq!(outcome.rows.len(), 3);
        assert!(outcome.has_next);
    }

    #[tokio::test]
    async fn sqlite_connection_execute_reports_rows_affected() {
        let conn = SqliteRelationalConnection::connect_in_memory().await.unwrap();
        conn.execute(TEST_SCHEMA, "CREATE TABLE widgets (id INTEGER)", &[])
            .await
            .unwrap();
        let affected = conn
            .execute(
                TEST_SCHEMA,
                "INSERT INTO widgets (id) VALUES (?)",
                &[ScalarValue::Int(1)],
            )
            .await
            .unwrap();
        assert_eq!(affected, 1);
    }
}
