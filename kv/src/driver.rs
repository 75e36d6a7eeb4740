// Copyright 2022 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::collections::HashMap;

use async_trait::async_trait;
use redis::aio::ConnectionManager as RedisConnectionManager;
use redis::AsyncCommands;

use crate::error::KvError;

/// The operations the Adapter Skeleton dispatches to (spec §4.5), independent of which
/// concrete backend is behind it. Implemented once against the real Redis client and once
/// against an in-memory map for driver-level unit tests, mirroring
/// `storage::driver::BlobStorage`'s split between a real and a testing implementation.
#[async_trait]
pub trait KvConnection: Send + Sync {
    async fn set(&self, key: &str, value: &[u8], ttl_seconds: i64) -> Result<(), KvError>;
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError>;
    async fn delete(&self, key: &str) -> Result<bool, KvError>;
    async fn exists(&self, key: &str) -> Result<bool, KvError>;
    async fn increment(&self, key: &str, delta: i64) -> Result<i64, KvError>;
    async fn hash_set(&self, key: &str, fields: &HashMap<String, Vec<u8>>) -> Result<(), KvError>;
    async fn hash_get_all(&self, key: &str) -> Result<Option<HashMap<String, Vec<u8>>>, KvError>;
    async fn ping(&self) -> bool;
}

/// Wraps the teacher's `redis::aio::ConnectionManager` (the stock crate's own reconnecting
/// client, distinct from `fabric_core::connection::ConnectionManager` which supervises it at
/// the Adapter level).
pub struct RedisKvConnection {
    conn: RedisConnectionManager,
}

impl RedisKvConnection {
    pub fn new(conn: RedisConnectionManager) -> Self {
        RedisKvConnection { conn }
    }
}

#[async_trait]
impl KvConnection for RedisKvConnection {
    async fn set(&self, key: &str, value: &[u8], ttl_seconds: i64) -> Result<(), KvError> {
        let mut conn = self.conn.clone();
        if ttl_seconds > 0 {
            conn.set_ex::<_, _, ()>(key, value, ttl_seconds as usize)
                .await?;
        } else {
            conn.set::<_, _, ()>(key, value).await?;
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError> {
        let mut conn = self.conn.clone();
        let value: Option<Vec<u8>> = conn.get(key).await?;
        Ok(value)
    }

    async fn delete(&self, key: &str) -> Result<bool, KvError> {
        let mut conn = self.conn.clone();
        let removed: i64 = conn.del(key).await?;
        Ok(removed > 0)
    }

    async fn exists(&self, key: &str) -> Result<bool, KvError> {
        let mut conn = self.conn.clone();
        let exists: bool = conn.exists(key).await?;
        Ok(exists)
    }

    async fn increment(&self, key: &str, delta: i64) -> Result<i64, KvError> {
        let mut conn = self.conn.clone();
        let value: i64 = conn.incr(key, delta).await?;
        Ok(value)
    }

    async fn hash_set(&self, key: &str, fields: &HashMap<String, Vec<u8>>) -> Result<(), KvError> {
        if fields.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        let pairs: Vec<(&String, &Vec<u8>)> = fields.iter().collect();
        conn.hset_multiple::<_, _, _, ()>(key, &pairs).await?;
        Ok(())
    }

    async fn hash_get_all(&self, key: &str) -> Result<Option<HashMap<String, Vec<u8>>>, KvError> {
        let mut conn = self.conn.clone();
        let exists: bool = conn.exists(key).await?;
        if !exists {
            return Ok(None);
        }
        let fields: HashMap<String, Vec<u8>> = conn.hgetall(key).await?;
        Ok(Some(fields))
    }

    async fn ping(&self) -> bool {
        let mut conn = self.conn.clone();
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .is_ok()
    }
}

/// In-memory `KvConnection` used by driver-level unit tests and by `kv_server` when no
/// `redis` backend is configured in non-production environments.
#[derive(Default)]
pub struct MemoryKvConnection {
    values: parking_lot::Mutex<HashMap<String, Vec<u8>>>,
    hashes: parking_lot::Mutex<HashMap<String, HashMap<String, Vec<u8>>>>,
}

#[async_trait]
impl KvConnection for MemoryKvConnection {
    async fn set(&self, key: &str, value: &[u8], _ttl_seconds: i64) -> Result<(), KvError> {
        self.values
            .lock()
            .insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError> {
        Ok(self.values.lock().get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<bool, KvError> {
        Ok(self.values.lock().remove(key).is_some())
    }

    async fn exists(&self, key: &str) -> Result<bool, KvError> {
        Ok(self.values.lock().contains_key(key))
    }

    async fn increment(&self, key: &str, delta: i64) -> Result<i64, KvError> {
        let mut values = self.values.lock();
        let current = values
            .get(key)
            .map(|bytes| {
                std::str::from_utf8(bytes)
                    .ok()
                    .and_then(|s| s.parse::<i64>().ok())
                    .ok_or_else(|| {
                        KvError::InvalidArgument(format!("value at {key} is not an integer"))
                    })
            })
            .transpose()?
            .unwrap_or(0);
        let next = current + delta;
        values.insert(key.to_owned(), next.to_string().into_bytes());
        Ok(next)
    }

    async fn hash_set(&self, key: &str, fields: &HashMap<String, Vec<u8>>) -> Result<(), KvError> {
        let mut hashes = self.hashes.lock();
        let entry = hashes.entry(key.to_owned()).or_default();
        for (field, value) in fields {
            entry.insert(field.clone(), value.clone());
        }
        Ok(())
    }

    async fn hash_get_all(&self, key: &str) -> Result<Option<HashMap<String, Vec<u8>>>, KvError> {
        Ok(self.hashes.lock().get(key).cloned())
    }

    async fn ping(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_connection_set_then_get_round_trips() {
        let conn = MemoryKvConnection::default();
        conn.set("acme:profile", b"hello", 0).await.unwrap();
        assert_eq!(conn.get("acme:profile").await.unwrap(), Some(b"hello".to_vec()));
    }

    #[tokio::test]
    async fn memory_connection_get_missing_key_is_none() {
        let conn = MemoryKvConnection::default();
        assert_eq!(conn.get("acme:missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn memory_connection_delete_then_get_found_false() {
        let conn = MemoryKvConnection::default();
        conn.set("acme:k", b"v", 0).await.unwrap();
        assert!(conn.delete("acme:k").await.unwrap());
        assert_eq!(conn.get("acme:k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn memory_connection_delete_of_missing_key_reports_not_existed() {
        let conn = MemoryKvConnection::default();
        assert!(!conn.delete("acme:missing").await.unwrap());
    }

    #[tokio::test]
    async fn memory_connection_increment_accumulates() {
        let conn = MemoryKvConnection::default();
        assert_eq!(conn.increment("acme:counter", 5).await.unwrap(), 5);
        assert_eq!(conn.increment("acme:counter", 3).await.unwrap(), 8);
    }

    #[tokio::test]
    async fn memory_connection_hash_set_then_get_all() {
        let conn = MemoryKvConnection::default();
        let mut fields = HashMap::new();
        fields.insert("name".to_owned(), b"acme".to_vec());
        conn.hash_set("acme:h", &fields).await.unwrap();
        let got = conn.hash_get_all("acme:h").await.unwrap().unwrap();
        assert_eq!(got.get("name"), Some(&b"acme".to_vec()));
    }
}
