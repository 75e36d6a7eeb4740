// Copyright 2022 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::error::ObjectStoreError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectSummary {
    pub key: String,
    pub size_bytes: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectPage {
    pub items: Vec<ObjectSummary>,
    pub total: u64,
    pub has_next: bool,
    pub continuation_token: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresignedMethod {
    Put,
    Get,
}

/// The operations the Adapter Skeleton dispatches to, independent of which concrete object
/// store sits behind it. Implemented once against the local filesystem (mirroring
/// `storage::driver::FileBackedStorage`) and once against an in-memory map for driver-level
/// unit tests.
#[async_trait]
pub trait ObjectStoreConnection: Send + Sync {
    async fn create_bucket(&self, bucket: &str) -> Result<(), ObjectStoreError>;
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: &[u8],
    ) -> Result<(String, u64), ObjectStoreError>;
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>, ObjectStoreError>;
    async fn delete_object(&self, bucket: &str, key: &str) -> Result<bool, ObjectStoreError>;
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        page_size: u32,
        continuation_token: &str,
    ) -> Result<ObjectPage, ObjectStoreError>;
    async fn presigned_url(
        &self,
        bucket: &str,
        key: &str,
        method: PresignedMethod,
        expiry_seconds: u32,
    ) -> Result<(String, String), ObjectStoreError>;
    async fn ping(&self) -> bool;
}

/// Stores every bucket as a subdirectory of `base_path`, every object as a single file,
/// mirroring `storage::driver::FileBackedStorage`'s "one blob, one file" layout.
pub struct FileBackedObjectStoreConnection {
    base_path: PathBuf,
}

impl FileBackedObjectStoreConnection {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        FileBackedObjectStoreConnection {
            base_path: base_path.into(),
        }
    }

    /// Rejects any `key` that isn't a plain relative path of normal components before joining
    /// it onto `base_path`, so a caller can never escape the bucket directory via `..` or an
    /// absolute-path segment.
    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, ObjectStoreError> {
        if Path::new(key)
            .components()
            .any(|component| !matches!(component, Component::Normal(_)))
        {
            return Err(ObjectStoreError::InvalidArgument(format!(
                "object key {key:?} must be a relative path with no `..` or root components"
            )));
        }
        Ok(self.base_path.join(bucket).join(key))
    }

    fn bucket_path(&self, bucket: &str) -> PathBuf {
        self.base_path.join(bucket)
    }
}

#[async_trait]
impl ObjectStoreConnection for FileBackedObjectStoreConnection {
    async fn create_bucket(&self, bucket: &str) -> Result<(), ObjectStoreError> {
        tokio::fs::create_dir_all(self.bucket_path(bucket)).await?;
        Ok(())
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: &[u8],
    ) -> Result<(String, u64), ObjectStoreError> {
        let path = self.object_path(bucket, key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::File::create(&path).await?;
        file.write_all(data).await?;
        file.flush().await?;
        Ok((uuid::Uuid::new_v4().to_string(), data.len() as u64))
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>, ObjectStoreError> {
        match tokio::fs::read(self.object_path(bucket, key)?).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<bool, ObjectStoreError> {
        match tokio::fs::remove_file(self.object_path(bucket, key)?).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        page_size: u32,
        continuation_token: &str,
    ) -> Result<ObjectPage, ObjectStoreError> {
        let bucket_path = self.bucket_path(bucket);
        let mut all_keys = Vec::new();
        collect_keys(&bucket_path, &bucket_path, &mut all_keys).await?;
        all_keys.retain(|k| k.starts_with(prefix));
        all_keys.sort();

        let offset: usize = if continuation_token.is_empty() {
            0
        } else {
            continuation_token
                .parse()
                .map_err(|_| ObjectStoreError::InvalidArgument("malformed continuation_token".to_owned()))?
        };

        let page_size = if page_size == 0 { 100 } else { page_size as usize };
        let total = all_keys.len() as u64;
        let page: Vec<String> = all_keys.into_iter().skip(offset).take(page_size).collect();
        let has_next = offset + page.len() < total as usize;
        let mut items = Vec::with_capacity(page.len());
        for key in &page {
            let metadata = tokio::fs::metadata(bucket_path.join(key)).await?;
            items.push(ObjectSummary {
                key: key.clone(),
                size_bytes: metadata.len(),
            });
        }

        Ok(ObjectPage {
            items,
            total,
            has_next,
            continuation_token: if has_next {
                (offset + page_size).to_string()
            } else {
                String::new()
            },
        })
    }

    async fn presigned_url(
        &self,
        bucket: &str,
        key: &str,
        method: PresignedMethod,
        expiry_seconds: u32,
    ) -> Result<(String, String), ObjectStoreError> {
        let verb = match method {
            PresignedMethod::Put => "put",
            PresignedMethod::Get => "get",
        };
        let expires_at = (chrono::Utc::now() + chrono::Duration::seconds(expiry_seconds as i64))
            .to_rfc3339();
        Ok((
            format!("file://{bucket}/{key}?method={verb}&expires={expiry_seconds}"),
            expires_at,
        ))
    }

    async fn ping(&self) -> bool {
        tokio::fs::metadata(&self.base_path).await.is_ok()
    }
}

/// Walks every file under `root` depth-first using an explicit stack (rather than async
/// recursion, which would need a boxed future at every level).
async fn collect_keys(root: &Path, start: &Path, out: &mut Vec<String>) -> Result<(), ObjectStoreError> {
    let mut pending: Vec<PathBuf> = vec![start.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
            Err(err) => return Err(err.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.is_dir() {
                pending.push(path);
            } else if let Ok(relative) = path.strip_prefix(root) {
                if let Some(key) = relative.to_str() {
                    out.push(key.replace(std::path::MAIN_SEPARATOR, "/"));
                }
            }
        }
    }
    Ok(())
}

/// In-memory `ObjectStoreConnection` used by driver-level unit tests.
#[derive(Default)]
pub struct MemoryObjectStoreConnection {
    objects: parking_lot::Mutex<HashMap<(String, String), Vec<u8>>>,
}

#[async_trait]
impl ObjectStoreConnection for MemoryObjectStoreConnection {
    async fn create_bucket(&self, _bucket: &str) -> Result<(), ObjectStoreError> {
        Ok(())
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: &[u8],
    ) -> Result<(String, u64), ObjectStoreError> {
        self.objects
            .lock()
            .insert((bucket.to_owned(), key.to_owned()), data.to_owned());
        Ok((uuid::Uuid::new_v4().to_string(), data.len() as u64))
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>, ObjectStoreError> {
        Ok(self
            .objects
            .lock()
            .get(&(bucket.to_owned(), key.to_owned()))
            .cloned())
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<bool, ObjectStoreError> {
        Ok(self
            .objects
            .lock()
            .remove(&(bucket.to_owned(), key.to_owned()))
            .is_some())
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        page_size: u32,
        continuation_token: &str,
    ) -> Result<ObjectPage, ObjectStoreError> {
        let mut keys: Vec<String> = self
            .objects
            .lock()
            .keys()
            .filter(|(b, k)| b == bucket && k.starts_with(prefix))
            .map(|(_, k)| k.clone())
            .collect();
        keys.sort();

        let offset: usize = if continuation_token.is_empty() {
            0
        } else {
            continuation_token
                .parse()
                .map_err(|_| ObjectStoreError::InvalidArgument("malformed continuation_token".to_owned()))?
        };
        let page_size = if page_size == 0 { 100 } else { page_size as usize };
        let total = keys.len() as u64;
        let page: Vec<String> = keys.into_iter().skip(offset).take(page_size).collect();
        let has_next = offset + page.len() < total as usize;
        let objects = self.objects.lock();
        let items = page
            .iter()
            .map(|key| ObjectSummary {
                key: key.clone(),
                size_bytes: objects
                    .get(&(bucket.to_owned(), key.clone()))
                    .map(|v| v.len() as u64)
                    .unwrap_or_default(),
            })
            .collect();

        Ok(ObjectPage {
            items,
            total,
            has_next,
            continuation_token: if has_next {
                (offset + page_size).to_string()
            } else {
                String::new()
            },
        })
    }

    async fn presigned_url(
        &self,
        bucket: &str,
        key: &str,
        method: PresignedMethod,
        expiry_seconds: u32,
    ) -> Result<(String, String), ObjectStoreError> {
        let verb = match method {
            PresignedMethod::Put => "put",
            PresignedMethod::Get => "get",
        };
        Ok((
            format!("memory://{bucket}/{key}?method={verb}"),
            (chrono::Utc::now() + chrono::Duration::seconds(expiry_seconds as i64)).to_rfc3339(),
        ))
    }

    async fn ping(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn file_backed_connection_rejects_path_traversal_key() {
        let dir = tempfile::tempdir().unwrap();
        let conn = FileBackedObjectStoreConnection::new(dir.path());
        let err = conn
            .put_object("acme-bucket", "../../../etc/passwd", b"payload")
            .await
            .unwrap_err();
        assert!(matches!(err, ObjectStoreError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn file_backed_connection_rejects_absolute_key() {
        let dir = tempfile::tempdir().unwrap();
        let conn = FileBackedObjectStoreConnection::new(dir.path());
        let err = conn.get_object("acme-bucket", "/etc/passwd").await.unwrap_err();
        assert!(matches!(err, ObjectStoreError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn memory_connection_put_then_get_round_trips() {
        let conn = MemoryObjectStoreConnection::default();
        conn.put_object("acme-bucket", "path/to/object", b"payload")
            .await
            .unwrap();
        let got = conn.get_object("acme-bucket", "path/to/object").await.unwrap();
        assert_eq!(got, Some(b"payload".to_vec()));
    }

    #[tokio::test]
    async fn memory_connection_get_missing_is_none() {
        let conn = MemoryObjectStoreConnection::default();
        assert_eq!(conn.get_object("acme-bucket", "missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn memory_connection_delete_reports_existed() {
        let conn = MemoryObjectStoreConnection::default();
        conn.put_object("acme-bucket", "k", b"v").await.unwrap();
        assert!(conn.delete_object("acme-bucket", "k").await.unwrap());
        assert!(!conn.delete_object("acme-bucket", "k").await.unwrap());
    }

    #[tokio::test]
    async fn memory_connection_list_objects_filters_by_prefix_and_paginates() {
        let conn = MemoryObjectStoreConnection::default();
        for i in 0..5 {
            conn.put_object("acme-bucket", &format!("logs/{i}"), b"x")
                .await
                .unwrap();
        }
        conn.put_object("acme-bucket", "other", b"x").await.unwrap();

        let page = conn
            .list_objects("acme-bucket", "logs/", 2, "")
            .await
            .unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.total, 5);
        assert!(page.has_next);

        let next_page = conn
            .list_objects("acme-bucket", "logs/", 2, &page.continuation_token)
            .await
            .unwrap();
        assert_eq!(next_page.items.len(), 2);
    }
}
