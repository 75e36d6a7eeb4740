// Copyright 2022 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::sync::Arc;

use async_trait::async_trait;
use fabric_core::connection::ManagedBackend;
use fabric_core::errors::FabricError;

use crate::driver::{FileBackedObjectStoreConnection, ObjectStoreConnection};

/// The `ManagedBackend` the Connection Manager supervises for this Adapter: a local
/// filesystem object store rooted at `base_path`. `objectstore` has no long-lived
/// subscriptions, so `SubscriptionSpec` is `()`.
pub struct FileObjectStoreBackend {
    base_path: String,
}

impl FileObjectStoreBackend {
    pub fn new(base_path: impl Into<String>) -> Self {
        FileObjectStoreBackend {
            base_path: base_path.into(),
        }
    }
}

#[async_trait]
impl ManagedBackend for FileObjectStoreBackend {
    type Handle = Arc<dyn ObjectStoreConnection>;
    type SubscriptionSpec = ();

    async fn connect(&self) -> Result<Self::Handle, FabricError> {
        let connection = FileBackedObjectStoreConnection::new(self.base_path.clone());
        tokio::fs::create_dir_all(&self.base_path)
            .await
            .map_err(|err| FabricError::Unavailable(format!("cannot create base_path: {err}")))?;
        Ok(Arc::new(connection))
    }

    async fn probe_health(&self, handle: &Self::Handle) -> bool {
        handle.ping().await
    }
}
