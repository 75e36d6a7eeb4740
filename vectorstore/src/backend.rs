// Copyright 2022 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::sync::Arc;

use fabric_core::connection::ManagedBackend;
use fabric_core::errors::FabricError;
use tonic::async_trait;

use crate::driver::{InMemoryVectorStoreConnection, VectorStoreConnection};

/// The in-process index outlives individual `connect()` calls, since there is no remote
/// backend to reconnect to: `connect()` just hands out a clone of the shared handle.
pub struct VectorStoreBackend {
    connection: Arc<InMemoryVectorStoreConnection>,
}

impl VectorStoreBackend {
    pub fn new() -> Self {
        VectorStoreBackend {
            connection: Arc::new(InMemoryVectorStoreConnection::new()),
        }
    }
}

impl Default for VectorStoreBackend {
    fn default() -> Self {
        VectorStoreBackend::new()
    }
}

#[async_trait]
impl ManagedBackend for VectorStoreBackend {
    type Handle = Arc<dyn VectorStoreConnection>;
    type SubscriptionSpec = ();

    async fn connect(&self) -> Result<Self::Handle, FabricError> {
        Ok(self.connection.clone())
    }

    async fn probe_health(&self, handle: &Self::Handle) -> bool {
        handle.ping().await
    }
}
