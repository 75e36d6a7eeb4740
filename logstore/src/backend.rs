// Copyright 2022 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::sync::Arc;

use fabric_core::connection::ManagedBackend;
use fabric_core::errors::FabricError;
use tonic::async_trait;

use crate::driver::{InMemoryLogStoreConnection, LogStoreConnection};

pub struct LogStoreBackend {
    connection: Arc<InMemoryLogStoreConnection>,
}

impl LogStoreBackend {
    pub fn new() -> Self {
        LogStoreBackend {
            connection: Arc::new(InMemoryLogStoreConnection::new()),
        }
    }
}

impl Default for LogStoreBackend {
    fn default() -> Self {
        LogStoreBackend::new()
    }
}

#[async_trait]
impl ManagedBackend for LogStoreBackend {
    type Handle = Arc<dyn LogStoreConnection>;
    type SubscriptionSpec = ();

    async fn connect(&self) -> Result<Self::Handle, FabricError> {
        Ok(self.connection.clone())
    }

    async fn probe_health(&self, handle: &Self::Handle) -> bool {
        handle.ping().await
    }
}
