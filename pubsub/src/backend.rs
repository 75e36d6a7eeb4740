// Copyright 2022 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::sync::Arc;

use fabric_core::connection::ManagedBackend;
use fabric_core::errors::FabricError;
use tonic::async_trait;

use crate::driver::{InMemoryPubSubConnection, PubSubConnection};

/// One shared in-process broker outlives individual `connect()` calls, same rationale as
/// `vectorstore::VectorStoreBackend`: there is no remote endpoint to reconnect to.
pub struct PubSubBackend {
    connection: Arc<InMemoryPubSubConnection>,
}

impl PubSubBackend {
    pub fn new() -> Self {
        PubSubBackend {
            connection: Arc::new(InMemoryPubSubConnection::new()),
        }
    }
}

impl Default for PubSubBackend {
    fn default() -> Self {
        PubSubBackend::new()
    }
}

#[async_trait]
impl ManagedBackend for PubSubBackend {
    type Handle = Arc<dyn PubSubConnection>;
    type SubscriptionSpec = ();

    async fn connect(&self) -> Result<Self::Handle, FabricError> {
        Ok(self.connection.clone())
    }

    async fn probe_health(&self, handle: &Self::Handle) -> bool {
        handle.ping().await
    }
}
