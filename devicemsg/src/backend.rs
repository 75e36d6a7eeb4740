// Copyright 2022 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::sync::Arc;

use fabric_core::connection::ManagedBackend;
use fabric_core::errors::FabricError;
use tonic::async_trait;

use crate::driver::{DeviceMessagingConnection, InMemoryDeviceMessagingConnection};

pub struct DeviceMessagingBackend {
    connection: Arc<InMemoryDeviceMessagingConnection>,
}

impl DeviceMessagingBackend {
    pub fn new() -> Self {
        DeviceMessagingBackend {
            connection: Arc::new(InMemoryDeviceMessagingConnection::new()),
        }
    }
}

impl Default for DeviceMessagingBackend {
    fn default() -> Self {
        DeviceMessagingBackend::new()
    }
}

#[async_trait]
impl ManagedBackend for DeviceMessagingBackend {
    type Handle = Arc<dyn DeviceMessagingConnection>;
    type SubscriptionSpec = ();

    async fn connect(&self) -> Result<Self::Handle, FabricError> {
        Ok(self.connection.clone())
    }

    async fn probe_health(&self, handle: &Self::Handle) -> bool {
        handle.ping().await
    }
}
