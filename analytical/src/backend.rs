// Copyright 2022 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::sync::Arc;

use fabric_core::connection::ManagedBackend;
use fabric_core::errors::FabricError;
use tonic::async_trait;

use crate::driver::{AnalyticalConnection, AnyAnalyticalConnection};

pub struct AnalyticalBackend {
    database_url: String,
}

impl AnalyticalBackend {
    pub fn new(database_url: String) -> Self {
        AnalyticalBackend { database_url }
    }
}

#[async_trait]
impl ManagedBackend for AnalyticalBackend {
    type Handle = Arc<dyn AnalyticalConnection>;
    type SubscriptionSpec = ();

    async fn connect(&self) -> Result<Self::Handle, FabricError> {
        let conn = AnyAnalyticalConnection::connect(&self.database_url)
            .await
            .map_err(FabricError::from)?;
        Ok(Arc::new(conn))
    }

    async fn probe_health(&self, handle: &Self::Handle) -> bool {
        handle.ping().await
    }
}
