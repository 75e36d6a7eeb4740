// Copyright 2022 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::sync::Arc;

use fabric_core::connection::ManagedBackend;
use fabric_core::errors::FabricError;
use tonic::async_trait;

use crate::driver::{GraphConnection, SqlGraphConnection};

/// Plugs `SqlGraphConnection` into the Connection Manager. `database_url` points at the
/// shared relational substrate this graph store is layered on (spec's graph backend §4.2).
pub struct GraphStoreBackend {
    database_url: String,
}

impl GraphStoreBackend {
    pub fn new(database_url: String) -> Self {
        GraphStoreBackend { database_url }
    }
}

#[async_trait]
impl ManagedBackend for GraphStoreBackend {
    type Handle = Arc<dyn GraphConnection>;
    type SubscriptionSpec = ();

    async fn connect(&self) -> Result<Self::Handle, FabricError> {
        let conn = SqlGraphConnection::connect(&self.database_url)
            .await
            .map_err(FabricError::from)?;
        Ok(Arc::new(conn))
    }

    async fn probe_health(&self, handle: &Self::Handle) -> bool {
        handle.ping().await
    }
}
