// Copyright 2022 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::sync::Arc;

use fabric_core::connection::ManagedBackend;
use fabric_core::errors::FabricError;
use tonic::async_trait;

use crate::driver::{AnyRelationalConnection, RelationalConnection};

/// Plugs `AnyRelationalConnection` into the Connection Manager. `database_url` points at the
/// tenant-shared database; per-tenant isolation is schema-level (spec §4.2), applied by the
/// service layer qualifying every statement's namespace rather than by this backend opening
/// one pool per tenant.
pub struct RelationalBackend {
    database_url: String,
}

impl RelationalBackend {
    pub fn new(database_url: String) -> Self {
        RelationalBackend { database_url }
    }
}

#[async_trait]
impl ManagedBackend for RelationalBackend {
    type Handle = Arc<dyn RelationalConnection>;
    type SubscriptionSpec = ();

    async fn connect(&self) -> Result<Self::Handle, FabricError> {
        let conn = AnyRelationalConnection::connect(&self.database_url)
            .await
            .map_err(FabricError::from)?;
        Ok(Arc::new(conn))
    }

    async fn probe_health(&self, handle: &Self::Handle) -> bool {
        handle.ping().await
    }
}
