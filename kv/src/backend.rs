// Copyright 2022 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::sync::Arc;

use async_trait::async_trait;
use fabric_core::connection::ManagedBackend;
use fabric_core::errors::FabricError;

use crate::driver::{KvConnection, RedisKvConnection};

/// The `ManagedBackend` the Connection Manager (C3) supervises for this Adapter: a Redis
/// endpoint reached through the stock crate's own reconnecting client. `kv` has no
/// long-lived subscriptions, so `SubscriptionSpec` is `()` and `resubscribe` stays the
/// trait's default no-op.
pub struct RedisKvBackend {
    redis_url: String,
}

impl RedisKvBackend {
    pub fn new(redis_url: impl Into<String>) -> Self {
        RedisKvBackend {
            redis_url: redis_url.into(),
        }
    }
}

#[async_trait]
impl ManagedBackend for RedisKvBackend {
    type Handle = Arc<dyn KvConnection>;
    type SubscriptionSpec = ();

    async fn connect(&self) -> Result<Self::Handle, FabricError> {
        let client = redis::Client::open(self.redis_url.clone())
            .map_err(|err| FabricError::Unavailable(format!("invalid redis url: {err}")))?;
        let manager = client
            .get_tokio_connection_manager()
            .await
            .map_err(|err| FabricError::Unavailable(format!("redis connect failed: {err}")))?;
        Ok(Arc::new(RedisKvConnection::new(manager)))
    }

    async fn probe_health(&self, handle: &Self::Handle) -> bool {
        handle.ping().await
    }
}
