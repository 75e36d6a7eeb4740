// Copyright 2022 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::collections::HashMap;
use std::sync::Arc;

use fabric_core::connection::ConnectionManager;
use fabric_core::envelope::{validate_envelope, DEFAULT_UNARY_DEADLINE};
use fabric_core::errors::FabricError;
use fabric_core::events::DomainEvent;
use fabric_core::events::DomainEventPublisher;
use fabric_core::health::health_check_response;
use fabric_core::retry::retry_idempotent;
use fabric_core::tenant::{rewrite, BackendKind};
use fabric_proto::fabric::v1::common::{Health, HealthCheckRequest, HealthCheckResponse};
use fabric_proto::fabric::v1::kv::key_value_server::KeyValue;
use fabric_proto::fabric::v1::kv::{
    DeleteRequest, DeleteResponse, ExistsRequest, ExistsResponse, GetRequest, GetResponse,
    HashGetAllRequest, HashGetAllResponse, HashSetRequest, HashSetResponse, IncrementRequest,
    IncrementResponse, SetRequest, SetResponse,
};
use tonic::{Request, Response, Status};

use crate::backend::RedisKvBackend;

fn response_metadata(trace_id: Option<String>) -> fabric_proto::fabric::v1::common::ResponseMetadata {
    fabric_proto::fabric::v1::common::ResponseMetadata {
        success: true,
        message: String::new(),
        error_code: String::new(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        trace_id: trace_id.unwrap_or_default(),
    }
}

/// Implements the `KeyValue` and `Health` services by running every inbound call through
/// the Adapter Skeleton (spec §4.5): validate envelope, rewrite the tenant name, acquire
/// the connection, dispatch, map errors, best-effort publish a domain event for writes.
pub struct KvService {
    connections: ConnectionManager<RedisKvBackend>,
    events: Arc<dyn DomainEventPublisher>,
}

impl KvService {
    pub fn new(
        connections: ConnectionManager<RedisKvBackend>,
        events: Arc<dyn DomainEventPublisher>,
    ) -> Self {
        KvService {
            connections,
            events,
        }
    }

    fn physical_key(
        &self,
        organization_id: &str,
        user_id: &str,
        logical_key: &str,
    ) -> Result<String, FabricError> {
        Ok(rewrite(BackendKind::KeyValue, organization_id, user_id, logical_key)?.physical_name)
    }

    async fn publish_write_event(&self, organization_id: &str, event_type: &str, key: &str) {
        let event = DomainEvent::new(
            "kv",
            event_type,
            key.to_owned(),
            serde_json::json!({ "organization_id": organization_id }),
        );
        self.events.publish(event).await;
    }
}

#[tonic::async_trait]
impl KeyValue for KvService {
    async fn set(&self, request: Request<SetRequest>) -> Result<Response<SetResponse>, Status> {
        let request = request.into_inner();
        let validated = validate_envelope(request.envelope.as_ref(), DEFAULT_UNARY_DEADLINE)?;
        let key = self.physical_key(&validated.organization_id, &validated.user_id, &request.key)?;
        let conn = self.connections.acquire()?;
        conn.set(&key, &request.value, request.ttl_seconds).await?;
        self.publish_write_event(&validated.organization_id, "kv.set", &key)
            .await;
        Ok(Response::new(SetResponse {
            metadata: Some(response_metadata(validated.trace_id)),
        }))
    }

    async fn get(&self, request: Request<GetRequest>) -> Result<Response<GetResponse>, Status> {
        let request = request.into_inner();
        let validated = validate_envelope(request.envelope.as_ref(), DEFAULT_UNARY_DEADLINE)?;
        let key = self.physical_key(&validated.organization_id, &validated.user_id, &request.key)?;
        let conn = self.connections.acquire()?;
        let value = retry_idempotent(|| conn.get(&key)).await?;
        Ok(Response::new(GetResponse {
            metadata: Some(response_metadata(validated.trace_id)),
            found: value.is_some(),
            value: value.unwrap_or_default(),
        }))
    }

    async fn delete(
        &self,
        request: Request<DeleteRequest>,
    ) -> Result<Response<DeleteResponse>, Status> {
        let request = request.into_inner();
        let validated = validate_envelope(request.envelope.as_ref(), DEFAULT_UNARY_DEADLINE)?;
        let key = self.physical_key(&validated.organization_id, &validated.user_id, &request.key)?;
        let conn = self.connections.acquire()?;
        let existed = conn.delete(&key).await?;
        if existed {
            self.publish_write_event(&validated.organization_id, "kv.delete", &key)
                .await;
        }
        Ok(Response::new(DeleteResponse {
            metadata: Some(response_metadata(validated.trace_id)),
            existed,
        }))
    }

    async fn exists(
        &self,
        request: Request<ExistsRequest>,
    ) -> Result<Response<ExistsResponse>, Status> {
        let request = request.into_inner();
        let validated = validate_envelope(request.envelope.as_ref(), DEFAULT_UNARY_DEADLINE)?;
        let key = self.physical_key(&validated.organization_id, &validated.user_id, &request.key)?;
        let conn = self.connections.acquire()?;
        let exists = retry_idempotent(|| conn.exists(&key)).await?;
        Ok(Response::new(ExistsResponse {
            metadata: Some(response_metadata(validated.trace_id)),
            exists,
        }))
    }

    async fn increment(
        &self,
        request: Request<IncrementRequest>,
    ) -> Result<Response<IncrementResponse>, Status> {
        let request = request.into_inner();
        let validated = validate_envelope(request.envelope.as_ref(), DEFAULT_UNARY_DEADLINE)?;
        let key = self.physical_key(&validated.organization_id, &validated.user_id, &request.key)?;
        let conn = self.connections.acquire()?;
        let value = conn.increment(&key, request.delta).await?;
        self.publish_write_event(&validated.organization_id, "kv.increment", &key)
            .await;
        Ok(Response::new(IncrementResponse {
            metadata: Some(response_metadata(validated.trace_id)),
            value,
        }))
    }

    async fn hash_set(
        &self,
        request: Request<HashSetRequest>,
    ) -> Result<Response<HashSetResponse>, Status> {
        let request = request.into_inner();
        let validated = validate_envelope(request.envelope.as_ref(), DEFAULT_UNARY_DEADLINE)?;
        let key = self.physical_key(&validated.organization_id, &validated.user_id, &request.key)?;
        let conn = self.connections.acquire()?;
        let fields: HashMap<String, Vec<u8>> = request.fields;
        conn.hash_set(&key, &fields).await?;
        self.publish_write_event(&validated.organization_id, "kv.hash_set", &key)
            .await;
        Ok(Response::new(HashSetResponse {
            metadata: Some(response_metadata(validated.trace_id)),
        }))
    }

    async fn hash_get_all(
        &self,
        request: Request<HashGetAllRequest>,
    ) -> Result<Response<HashGetAllResponse>, Status> {
        let request = request.into_inner();
        let validated = validate_envelope(request.envelope.as_ref(), DEFAULT_UNARY_DEADLINE)?;
        let key = self.physical_key(&validated.organization_id, &validated.user_id, &request.key)?;
        let conn = self.connections.acquire()?;
        let fields = retry_idempotent(|| conn.hash_get_all(&key)).await?;
        Ok(Response::new(HashGetAllResponse {
            metadata: Some(response_metadata(validated.trace_id)),
            found: fields.is_some(),
            fields: fields.unwrap_or_default(),
        }))
    }
}

/// The standard `Health` service every Adapter exposes (spec §4.4), backed by this
/// Adapter's own `ConnectionManager`.
pub struct KvHealthService {
    connections: ConnectionManager<RedisKvBackend>,
}

impl KvHealthService {
    pub fn new(connections: ConnectionManager<RedisKvBackend>) -> Self {
        KvHealthService { connections }
    }
}

#[tonic::async_trait]
impl Health for KvHealthService {
    async fn health_check(
        &self,
        _request: Request<HealthCheckRequest>,
    ) -> Result<Response<HealthCheckResponse>, Status> {
        let snapshot = self.connections.health_snapshot();
        Ok(Response::new(health_check_response(
            &snapshot,
            HashMap::new(),
        )))
    }
}
