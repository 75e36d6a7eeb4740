// Copyright 2022 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::collections::HashMap;
use std::sync::Arc;

use fabric_core::connection::ConnectionManager;
use fabric_core::envelope::{validate_envelope, DEFAULT_UNARY_DEADLINE};
use fabric_core::errors::FabricError;
use fabric_core::events::{DomainEvent, DomainEventPublisher};
use fabric_core::health::health_check_response;
use fabric_core::retry::retry_idempotent;
use fabric_core::tenant::{rewrite, BackendKind};
use fabric_proto::fabric::v1::common::{Health, HealthCheckRequest, HealthCheckResponse};
use fabric_proto::fabric::v1::vectorstore::vector_store_server::VectorStore;
use fabric_proto::fabric::v1::vectorstore::{
    DeleteRequest, DeleteResponse, ScoredPoint, SearchRequest, SearchResponse, UpsertRequest,
    UpsertResponse, VectorPoint,
};
use tonic::{Request, Response, Status};

use crate::backend::VectorStoreBackend;
use crate::driver::{self, ScoredPoint as DriverScoredPoint};

fn response_metadata(trace_id: Option<String>) -> fabric_proto::fabric::v1::common::ResponseMetadata {
    fabric_proto::fabric::v1::common::ResponseMetadata {
        success: true,
        message: String::new(),
        error_code: String::new(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        trace_id: trace_id.unwrap_or_default(),
    }
}

fn wire_point_to_driver(point: &VectorPoint) -> driver::StoredPoint {
    driver::StoredPoint {
        id: point.id.clone(),
        vector: point.vector.clone(),
        payload: point.payload.clone(),
    }
}

fn driver_scored_to_wire(point: DriverScoredPoint) -> ScoredPoint {
    ScoredPoint {
        id: point.id,
        score: point.score,
        payload: point.payload,
    }
}

/// Implements the `VectorStore` and `Health` services via the Adapter Skeleton. Collection
/// names are tenant-rewritten the same way object-store bucket names are: the rewriter owns
/// the org boundary, the logical collection name passes through unchanged within it.
pub struct VectorStoreService {
    connections: ConnectionManager<VectorStoreBackend>,
    events: Arc<dyn DomainEventPublisher>,
}

impl VectorStoreService {
    pub fn new(
        connections: ConnectionManager<VectorStoreBackend>,
        events: Arc<dyn DomainEventPublisher>,
    ) -> Self {
        VectorStoreService { connections, events }
    }

    fn physical_collection(
        &self,
        organization_id: &str,
        user_id: &str,
        collection: &str,
    ) -> Result<String, FabricError> {
        Ok(rewrite(BackendKind::VectorStore, organization_id, user_id, collection)?.physical_name)
    }

    async fn publish_write_event(&self, organization_id: &str, event_type: &str, collection: &str, count: u64) {
        let event = DomainEvent::new(
            "vectorstore",
            event_type,
            collection.to_owned(),
            serde_json::json!({ "organization_id": organization_id, "count": count }),
        );
        self.events.publish(event).await;
    }
}

#[tonic::async_trait]
impl VectorStore for VectorStoreService {
    async fn upsert(
        &self,
        request: Request<UpsertRequest>,
    ) -> Result<Response<UpsertResponse>, Status> {
        let request = request.into_inner();
        let validated = validate_envelope(request.envelope.as_ref(), DEFAULT_UNARY_DEADLINE)?;
        let collection = self.physical_collection(
            &validated.organization_id,
            &validated.user_id,
            &request.collection,
        )?;
        let conn = self.connections.acquire()?;
        let points: Vec<driver::StoredPoint> = request.points.iter().map(wire_point_to_driver).collect();
        let upserted = conn.upsert(&collection, &points).await?;
        self.publish_write_event(&validated.organization_id, "vectorstore.upsert", &collection, upserted)
            .await;
        Ok(Response::new(UpsertResponse {
            metadata: Some(response_metadata(validated.trace_id)),
            upserted,
        }))
    }

    async fn search(
        &self,
        request: Request<SearchRequest>,
    ) -> Result<Response<SearchResponse>, Status> {
        let request = request.into_inner();
        let validated = validate_envelope(request.envelope.as_ref(), DEFAULT_UNARY_DEADLINE)?;
        let collection = self.physical_collection(
            &validated.organization_id,
            &validated.user_id,
            &request.collection,
        )?;
        let conn = self.connections.acquire()?;
        let results = retry_idempotent(|| {
            conn.search(&collection, &request.query_vector, request.limit, request.score_threshold)
        })
        .await?;
        Ok(Response::new(SearchResponse {
            metadata: Some(response_metadata(validated.trace_id)),
            results: results.into_iter().map(driver_scored_to_wire).collect(),
        }))
    }

    async fn delete(
        &self,
        request: Request<DeleteRequest>,
    ) -> Result<Response<DeleteResponse>, Status> {
        let request = request.into_inner();
        let validated = validate_envelope(request.envelope.as_ref(), DEFAULT_UNARY_DEADLINE)?;
        let collection = self.physical_collection(
            &validated.organization_id,
            &validated.user_id,
            &request.collection,
        )?;
        let conn = self.connections.acquire()?;
        let deleted = conn.delete(&collection, &request.ids).await?;
        if deleted > 0 {
            self.publish_write_event(&validated.organization_id, "vectorstore.delete", &collection, deleted)
                .await;
        }
        Ok(Response::new(DeleteResponse {
            metadata: Some(response_metadata(validated.trace_id)),
            deleted,
        }))
    }
}

/// The standard `Health` service every Adapter exposes (spec §4.4).
pub struct VectorStoreHealthService {
    connections: ConnectionManager<VectorStoreBackend>,
}

impl VectorStoreHealthService {
    pub fn new(connections: ConnectionManager<VectorStoreBackend>) -> Self {
        VectorStoreHealthService { connections }
    }
}

#[tonic::async_trait]
impl Health for VectorStoreHealthService {
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
