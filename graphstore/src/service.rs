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
use fabric_proto::fabric::v1::graphstore::graph_store_server::GraphStore;
use fabric_proto::fabric::v1::graphstore::{
    CreateEdgeRequest, CreateEdgeResponse, CreateNodeRequest, CreateNodeResponse, GraphRow,
    RunQueryRequest, RunQueryResponse,
};
use fabric_proto::fabric::v1::relational::query_param::Value as WireValue;
use fabric_proto::fabric::v1::relational::QueryParam;
use tonic::{Request, Response, Status};

use crate::backend::GraphStoreBackend;
use crate::driver::{PropertyMap, QueryOutcome, ScalarValue};

fn response_metadata(trace_id: Option<String>) -> fabric_proto::fabric::v1::common::ResponseMetadata {
    fabric_proto::fabric::v1::common::ResponseMetadata {
        success: true,
        message: String::new(),
        error_code: String::new(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        trace_id: trace_id.unwrap_or_default(),
    }
}

fn wire_param_to_scalar(param: &QueryParam) -> ScalarValue {
    match &param.value {
        Some(WireValue::StringValue(v)) => ScalarValue::Str(v.clone()),
        Some(WireValue::IntValue(v)) => ScalarValue::Int(*v),
        Some(WireValue::DoubleValue(v)) => ScalarValue::Double(*v),
        Some(WireValue::BoolValue(v)) => ScalarValue::Bool(*v),
        Some(WireValue::BytesValue(v)) => ScalarValue::Bytes(v.clone()),
        None => ScalarValue::Str(String::new()),
    }
}

fn scalar_to_wire_param(value: &ScalarValue) -> QueryParam {
    let wire = match value {
        ScalarValue::Str(v) => WireValue::StringValue(v.clone()),
        ScalarValue::Int(v) => WireValue::IntValue(*v),
        ScalarValue::Double(v) => WireValue::DoubleValue(*v),
        ScalarValue::Bool(v) => WireValue::BoolValue(*v),
        ScalarValue::Bytes(v) => WireValue::BytesValue(v.clone()),
    };
    QueryParam { value: Some(wire) }
}

fn wire_properties_to_map(properties: &HashMap<String, QueryParam>) -> PropertyMap {
    properties
        .iter()
        .map(|(k, v)| (k.clone(), wire_param_to_scalar(v)))
        .collect()
}

fn outcome_to_rows(outcome: QueryOutcome) -> Vec<GraphRow> {
    outcome
        .rows
        .into_iter()
        .map(|row| GraphRow {
            columns: row
                .iter()
                .map(|(name, value)| (name.clone(), scalar_to_wire_param(value)))
                .collect(),
        })
        .collect()
}

/// Implements the `GraphStore` and `Health` services via the Adapter Skeleton. Node and edge
/// ids are opaque UUIDs minted by the driver; tenant isolation follows the same schema-level
/// pattern as the `relational` Adapter (see its DESIGN.md entry for the rationale).
pub struct GraphStoreService {
    connections: ConnectionManager<GraphStoreBackend>,
    events: Arc<dyn DomainEventPublisher>,
}

impl GraphStoreService {
    pub fn new(
        connections: ConnectionManager<GraphStoreBackend>,
        events: Arc<dyn DomainEventPublisher>,
    ) -> Self {
        GraphStoreService { connections, events }
    }

    fn schema_name(&self, organization_id: &str, user_id: &str) -> Result<String, FabricError> {
        Ok(rewrite(BackendKind::GraphStore, organization_id, user_id, "query")?.physical_namespace)
    }

    async fn publish_event(&self, organization_id: &str, event_type: &str, subject: &str) {
        let event = DomainEvent::new(
            "graphstore",
            event_type,
            subject.to_owned(),
            serde_json::json!({ "organization_id": organization_id }),
        );
        self.events.publish(event).await;
    }
}

#[tonic::async_trait]
impl GraphStore for GraphStoreService {
    async fn create_node(
        &self,
        request: Request<CreateNodeRequest>,
    ) -> Result<Response<CreateNodeResponse>, Status> {
        let request = request.into_inner();
        let validated = validate_envelope(request.envelope.as_ref(), DEFAULT_UNARY_DEADLINE)?;
        let schema = self.schema_name(&validated.organization_id, &validated.user_id)?;
        let conn = self.connections.acquire()?;
        let properties = wire_properties_to_map(&request.properties);
        let node_id = conn.create_node(&schema, &request.label, &properties).await?;
        self.publish_event(&validated.organization_id, "graphstore.create_node", &node_id)
            .await;
        Ok(Response::new(CreateNodeResponse {
            metadata: Some(response_metadata(validated.trace_id)),
            node_id,
        }))
    }

    async fn create_edge(
        &self,
        request: Request<CreateEdgeRequest>,
    ) -> Result<Response<CreateEdgeResponse>, Status> {
        let request = request.into_inner();
        let validated = validate_envelope(request.envelope.as_ref(), DEFAULT_UNARY_DEADLINE)?;
        let schema = self.schema_name(&validated.organization_id, &validated.user_id)?;
        let conn = self.connections.acquire()?;
        let properties = wire_properties_to_map(&request.properties);
        let edge_id = conn
            .create_edge(
                &schema,
                &request.from_node_id,
                &request.to_node_id,
                &request.edge_label,
                &properties,
            )
            .await?;
        self.publish_event(&validated.organization_id, "graphstore.create_edge", &edge_id)
            .await;
        Ok(Response::new(CreateEdgeResponse {
            metadata: Some(response_metadata(validated.trace_id)),
            edge_id,
        }))
    }

    async fn run_query(
        &self,
        request: Request<RunQueryRequest>,
    ) -> Result<Response<RunQueryResponse>, Status> {
        let request = request.into_inner();
        let validated = validate_envelope(request.envelope.as_ref(), DEFAULT_UNARY_DEADLINE)?;
        let schema = self.schema_name(&validated.organization_id, &validated.user_id)?;
        let conn = self.connections.acquire()?;
        let params = wire_properties_to_map(&request.params);
        let outcome =
            retry_idempotent(|| conn.run_query(&schema, &request.query, &params, request.max_rows))
                .await?;
        let has_next = outcome.has_next;
        Ok(Response::new(RunQueryResponse {
            metadata: Some(response_metadata(validated.trace_id)),
            rows: outcome_to_rows(outcome),
            has_next,
        }))
    }
}

/// The standard `Health` service every Adapter exposes (spec §4.4).
pub struct GraphStoreHealthService {
    connections: ConnectionManager<GraphStoreBackend>,
}

impl GraphStoreHealthService {
    pub fn new(connections: ConnectionManager<GraphStoreBackend>) -> Self {
        GraphStoreHealthService { connections }
    }
}

#[tonic::async_trait]
impl Health for GraphStoreHealthService {
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
