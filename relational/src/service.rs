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
use fabric_proto::fabric::v1::relational::query_param::Value as WireValue;
use fabric_proto::fabric::v1::relational::relational_server::Relational;
use fabric_proto::fabric::v1::relational::{
    ExecuteRequest, ExecuteResponse, QueryParam, QueryRequest, QueryResponse, Row,
};
use tonic::{Request, Response, Status};

use crate::backend::RelationalBackend;
use crate::driver::{QueryOutcome, ScalarValue};

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

fn outcome_to_rows(outcome: QueryOutcome) -> Vec<Row> {
    outcome
        .rows
        .into_iter()
        .map(|row| Row {
            columns: row
                .iter()
                .map(|(name, value)| (name.clone(), scalar_to_wire_param(value)))
                .collect(),
        })
        .collect()
}

/// Implements the `Relational` and `Health` services via the Adapter Skeleton. Tenant
/// isolation here is schema-level (spec §4.2): the rewriter yields a `tenant_{org}` schema
/// name, which the driver scopes every statement to via `SET search_path` before running
/// the caller's statement (I1), and which is also attached to published events and logs for
/// operator-facing attribution.
pub struct RelationalService {
    connections: ConnectionManager<RelationalBackend>,
    events: Arc<dyn DomainEventPublisher>,
}

impl RelationalService {
    pub fn new(
        connections: ConnectionManager<RelationalBackend>,
        events: Arc<dyn DomainEventPublisher>,
    ) -> Self {
        RelationalService { connections, events }
    }

    fn schema_name(&self, organization_id: &str, user_id: &str) -> Result<String, FabricError> {
        Ok(rewrite(BackendKind::Relational, organization_id, user_id, "query")?.physical_namespace)
    }

    async fn publish_write_event(&self, organization_id: &str, event_type: &str, rows_affected: u64) {
        let event = DomainEvent::new(
            "relational",
            event_type,
            organization_id.to_owned(),
            serde_json::json!({ "organization_id": organization_id, "rows_affected": rows_affected }),
        );
        self.events.publish(event).await;
    }
}

#[tonic::async_trait]
impl Relational for RelationalService {
    async fn query(
        &self,
        request: Request<QueryRequest>,
    ) -> Result<Response<QueryResponse>, Status> {
        let request = request.into_inner();
        let validated = validate_envelope(request.envelope.as_ref(), DEFAULT_UNARY_DEADLINE)?;
        let schema = self.schema_name(&validated.organization_id, &validated.user_id)?;
        let conn = self.connections.acquire()?;
        let params: Vec<ScalarValue> = request.params.iter().map(wire_param_to_scalar).collect();
        let outcome = retry_idempotent(|| conn.query(&schema, &request.statement, &params, request.max_rows))
            .await?;
        let has_next = outcome.has_next;
        Ok(Response::new(QueryResponse {
            metadata: Some(response_metadata(validated.trace_id)),
            rows: outcome_to_rows(outcome),
            has_next,
        }))
    }

    async fn execute(
        &self,
        request: Request<ExecuteRequest>,
    ) -> Result<Response<ExecuteResponse>, Status> {
        let request = request.into_inner();
        let validated = validate_envelope(request.envelope.as_ref(), DEFAULT_UNARY_DEADLINE)?;
        let schema = self.schema_name(&validated.organization_id, &validated.user_id)?;
        let conn = self.connections.acquire()?;
        let params: Vec<ScalarValue> = request.params.iter().map(wire_param_to_scalar).collect();
        let rows_affected = conn.execute(&schema, &request.statement, &params).await?;
        self.publish_write_event(&validated.organization_id, "relational.execute", rows_affected)
            .await;
        Ok(Response::new(ExecuteResponse {
            metadata: Some(response_metadata(validated.trace_id)),
            rows_affected,
        }))
    }
}

/// The standard `Health` service every Adapter exposes (spec §4.4).
pub struct RelationalHealthService {
    connections: ConnectionManager<RelationalBackend>,
}

impl RelationalHealthService {
    pub fn new(connections: ConnectionManager<RelationalBackend>) -> Self {
        RelationalHealthService { connections }
    }
}

#[tonic::async_trait]
impl Health for RelationalHealthService {
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
