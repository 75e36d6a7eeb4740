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
use fabric_proto::fabric::v1::analytical::analytical_server::Analytical;
use fabric_proto::fabric::v1::analytical::{
    AnalyticalQueryRequest, AnalyticalQueryResponse, AnalyticalRow, IngestRequest, IngestResponse,
};
use fabric_proto::fabric::v1::common::{Health, HealthCheckRequest, HealthCheckResponse};
use fabric_proto::fabric::v1::relational::query_param::Value as WireValue;
use fabric_proto::fabric::v1::relational::QueryParam;
use tonic::{Request, Response, Status};

use crate::backend::AnalyticalBackend;
use crate::driver::{self, QueryOutcome, ScalarValue};

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

fn outcome_to_rows(outcome: QueryOutcome) -> Vec<AnalyticalRow> {
    outcome
        .rows
        .into_iter()
        .map(|row| AnalyticalRow {
            columns: row
                .iter()
                .map(|(name, value)| (name.clone(), scalar_to_wire_param(value)))
                .collect(),
        })
        .collect()
}

fn wire_row_to_driver(row: &AnalyticalRow) -> driver::AnalyticalRow {
    row.columns
        .iter()
        .map(|(k, v)| (k.clone(), wire_param_to_scalar(v)))
        .collect()
}

/// Implements the `Analytical` and `Health` services via the Adapter Skeleton. Tenant
/// isolation is schema-level, same as `relational` (see that crate's DESIGN.md entry).
pub struct AnalyticalService {
    connections: ConnectionManager<AnalyticalBackend>,
    events: Arc<dyn DomainEventPublisher>,
}

impl AnalyticalService {
    pub fn new(
        connections: ConnectionManager<AnalyticalBackend>,
        events: Arc<dyn DomainEventPublisher>,
    ) -> Self {
        AnalyticalService { connections, events }
    }

    fn schema_name(&self, organization_id: &str, user_id: &str) -> Result<String, FabricError> {
        Ok(rewrite(BackendKind::Analytical, organization_id, user_id, "query")?.physical_namespace)
    }

    async fn publish_ingest_event(&self, organization_id: &str, table: &str, rows_ingested: u64) {
        let event = DomainEvent::new(
            "analytical",
            "analytical.ingest",
            table.to_owned(),
            serde_json::json!({ "organization_id": organization_id, "rows_ingested": rows_ingested }),
        );
        self.events.publish(event).await;
    }
}

#[tonic::async_trait]
impl Analytical for AnalyticalService {
    async fn query(
        &self,
        request: Request<AnalyticalQueryRequest>,
    ) -> Result<Response<AnalyticalQueryResponse>, Status> {
        let request = request.into_inner();
        let validated = validate_envelope(request.envelope.as_ref(), DEFAULT_UNARY_DEADLINE)?;
        let schema = self.schema_name(&validated.organization_id, &validated.user_id)?;
        let conn = self.connections.acquire()?;
        let params: Vec<ScalarValue> = request.params.iter().map(wire_param_to_scalar).collect();
        let outcome = retry_idempotent(|| {
            conn.query(&schema, &request.statement, &params, request.max_rows)
        })
        .await?;
        let has_next = outcome.has_next;
        Ok(Response::new(AnalyticalQueryResponse {
            metadata: Some(response_metadata(validated.trace_id)),
            rows: outcome_to_rows(outcome),
            has_next,
        }))
    }

    async fn ingest(
        &self,
        request: Request<IngestRequest>,
    ) -> Result<Response<IngestResponse>, Status> {
        let request = request.into_inner();
        let validated = validate_envelope(request.envelope.as_ref(), DEFAULT_UNARY_DEADLINE)?;
        let schema = self.schema_name(&validated.organization_id, &validated.user_id)?;
        let conn = self.connections.acquire()?;
        let rows: Vec<driver::AnalyticalRow> = request.rows.iter().map(wire_row_to_driver).collect();
        let rows_ingested = conn.ingest(&schema, &request.table, &rows).await?;
        self.publish_ingest_event(&validated.organization_id, &request.table, rows_ingested)
            .await;
        Ok(Response::new(IngestResponse {
            metadata: Some(response_metadata(validated.trace_id)),
            rows_ingested,
        }))
    }
}

/// The standard `Health` service every Adapter exposes (spec §4.4).
pub struct AnalyticalHealthService {
    connections: ConnectionManager<AnalyticalBackend>,
}

impl AnalyticalHealthService {
    pub fn new(connections: ConnectionManager<AnalyticalBackend>) -> Self {
        AnalyticalHealthService { connections }
    }
}

#[tonic::async_trait]
impl Health for AnalyticalHealthService {
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
