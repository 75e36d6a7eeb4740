// Copyright 2022 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;

use fabric_core::connection::ConnectionManager;
use fabric_core::envelope::{validate_envelope, DEFAULT_UNARY_DEADLINE};
use fabric_core::events::{DomainEvent, DomainEventPublisher};
use fabric_core::health::health_check_response;
use fabric_proto::fabric::v1::common::{Health, HealthCheckRequest, HealthCheckResponse};
use fabric_proto::fabric::v1::logstore::log_store_server::LogStore;
use fabric_proto::fabric::v1::logstore::{
    AppendRequest, AppendResponse, LogLine as WireLogLine, QueryRequest, QueryResponse,
    TailRequest,
};
use futures::Stream;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tonic::{Request, Response, Status};

use crate::backend::LogStoreBackend;
use crate::driver::LogLine;

fn response_metadata(trace_id: Option<String>) -> fabric_proto::fabric::v1::common::ResponseMetadata {
    fabric_proto::fabric::v1::common::ResponseMetadata {
        success: true,
        message: String::new(),
        error_code: String::new(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        trace_id: trace_id.unwrap_or_default(),
    }
}

fn wire_to_line(line: WireLogLine) -> LogLine {
    LogLine {
        timestamp_unix_millis: line.timestamp_unix_millis,
        body: line.body,
        labels: line.labels,
    }
}

fn line_to_wire(line: LogLine) -> WireLogLine {
    WireLogLine {
        timestamp_unix_millis: line.timestamp_unix_millis,
        body: line.body,
        labels: line.labels,
    }
}

/// Implements the `LogStore` and `Health` services through the Adapter Skeleton. Unlike the
/// other verb RPCs in this fabric, `logstore`'s requests carry no per-call logical resource
/// name (spec's `AppendRequest`/`QueryRequest`/`TailRequest` only name labels), so tenant
/// isolation is done by partitioning directly on `organization_id` rather than through
/// `fabric_core::tenant::rewrite`.
pub struct LogStoreService {
    connections: ConnectionManager<LogStoreBackend>,
    events: Arc<dyn DomainEventPublisher>,
}

impl LogStoreService {
    pub fn new(
        connections: ConnectionManager<LogStoreBackend>,
        events: Arc<dyn DomainEventPublisher>,
    ) -> Self {
        LogStoreService { connections, events }
    }

    async fn publish_append_event(&self, organization_id: &str, appended: u64) {
        let event = DomainEvent::new(
            "logstore",
            "logstore.append",
            organization_id,
            serde_json::json!({ "appended": appended }),
        );
        self.events.publish(event).await;
    }
}

#[tonic::async_trait]
impl LogStore for LogStoreService {
    async fn append(
        &self,
        request: Request<AppendRequest>,
    ) -> Result<Response<AppendResponse>, Status> {
        let request = request.into_inner();
        let validated = validate_envelope(request.envelope.as_ref(), DEFAULT_UNARY_DEADLINE)?;
        let conn = self.connections.acquire()?;
        let lines: Vec<LogLine> = request.lines.into_iter().map(wire_to_line).collect();
        let appended = conn
            .append(&validated.organization_id, lines)
            .await?;

        self.publish_append_event(&validated.organization_id, appended)
            .await;

        Ok(Response::new(AppendResponse {
            metadata: Some(response_metadata(validated.trace_id)),
            appended,
        }))
    }

    async fn query(
        &self,
        request: Request<QueryRequest>,
    ) -> Result<Response<QueryResponse>, Status> {
        let request = request.into_inner();
        let validated = validate_envelope(request.envelope.as_ref(), DEFAULT_UNARY_DEADLINE)?;
        let conn = self.connections.acquire()?;
        let (lines, has_next) = conn
            .query(
                &validated.organization_id,
                &request.label_filter,
                request.start_unix_millis,
                request.end_unix_millis,
                request.max_rows,
            )
            .await?;

        Ok(Response::new(QueryResponse {
            metadata: Some(response_metadata(validated.trace_id)),
            lines: lines.into_iter().map(line_to_wire).collect(),
            has_next,
        }))
    }

    type TailStream = Pin<Box<dyn Stream<Item = Result<WireLogLine, Status>> + Send>>;

    async fn tail(
        &self,
        request: Request<TailRequest>,
    ) -> Result<Response<Self::TailStream>, Status> {
        let request = request.into_inner();
        let validated = validate_envelope(request.envelope.as_ref(), DEFAULT_UNARY_DEADLINE)?;
        let conn = self.connections.acquire()?;
        let receiver = conn
            .tail(&validated.organization_id, request.label_filter)
            .await?;

        let stream = ReceiverStream::new(receiver).map(|line| Ok(line_to_wire(line)));
        Ok(Response::new(Box::pin(stream)))
    }
}

/// The standard `Health` service every Adapter exposes (spec §4.4).
pub struct LogStoreHealthService {
    connections: ConnectionManager<LogStoreBackend>,
}

impl LogStoreHealthService {
    pub fn new(connections: ConnectionManager<LogStoreBackend>) -> Self {
        LogStoreHealthService { connections }
    }
}

#[tonic::async_trait]
impl Health for LogStoreHealthService {
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
