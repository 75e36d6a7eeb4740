// Copyright 2022 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::collections::HashMap;
use std::pin::Pin;

use fabric_core::connection::ConnectionManager;
use fabric_core::envelope::{validate_envelope, DEFAULT_UNARY_DEADLINE};
use fabric_core::health::health_check_response;
use fabric_core::tenant::{rewrite, rewrite_subscription_filter, BackendKind};
use fabric_proto::fabric::v1::common::{Health, HealthCheckRequest, HealthCheckResponse};
use fabric_proto::fabric::v1::pubsub::pub_sub_server::PubSub;
use fabric_proto::fabric::v1::pubsub::{
    Message, PublishRequest, PublishResponse, SubscribeRequest,
};
use futures::Stream;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tonic::{Request, Response, Status};

use crate::backend::PubSubBackend;

fn response_metadata(trace_id: Option<String>) -> fabric_proto::fabric::v1::common::ResponseMetadata {
    fabric_proto::fabric::v1::common::ResponseMetadata {
        success: true,
        message: String::new(),
        error_code: String::new(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        trace_id: trace_id.unwrap_or_default(),
    }
}

/// Implements the `PubSub` and `Health` services through the Adapter Skeleton. This is the
/// one Adapter whose own `Publish` RPC is, in production, the destination of every other
/// Adapter's best-effort domain-event publication (`fabric_core::events::PubsubEventPublisher`
/// talks to it over the generated client only, per spec §9's cyclic-dependency rule).
pub struct PubSubService {
    connections: ConnectionManager<PubSubBackend>,
}

impl PubSubService {
    pub fn new(connections: ConnectionManager<PubSubBackend>) -> Self {
        PubSubService { connections }
    }
}

#[tonic::async_trait]
impl PubSub for PubSubService {
    async fn publish(
        &self,
        request: Request<PublishRequest>,
    ) -> Result<Response<PublishResponse>, Status> {
        let request = request.into_inner();
        let validated = validate_envelope(request.envelope.as_ref(), DEFAULT_UNARY_DEADLINE)?;
        let subject = rewrite(
            BackendKind::PubSub,
            &validated.organization_id,
            &validated.user_id,
            &request.subject,
        )?
        .physical_name;
        let conn = self.connections.acquire()?;
        let message_id = conn.publish(&subject, &request.payload).await?;
        Ok(Response::new(PublishResponse {
            metadata: Some(response_metadata(validated.trace_id)),
            message_id,
        }))
    }

    type SubscribeStream = Pin<Box<dyn Stream<Item = Result<Message, Status>> + Send>>;

    async fn subscribe(
        &self,
        request: Request<SubscribeRequest>,
    ) -> Result<Response<Self::SubscribeStream>, Status> {
        let request = request.into_inner();
        let validated = validate_envelope(request.envelope.as_ref(), DEFAULT_UNARY_DEADLINE)?;
        let filter = rewrite_subscription_filter(
            BackendKind::PubSub,
            &validated.organization_id,
            &request.subject,
        )?
        .physical_name;
        let conn = self.connections.acquire()?;
        let receiver = conn.subscribe(&filter).await?;

        let stream = ReceiverStream::new(receiver).map(|message| {
            Ok(Message {
                metadata: Some(response_metadata(None)),
                subject: message.subject,
                payload: message.payload,
                message_id: message.message_id,
            })
        });

        Ok(Response::new(Box::pin(stream)))
    }
}

/// The standard `Health` service every Adapter exposes (spec §4.4).
pub struct PubSubHealthService {
    connections: ConnectionManager<PubSubBackend>,
}

impl PubSubHealthService {
    pub fn new(connections: ConnectionManager<PubSubBackend>) -> Self {
        PubSubHealthService { connections }
    }
}

#[tonic::async_trait]
impl Health for PubSubHealthService {
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
