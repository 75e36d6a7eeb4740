// Copyright 2022 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The Event Publisher Hook (C8, spec §4.8): best-effort emission of a `DomainEvent` for
//! state-changing verbs, after the backend has acknowledged. Talks to the `pubsub` Adapter
//! through its generated gRPC client only — never the pub/sub driver's concrete types, so no
//! Adapter crate depends on another Adapter's internals (spec §9 "cyclic dependency
//! avoidance").

use async_trait::async_trait;
use chrono::Utc;
use fabric_proto::fabric::v1::common::Envelope;
use fabric_proto::fabric::v1::pubsub::{pub_sub_client::PubSubClient, PublishRequest, QoS};
use ginepro::LoadBalancedChannel;
use serde::Serialize;
use tonic::Request;

/// `{type, source_adapter, subject, timestamp, attributes}` of spec §3/§6, serialized as the
/// pub/sub publish payload.
#[derive(Clone, Debug, Serialize)]
pub struct DomainEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub source_adapter: String,
    pub subject: String,
    pub timestamp: String,
    pub attributes: serde_json::Value,
}

impl DomainEvent {
    pub fn new(
        source_adapter: impl Into<String>,
        event_type: impl Into<String>,
        subject: impl Into<String>,
        attributes: serde_json::Value,
    ) -> Self {
        DomainEvent {
            id: uuid::Uuid::new_v4().to_string(),
            event_type: event_type.into(),
            source_adapter: source_adapter.into(),
            subject: subject.into(),
            timestamp: Utc::now().to_rfc3339(),
            attributes,
        }
    }
}

/// Publishes `DomainEvent`s onto a best-effort out-of-band channel. The Adapter never waits
/// for delivery confirmation and never fails an RPC because publication failed.
#[async_trait]
pub trait DomainEventPublisher: Send + Sync {
    async fn publish(&self, event: DomainEvent);
}

/// Publishes onto the `pubsub` Adapter's `Publish` RPC, on the subject `event.event_type`
/// (spec §6 "published on a subject derived from `source_adapter.event_kind`"). Callers
/// already construct `event_type` as `source_adapter.event_kind` (e.g. `"kv.set"`), so the
/// subject is used as-is rather than prefixed again here.
pub struct PubsubEventPublisher {
    client: PubSubClient<LoadBalancedChannel>,
}

impl PubsubEventPublisher {
    pub fn new(channel: LoadBalancedChannel) -> Self {
        PubsubEventPublisher {
            client: PubSubClient::new(channel),
        }
    }
}

#[async_trait]
impl DomainEventPublisher for PubsubEventPublisher {
    async fn publish(&self, event: DomainEvent) {
        let payload = match serde_json::to_vec(&event) {
            Ok(bytes) => bytes,
            Err(err) => {
                log::warn!("failed to serialize domain event, dropping it: {err}");
                return;
            }
        };

        let subject = event.event_type.clone();

        let request = PublishRequest {
            envelope: Some(Envelope {
                user_id: "fabric-core".to_owned(),
                organization_id: "fabric-core".to_owned(),
                trace_id: String::new(),
                deadline_unix_millis: 0,
            }),
            subject,
            payload,
            qos: QoS::AtMostOnce as i32,
        };

        let mut client = self.client.clone();
        if let Err(status) = client.publish(Request::new(request)).await {
            // Best-effort per spec §4.8: log and drop, never retried, never surfaced to the
            // caller whose RPC already returned.
            log::warn!("failed to publish domain event {}: {status}", event.id);
        }
    }
}

/// No-op publisher for Adapters or tests that do not wire an event bus connection.
pub struct NoopEventPublisher;

#[async_trait]
impl DomainEventPublisher for NoopEventPublisher {
    async fn publish(&self, _event: DomainEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_publisher_never_panics_on_any_event() {
        let publisher = NoopEventPublisher;
        publisher
            .publish(DomainEvent::new(
                "kv",
                "kv.set",
                "acme:profile",
                serde_json::json!({"size_bytes": 12}),
            ))
            .await;
    }

    #[test]
    fn domain_event_subject_convention() {
        // Call sites already pass a pre-prefixed event_type (source_adapter.event_kind), so
        // the publish subject must equal it verbatim rather than being prefixed again.
        let event = DomainEvent::new("kv", "kv.set", "acme:profile", serde_json::json!({}));
        assert_eq!(event.event_type, "kv.set");
    }
}
