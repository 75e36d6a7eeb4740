// Copyright 2022 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::DeviceMessagingError;

const SUBSCRIBER_CHANNEL_CAPACITY: usize = 256;

#[derive(Clone, Debug)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub message_id: String,
}

/// Matches a concrete, slash-segmented `topic` against an MQTT-style `filter`: `+` stands for
/// exactly one segment, a trailing `#` stands for one or more trailing segments (spec's
/// device-messaging backend follows MQTT topic syntax, as opposed to `pubsub`'s single-`*`
/// token convention).
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let filter_segments: Vec<&str> = filter.split('/').collect();
    let topic_segments: Vec<&str> = topic.split('/').collect();

    let mut fi = 0;
    let mut ti = 0;
    while fi < filter_segments.len() {
        match filter_segments[fi] {
            "#" => return fi == filter_segments.len() - 1 && ti < topic_segments.len(),
            "+" => {
                if ti >= topic_segments.len() {
                    return false;
                }
                fi += 1;
                ti += 1;
            }
            segment => {
                if ti >= topic_segments.len() || topic_segments[ti] != segment {
                    return false;
                }
                fi += 1;
                ti += 1;
            }
        }
    }
    ti == topic_segments.len()
}

/// The device-messaging backend (spec §4.2's MQTT-shaped broker): publish/subscribe plus
/// last-value "retain" semantics, where a new subscriber immediately receives the most
/// recently retained message for any topic matching its filter.
#[async_trait]
pub trait DeviceMessagingConnection: Send + Sync {
    async fn publish(&self, topic: &str, payload: &[u8], retain: bool) -> Result<String, DeviceMessagingError>;

    async fn subscribe(
        &self,
        filter: &str,
    ) -> Result<mpsc::Receiver<PublishedMessage>, DeviceMessagingError>;

    async fn ping(&self) -> bool;
}

struct Subscription {
    filter: String,
    sender: mpsc::Sender<PublishedMessage>,
}

#[derive(Default)]
pub struct InMemoryDeviceMessagingConnection {
    subscriptions: Mutex<Vec<Subscription>>,
    retained: Mutex<HashMap<String, PublishedMessage>>,
}

impl InMemoryDeviceMessagingConnection {
    pub fn new() -> Self {
        InMemoryDeviceMessagingConnection::default()
    }
}

#[async_trait]
impl DeviceMessagingConnection for InMemoryDeviceMessagingConnection {
    async fn publish(&self, topic: &str, payload: &[u8], retain: bool) -> Result<String, DeviceMessagingError> {
        let message_id = Uuid::new_v4().to_string();
        let message = PublishedMessage {
            topic: topic.to_owned(),
            payload: payload.to_owned(),
            message_id: message_id.clone(),
        };

        if retain {
            self.retained.lock().insert(topic.to_owned(), message.clone());
        }

        let mut subscriptions = self.subscriptions.lock();
        subscriptions.retain(|sub| {
            if !topic_matches(&sub.filter, topic) {
                return true;
            }
            match sub.sender.try_send(message.clone()) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => true,
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            }
        });

        Ok(message_id)
    }

    async fn subscribe(
        &self,
        filter: &str,
    ) -> Result<mpsc::Receiver<PublishedMessage>, DeviceMessagingError> {
        let (sender, receiver) = mpsc::channel(SUBSCRIBER_CHANNEL_CAPACITY);

        for message in self.retained.lock().values() {
            if topic_matches(filter, &message.topic) {
                let _ = sender.try_send(message.clone());
            }
        }

        self.subscriptions.lock().push(Subscription {
            filter: filter.to_owned(),
            sender,
        });
        Ok(receiver)
    }

    async fn ping(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_matches_single_level_wildcard() {
        assert!(topic_matches("sensors/+/temperature", "sensors/device-1/temperature"));
        assert!(!topic_matches("sensors/+/temperature", "sensors/device-1/device-2/temperature"));
    }

    #[test]
    fn topic_matches_multi_level_wildcard() {
        assert!(topic_matches("sensors/#", "sensors/device-1/temperature"));
        assert!(topic_matches("sensors/#", "sensors/device-1"));
        assert!(!topic_matches("sensors/#", "actuators/device-1"));
    }

    #[tokio::test]
    async fn subscriber_receives_matching_publish() {
        let broker = InMemoryDeviceMessagingConnection::new();
        let mut receiver = broker.subscribe("sensors/+/temperature").await.unwrap();
        broker
            .publish("sensors/device-1/temperature", b"21.5", false)
            .await
            .unwrap();

        let message = receiver.recv().await.unwrap();
        assert_eq!(message.topic, "sensors/device-1/temperature");
    }

    #[tokio::test]
    async fn new_subscriber_receives_retained_message() {
        let broker = InMemoryDeviceMessagingConnection::new();
        broker
            .publish("sensors/device-1/temperature", b"21.5", true)
            .await
            .unwrap();

        let mut receiver = broker.subscribe("sensors/+/temperature").await.unwrap();
        let message = receiver.recv().await.unwrap();
        assert_eq!(message.payload, b"21.5");
    }
}
