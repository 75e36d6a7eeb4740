// Copyright 2022 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::PubSubError;

const SUBSCRIBER_CHANNEL_CAPACITY: usize = 256;

#[derive(Clone, Debug)]
pub struct PublishedMessage {
    pub subject: String,
    pub payload: Vec<u8>,
    pub message_id: String,
}

/// Matches a concrete, dot-segmented `subject` against a `filter` that may contain a single
/// `*` wildcard token standing for exactly one segment (spec/proto: "may contain a single `*`
/// wildcard token, e.g. `events.*`").
pub fn subject_matches(filter: &str, subject: &str) -> bool {
    let filter_segments: Vec<&str> = filter.split('.').collect();
    let subject_segments: Vec<&str> = subject.split('.').collect();
    if filter_segments.len() != subject_segments.len() {
        return false;
    }
    filter_segments
        .iter()
        .zip(subject_segments.iter())
        .all(|(f, s)| *f == "*" || f == s)
}

/// A generic publish/subscribe bus (spec's `pubsub` backend): any number of concurrent
/// subscribers, each with its own filter, see every published message whose subject matches.
#[async_trait]
pub trait PubSubConnection: Send + Sync {
    async fn publish(&self, subject: &str, payload: &[u8]) -> Result<String, PubSubError>;

    async fn subscribe(&self, filter: &str) -> Result<mpsc::Receiver<PublishedMessage>, PubSubError>;

    async fn ping(&self) -> bool;
}

struct Subscription {
    filter: String,
    sender: mpsc::Sender<PublishedMessage>,
}

#[derive(Default)]
pub struct InMemoryPubSubConnection {
    subscriptions: Mutex<Vec<Subscription>>,
}

impl InMemoryPubSubConnection {
    pub fn new() -> Self {
        InMemoryPubSubConnection::default()
    }
}

#[async_trait]
impl PubSubConnection for InMemoryPubSubConnection {
    async fn publish(&self, subject: &str, payload: &[u8]) -> Result<String, PubSubError> {
        let message_id = Uuid::new_v4().to_string();
        let message = PublishedMessage {
            subject: subject.to_owned(),
            payload: payload.to_owned(),
            message_id: message_id.clone(),
        };

        let mut subscriptions = self.subscriptions.lock();
        subscriptions.retain(|sub| {
            if !subject_matches(&sub.filter, subject) {
                return true;
            }
            // Best-effort fan-out: a full or closed subscriber channel drops the message for
            // that subscriber rather than blocking the publisher (spec §4.8's pub/sub
            // semantics apply here too).
            match sub.sender.try_send(message.clone()) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => true,
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            }
        });

        Ok(message_id)
    }

    async fn subscribe(&self, filter: &str) -> Result<mpsc::Receiver<PublishedMessage>, PubSubError> {
        let (sender, receiver) = mpsc::channel(SUBSCRIBER_CHANNEL_CAPACITY);
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
    fn subject_matches_exact() {
        assert!(subject_matches("kv.set", "kv.set"));
        assert!(!subject_matches("kv.set", "kv.delete"));
    }

    #[test]
    fn subject_matches_single_wildcard_token() {
        assert!(subject_matches("kv.*", "kv.set"));
        assert!(!subject_matches("kv.*", "kv.set.extra"));
        assert!(!subject_matches("kv.*", "objectstore.set"));
    }

    #[tokio::test]
    async fn subscriber_receives_matching_publish() {
        let broker = InMemoryPubSubConnection::new();
        let mut receiver = broker.subscribe("kv.*").await.unwrap();
        broker.publish("kv.set", b"payload").await.unwrap();

        let message = receiver.recv().await.unwrap();
        assert_eq!(message.subject, "kv.set");
        assert_eq!(message.payload, b"payload");
    }

    #[tokio::test]
    async fn subscriber_does_not_receive_non_matching_publish() {
        let broker = InMemoryPubSubConnection::new();
        let mut receiver = broker.subscribe("kv.*").await.unwrap();
        broker.publish("objectstore.put_object", b"payload").await.unwrap();
        broker.publish("kv.set", b"match").await.unwrap();

        let message = receiver.recv().await.unwrap();
        assert_eq!(message.subject, "kv.set");
    }
}
