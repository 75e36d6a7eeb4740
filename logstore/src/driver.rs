// Copyright 2022 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::LogStoreError;

const TAILER_CHANNEL_CAPACITY: usize = 256;

#[derive(Clone, Debug)]
pub struct LogLine {
    pub timestamp_unix_millis: i64,
    pub body: String,
    pub labels: HashMap<String, String>,
}

/// A label filter matches a line when every `(key, value)` pair it names is present, with an
/// equal value, in the line's own labels (extra labels on the line are fine). An empty filter
/// matches everything.
pub fn labels_match(filter: &HashMap<String, String>, labels: &HashMap<String, String>) -> bool {
    filter
        .iter()
        .all(|(key, value)| labels.get(key) == Some(value))
}

/// The log-store backend (spec §4.2): an append-only, label-indexed line store per tenant
/// namespace, plus a live tail of newly appended lines matching a label filter.
#[async_trait]
pub trait LogStoreConnection: Send + Sync {
    async fn append(&self, namespace: &str, lines: Vec<LogLine>) -> Result<u64, LogStoreError>;

    #[allow(clippy::too_many_arguments)]
    async fn query(
        &self,
        namespace: &str,
        label_filter: &HashMap<String, String>,
        start_unix_millis: i64,
        end_unix_millis: i64,
        max_rows: u32,
    ) -> Result<(Vec<LogLine>, bool), LogStoreError>;

    async fn tail(
        &self,
        namespace: &str,
        label_filter: HashMap<String, String>,
    ) -> Result<mpsc::Receiver<LogLine>, LogStoreError>;

    async fn ping(&self) -> bool;
}

struct Tailer {
    label_filter: HashMap<String, String>,
    sender: mpsc::Sender<LogLine>,
}

#[derive(Default)]
struct NamespaceState {
    lines: Vec<LogLine>,
    tailers: Vec<Tailer>,
}

#[derive(Default)]
pub struct InMemoryLogStoreConnection {
    namespaces: Mutex<HashMap<String, NamespaceState>>,
}

impl InMemoryLogStoreConnection {
    pub fn new() -> Self {
        InMemoryLogStoreConnection::default()
    }
}

#[async_trait]
impl LogStoreConnection for InMemoryLogStoreConnection {
    async fn append(&self, namespace: &str, lines: Vec<LogLine>) -> Result<u64, LogStoreError> {
        let mut namespaces = self.namespaces.lock();
        let state = namespaces.entry(namespace.to_owned()).or_default();

        for line in lines {
            state.tailers.retain(|tailer| {
                if !labels_match(&tailer.label_filter, &line.labels) {
                    return true;
                }
                match tailer.sender.try_send(line.clone()) {
                    Ok(()) => true,
                    Err(mpsc::error::TrySendError::Full(_)) => true,
                    Err(mpsc::error::TrySendError::Closed(_)) => false,
                }
            });
            state.lines.push(line);
        }

        Ok(state.lines.len() as u64)
    }

    async fn query(
        &self,
        namespace: &str,
        label_filter: &HashMap<String, String>,
        start_unix_millis: i64,
        end_unix_millis: i64,
        max_rows: u32,
    ) -> Result<(Vec<LogLine>, bool), LogStoreError> {
        let namespaces = self.namespaces.lock();
        let Some(state) = namespaces.get(namespace) else {
            return Ok((Vec::new(), false));
        };

        let matching: Vec<LogLine> = state
            .lines
            .iter()
            .filter(|line| {
                (start_unix_millis == 0 || line.timestamp_unix_millis >= start_unix_millis)
                    && (end_unix_millis == 0 || line.timestamp_unix_millis <= end_unix_millis)
                    && labels_match(label_filter, &line.labels)
            })
            .cloned()
            .collect();

        if max_rows == 0 || (matching.len() as u32) <= max_rows {
            Ok((matching, false))
        } else {
            let truncated = matching[..max_rows as usize].to_vec();
            Ok((truncated, true))
        }
    }

    async fn tail(
        &self,
        namespace: &str,
        label_filter: HashMap<String, String>,
    ) -> Result<mpsc::Receiver<LogLine>, LogStoreError> {
        let (sender, receiver) = mpsc::channel(TAILER_CHANNEL_CAPACITY);
        let mut namespaces = self.namespaces.lock();
        let state = namespaces.entry(namespace.to_owned()).or_default();
        state.tailers.push(Tailer {
            label_filter,
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

    fn labels(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn append_then_query_filters_by_label_and_range() {
        let store = InMemoryLogStoreConnection::new();
        store
            .append(
                "org-1",
                vec![
                    LogLine {
                        timestamp_unix_millis: 100,
                        body: "hello".to_owned(),
                        labels: labels(&[("service", "web")]),
                    },
                    LogLine {
                        timestamp_unix_millis: 200,
                        body: "world".to_owned(),
                        labels: labels(&[("service", "worker")]),
                    },
                ],
            )
            .await
            .unwrap();

        let (rows, has_next) = store
            .query("org-1", &labels(&[("service", "web")]), 0, 0, 0)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].body, "hello");
        assert!(!has_next);

        let (rows, _) = store
            .query("org-1", &HashMap::new(), 150, 0, 0)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].body, "world");
    }

    #[tokio::test]
    async fn query_reports_has_next_when_truncated_by_max_rows() {
        let store = InMemoryLogStoreConnection::new();
        store
            .append(
                "org-1",
                vec![
                    LogLine {
                        timestamp_unix_millis: 1,
                        body: "a".to_owned(),
                        labels: HashMap::new(),
                    },
                    LogLine {
                        timestamp_unix_millis: 2,
                        body: "b".to_owned(),
                        labels: HashMap::new(),
                    },
                ],
            )
            .await
            .unwrap();

        let (rows, has_next) = store.query("org-1", &HashMap::new(), 0, 0, 1).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert!(has_next);
    }

    #[tokio::test]
    async fn tail_receives_only_newly_appended_matching_lines() {
        let store = InMemoryLogStoreConnection::new();
        let mut receiver = store
            .tail("org-1", labels(&[("service", "web")]))
            .await
            .unwrap();

        store
            .append(
                "org-1",
                vec![
                    LogLine {
                        timestamp_unix_millis: 1,
                        body: "ignored".to_owned(),
                        labels: labels(&[("service", "worker")]),
                    },
                    LogLine {
                        timestamp_unix_millis: 2,
                        body: "matched".to_owned(),
                        labels: labels(&[("service", "web")]),
                    },
                ],
            )
            .await
            .unwrap();

        let line = receiver.recv().await.unwrap();
        assert_eq!(line.body, "matched");
    }
}
