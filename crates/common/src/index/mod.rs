//! Vector index abstraction
//!
//! Narrow capability trait over a metadata-filtered similarity index. The
//! production client speaks the Pinecone data-plane REST protocol; the
//! in-memory implementation mirrors its filter grammar (`$and`, `$in`,
//! `$gte`/`$lte`) for deterministic tests.

use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// One scored match returned by a similarity query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryMatch {
    /// Index-assigned record identifier
    pub id: String,

    /// Similarity score
    pub score: f32,

    /// Stored metadata fields
    #[serde(default)]
    pub metadata: Value,
}

/// Trait for filtered similarity search
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Query the index with an embedding vector and an optional metadata
    /// filter expression, returning up to `top_k` scored matches
    async fn query(
        &self,
        vector: &[f32],
        filter: Option<&Value>,
        top_k: usize,
    ) -> Result<Vec<QueryMatch>>;
}

#[async_trait]
impl VectorIndex for Arc<dyn VectorIndex> {
    async fn query(
        &self,
        vector: &[f32],
        filter: Option<&Value>,
        top_k: usize,
    ) -> Result<Vec<QueryMatch>> {
        (**self).query(vector, filter, top_k).await
    }
}

/// Pinecone data-plane client
pub struct PineconeIndex {
    client: reqwest::Client,
    api_key: String,
    host: String,
    timeout: Duration,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PineconeQuery<'a> {
    vector: &'a [f32],
    top_k: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<&'a Value>,
    include_metadata: bool,
}

#[derive(Deserialize)]
struct PineconeResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

impl PineconeIndex {
    /// Create a new Pinecone client for one index host
    pub fn new(api_key: String, host: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            api_key,
            host,
            timeout,
        })
    }

    fn query_url(&self) -> String {
        if self.host.starts_with("http://") || self.host.starts_with("https://") {
            format!("{}/query", self.host.trim_end_matches('/'))
        } else {
            format!("https://{}/query", self.host.trim_end_matches('/'))
        }
    }
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    async fn query(
        &self,
        vector: &[f32],
        filter: Option<&Value>,
        top_k: usize,
    ) -> Result<Vec<QueryMatch>> {
        let request = PineconeQuery {
            vector,
            top_k,
            filter,
            include_metadata: true,
        };

        let response = self.client
            .post(self.query_url())
            .header("Api-Key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::IndexTimeout {
                        timeout_ms: self.timeout.as_millis() as u64,
                    }
                } else {
                    AppError::IndexError {
                        message: format!("Request failed: {}", e),
                    }
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::IndexError {
                message: format!("API error {}: {}", status, body),
            });
        }

        let result: PineconeResponse = response.json().await.map_err(|e| {
            AppError::MalformedResponse {
                message: format!("Failed to parse index response: {}", e),
            }
        })?;

        Ok(result.matches)
    }
}

/// A record stored in the in-memory index
#[derive(Debug, Clone)]
pub struct IndexRecord {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: Value,
}

/// In-memory index for testing; cosine similarity over stored records
pub struct MockIndex {
    records: Vec<IndexRecord>,
}

impl MockIndex {
    pub fn new(records: Vec<IndexRecord>) -> Self {
        Self { records }
    }

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm_a == 0.0 || norm_b == 0.0 {
            0.0
        } else {
            dot / (norm_a * norm_b)
        }
    }
}

/// Evaluate a Pinecone-style filter expression against record metadata
pub fn matches_filter(metadata: &Value, filter: &Value) -> bool {
    if let Some(clauses) = filter.get("$and").and_then(Value::as_array) {
        return clauses.iter().all(|clause| matches_filter(metadata, clause));
    }

    let Some(fields) = filter.as_object() else {
        return true;
    };

    fields.iter().all(|(field, condition)| {
        let stored = metadata.get(field);
        let Some(ops) = condition.as_object() else {
            // Bare value means equality
            return stored == Some(condition);
        };

        ops.iter().all(|(op, operand)| match op.as_str() {
            "$in" => {
                let Some(allowed) = operand.as_array() else { return false };
                match stored {
                    // List-valued metadata matches when any element is allowed
                    Some(Value::Array(values)) => {
                        values.iter().any(|v| allowed.contains(v))
                    }
                    Some(value) => allowed.contains(value),
                    None => false,
                }
            }
            "$gte" => match (stored.and_then(Value::as_f64), operand.as_f64()) {
                (Some(value), Some(bound)) => value >= bound,
                _ => false,
            },
            "$lte" => match (stored.and_then(Value::as_f64), operand.as_f64()) {
                (Some(value), Some(bound)) => value <= bound,
                _ => false,
            },
            _ => false,
        })
    })
}

#[async_trait]
impl VectorIndex for MockIndex {
    async fn query(
        &self,
        vector: &[f32],
        filter: Option<&Value>,
        top_k: usize,
    ) -> Result<Vec<QueryMatch>> {
        let mut matches: Vec<QueryMatch> = self.records
            .iter()
            .filter(|record| {
                filter.map_or(true, |f| matches_filter(&record.metadata, f))
            })
            .map(|record| QueryMatch {
                id: record.id.clone(),
                score: Self::cosine(vector, &record.values),
                metadata: record.metadata.clone(),
            })
            .collect();

        matches.sort_by(|a, b| {
            b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(top_k);

        Ok(matches)
    }
}

/// Create a vector index client based on configuration
pub fn create_index(config: &crate::config::IndexConfig) -> Result<Arc<dyn VectorIndex>> {
    match config.provider.as_str() {
        "pinecone" => {
            let key = config.api_key.clone().ok_or_else(|| AppError::Configuration {
                message: "Index API key required for provider 'pinecone'".to_string(),
            })?;
            let host = config.host.clone().ok_or_else(|| AppError::Configuration {
                message: "Index host required for provider 'pinecone'".to_string(),
            })?;
            Ok(Arc::new(PineconeIndex::new(
                key,
                host,
                Duration::from_secs(config.timeout_secs),
            )?))
        }
        "mock" => Ok(Arc::new(MockIndex::new(Vec::new()))),
        other => {
            tracing::warn!(provider = other, "Unknown index provider, using empty mock");
            Ok(Arc::new(MockIndex::new(Vec::new())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: &str, values: Vec<f32>, metadata: Value) -> IndexRecord {
        IndexRecord { id: id.to_string(), values, metadata }
    }

    #[test]
    fn test_filter_set_membership() {
        let metadata = json!({"discipline": "Danse"});
        let filter = json!({"discipline": {"$in": ["Danse", "Musique"]}});
        assert!(matches_filter(&metadata, &filter));

        let filter = json!({"discipline": {"$in": ["Cirque"]}});
        assert!(!matches_filter(&metadata, &filter));
    }

    #[test]
    fn test_filter_list_valued_field() {
        let metadata = json!({"discipline": ["Danse", "Variété"]});
        let filter = json!({"discipline": {"$in": ["Variété"]}});
        assert!(matches_filter(&metadata, &filter));
    }

    #[test]
    fn test_filter_numeric_range() {
        let metadata = json!({"date_unix": 1_700_000_000_i64});
        let inside = json!({"date_unix": {"$gte": 1_699_999_999_i64, "$lte": 1_700_000_001_i64}});
        let outside = json!({"date_unix": {"$gte": 1_700_000_001_i64, "$lte": 1_700_000_002_i64}});
        assert!(matches_filter(&metadata, &inside));
        assert!(!matches_filter(&metadata, &outside));
    }

    #[test]
    fn test_filter_and_combination() {
        let metadata = json!({"discipline": "Danse", "date_unix": 100});
        let filter = json!({"$and": [
            {"discipline": {"$in": ["Danse"]}},
            {"date_unix": {"$gte": 50, "$lte": 150}},
        ]});
        assert!(matches_filter(&metadata, &filter));

        let filter = json!({"$and": [
            {"discipline": {"$in": ["Danse"]}},
            {"date_unix": {"$gte": 150, "$lte": 200}},
        ]});
        assert!(!matches_filter(&metadata, &filter));
    }

    #[tokio::test]
    async fn test_mock_index_ranks_by_similarity() {
        let index = MockIndex::new(vec![
            record("near", vec![1.0, 0.0], json!({})),
            record("far", vec![0.0, 1.0], json!({})),
        ]);

        let matches = index.query(&[1.0, 0.1], None, 10).await.unwrap();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].id, "near");
        assert!(matches[0].score > matches[1].score);
    }

    #[tokio::test]
    async fn test_mock_index_applies_filter_and_cap() {
        let index = MockIndex::new(vec![
            record("a", vec![1.0, 0.0], json!({"discipline": "Danse"})),
            record("b", vec![1.0, 0.0], json!({"discipline": "Cirque"})),
            record("c", vec![0.9, 0.1], json!({"discipline": "Danse"})),
        ]);

        let filter = json!({"discipline": {"$in": ["Danse"]}});
        let matches = index.query(&[1.0, 0.0], Some(&filter), 1).await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].id, "a");
    }

    #[test]
    fn test_query_url_normalization() {
        let bare = PineconeIndex::new(
            "k".into(),
            "idx.svc.pinecone.io".into(),
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(bare.query_url(), "https://idx.svc.pinecone.io/query");

        let full = PineconeIndex::new(
            "k".into(),
            "http://localhost:7700/".into(),
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(full.query_url(), "http://localhost:7700/query");
    }
}
