//! Vector search fan-out
//!
//! Issues one filtered similarity search per query text (the original query
//! plus its reformulations) under a bounded concurrency limit. A failed
//! sub-search contributes zero hits; only the hits of the surviving
//! sub-searches are merged. All sub-searches failing yields an empty
//! collection, never an error.

use crate::SearchHit;
use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use vitrine_common::embeddings::Embedder;
use vitrine_common::index::VectorIndex;
use vitrine_common::metrics;

/// Merged result of one fan-out
#[derive(Debug, Default)]
pub struct FanoutOutcome {
    /// Raw hits from the surviving sub-searches
    pub hits: Vec<SearchHit>,

    /// Sub-searches issued
    pub attempted: usize,

    /// Sub-searches that contributed nothing due to a provider fault
    pub failed: usize,
}

impl FanoutOutcome {
    /// True when every sub-search failed (total search failure)
    pub fn all_failed(&self) -> bool {
        self.attempted > 0 && self.failed == self.attempted
    }
}

/// Fans one query out across its reformulations
pub struct SearchFanout {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    top_k: usize,
    max_concurrent: usize,
}

impl SearchFanout {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        top_k: usize,
        max_concurrent: usize,
    ) -> Self {
        Self {
            embedder,
            index,
            top_k,
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// Run one sub-search per text and merge the raw hits. Order across
    /// sub-searches is not meaningful; the reducer ranks by score.
    pub async fn search_all<'a>(
        &'a self,
        texts: &'a [String],
        filter: Option<&'a Value>,
    ) -> FanoutOutcome {
        type SubFut<'f> =
            Pin<Box<dyn Future<Output = (&'f str, vitrine_common::Result<Vec<SearchHit>>)> + Send + 'f>>;
        let mut sub_searches: Vec<SubFut<'a>> = Vec::with_capacity(texts.len());
        for text in texts.iter().map(String::as_str) {
            sub_searches.push(Box::pin(async move {
                (text, self.sub_search(text, filter).await)
            }));
        }
        let results: Vec<(&str, vitrine_common::Result<Vec<SearchHit>>)> =
            stream::iter(sub_searches)
                .buffer_unordered(self.max_concurrent)
                .collect()
                .await;

        let mut outcome = FanoutOutcome::default();
        for (text, result) in results {
            outcome.attempted += 1;
            match result {
                Ok(sub_hits) => {
                    metrics::record_sub_search(true);
                    tracing::debug!(text, hits = sub_hits.len(), "Sub-search completed");
                    outcome.hits.extend(sub_hits);
                }
                Err(e) => {
                    metrics::record_sub_search(false);
                    outcome.failed += 1;
                    tracing::warn!(text, error = %e, "Sub-search failed, skipping its contribution");
                }
            }
        }

        outcome
    }

    async fn sub_search(
        &self,
        text: &str,
        filter: Option<&Value>,
    ) -> vitrine_common::Result<Vec<SearchHit>> {
        let vector = self.embedder.embed(text).await?;
        let matches = self.index.query(&vector, filter, self.top_k).await?;
        Ok(matches.into_iter().map(SearchHit::from_match).collect())
    }
}
