//! Retrieval orchestration
//!
//! Coordinates the pipeline for one query: temporal resolution and query
//! expansion run concurrently, their outputs compose into one index filter,
//! the fan-out issues the similarity searches, and the reducer shapes the
//! final ranked result. The engine never returns an error; every provider
//! fault narrows the outcome instead.

use crate::calendar::{CivilCalendar, Clock, SystemClock};
use crate::expand::QueryExpander;
use crate::fanout::SearchFanout;
use crate::filter::{CompositeFilter, DisciplineFilter};
use crate::reduce;
use crate::temporal::TemporalResolver;
use crate::GroupedEvent;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use vitrine_common::config::AppConfig;
use vitrine_common::embeddings::Embedder;
use vitrine_common::errors::AppError;
use vitrine_common::generation::TextGenerator;
use vitrine_common::index::VectorIndex;
use vitrine_common::metrics;

/// Final result of one retrieval
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetrievalOutcome {
    /// Ranked grouped events, best first
    pub events: Vec<GroupedEvent>,

    /// Leading prefix of `events` sized for prompt construction
    pub prompt_events: Vec<GroupedEvent>,

    /// Primary resolved date constraint (interval start or the specific
    /// date), when one was found
    pub target_date: Option<String>,
}

/// The retrieval orchestration engine
pub struct EventRetriever {
    resolver: TemporalResolver,
    expander: QueryExpander,
    fanout: SearchFanout,
    clock: Arc<dyn Clock>,
    max_results: usize,
    prompt_events: usize,
}

impl EventRetriever {
    pub fn new(
        resolver: TemporalResolver,
        expander: QueryExpander,
        fanout: SearchFanout,
        clock: Arc<dyn Clock>,
        max_results: usize,
        prompt_events: usize,
    ) -> Self {
        Self {
            resolver,
            expander,
            fanout,
            clock,
            max_results,
            prompt_events,
        }
    }

    /// Wire an engine from configuration and provider clients
    pub fn from_config(
        config: &AppConfig,
        generator: Arc<dyn TextGenerator>,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
    ) -> vitrine_common::Result<Self> {
        let tz: Tz = config.retrieval.timezone.parse().map_err(|_| {
            AppError::Configuration {
                message: format!("Invalid timezone: {}", config.retrieval.timezone),
            }
        })?;

        let resolver = TemporalResolver::new(
            generator.clone(),
            config.generation.extraction_temperature,
            tz,
        );
        let expander = QueryExpander::new(
            generator,
            config.generation.expansion_temperature,
            config.retrieval.max_reformulations,
            config.retrieval.max_disciplines,
        );
        let fanout = SearchFanout::new(
            embedder,
            index,
            config.retrieval.per_query_top_k,
            config.retrieval.max_concurrent_searches,
        );

        Ok(Self::new(
            resolver,
            expander,
            fanout,
            Arc::new(SystemClock::new(tz)),
            config.retrieval.max_results,
            config.retrieval.prompt_events,
        ))
    }

    /// Resolve one query into ranked grouped events
    pub async fn search(&self, query: &str) -> RetrievalOutcome {
        let start = Instant::now();
        let calendar = CivilCalendar::new(self.clock.as_ref());

        // Temporal resolution and query expansion are independent
        let (extraction, analysis) = tokio::join!(
            self.resolver.resolve(query, &calendar),
            self.expander.analyze(query),
        );

        let (date_filter, target_date) = match self.resolver.date_filter(&extraction) {
            Some((filter, target)) => (Some(filter), Some(target)),
            None => (None, None),
        };
        let discipline_filter = DisciplineFilter::new(analysis.disciplines.clone());
        let composite = CompositeFilter::new(date_filter, discipline_filter);
        let filter_value = composite.to_value();

        let mut texts = Vec::with_capacity(1 + analysis.reformulations.len());
        texts.push(query.to_string());
        texts.extend(
            analysis
                .reformulations
                .iter()
                .filter(|r| r.as_str() != query)
                .cloned(),
        );

        let fanned = self.fanout.search_all(&texts, filter_value.as_ref()).await;
        if fanned.all_failed() {
            tracing::warn!(query, "Every sub-search failed, returning empty result");
            metrics::record_retrieval(start.elapsed().as_secs_f64(), 0, !composite.is_empty());
            return RetrievalOutcome::default();
        }

        let events = reduce::reduce(fanned.hits, self.max_results);
        let prompt_events: Vec<GroupedEvent> =
            events.iter().take(self.prompt_events).cloned().collect();

        metrics::record_retrieval(
            start.elapsed().as_secs_f64(),
            events.len(),
            !composite.is_empty(),
        );
        tracing::info!(
            query,
            reformulations = analysis.reformulations.len(),
            disciplines = analysis.disciplines.len(),
            filtered = !composite.is_empty(),
            events = events.len(),
            failed_sub_searches = fanned.failed,
            latency_ms = start.elapsed().as_millis() as u64,
            "Retrieval completed"
        );

        RetrievalOutcome {
            events,
            prompt_events,
            target_date,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::FixedClock;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use serde_json::json;
    use vitrine_common::generation::ChatMessage;
    use vitrine_common::index::{IndexRecord, MockIndex, QueryMatch};

    /// Routes extraction and expansion calls by prompt shape
    struct RoutedGenerator {
        temporal: vitrine_common::Result<String>,
        expansion: vitrine_common::Result<String>,
    }

    impl RoutedGenerator {
        fn ok(temporal: &str, expansion: &str) -> Self {
            Self {
                temporal: Ok(temporal.to_string()),
                expansion: Ok(expansion.to_string()),
            }
        }

        fn failing() -> Self {
            Self {
                temporal: Err(AppError::GenerationError { message: "down".into() }),
                expansion: Err(AppError::GenerationError { message: "down".into() }),
            }
        }
    }

    #[async_trait]
    impl TextGenerator for RoutedGenerator {
        async fn generate(
            &self,
            messages: &[ChatMessage],
            _: f32,
        ) -> vitrine_common::Result<String> {
            let is_expansion = messages.iter().any(|m| m.content.contains("REFORMULATIONS"));
            let result = if is_expansion { &self.expansion } else { &self.temporal };
            match result {
                Ok(s) => Ok(s.clone()),
                Err(_) => Err(AppError::GenerationError { message: "down".into() }),
            }
        }

        fn model_name(&self) -> &str {
            "routed"
        }
    }

    struct ConstEmbedder;

    #[async_trait]
    impl Embedder for ConstEmbedder {
        async fn embed(&self, _: &str) -> vitrine_common::Result<Vec<f32>> {
            Ok(vec![1.0, 0.0])
        }

        async fn embed_batch(&self, texts: &[String]) -> vitrine_common::Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }

        fn model_name(&self) -> &str {
            "const"
        }

        fn dimension(&self) -> usize {
            2
        }
    }

    struct DownIndex;

    #[async_trait]
    impl VectorIndex for DownIndex {
        async fn query(
            &self,
            _: &[f32],
            _: Option<&serde_json::Value>,
            _: usize,
        ) -> vitrine_common::Result<Vec<QueryMatch>> {
            Err(AppError::IndexError { message: "unreachable".into() })
        }
    }

    fn event(id: &str, title: &str, discipline: &str, date: &str, date_unix: i64) -> IndexRecord {
        IndexRecord {
            id: id.to_string(),
            values: vec![1.0, 0.0],
            metadata: json!({
                "title": title,
                "discipline": discipline,
                "date": date,
                "time": "20:00",
                "date_unix": date_unix,
                "venue": "Salle A",
                "city": "Montréal",
                "event_url": format!("https://example.org/{}", id),
            }),
        }
    }

    // Weekend of Saturday 2024-03-09 / Sunday 2024-03-10, America/Montreal
    const WEEKEND_TEMPORAL: &str = r#"{"date_found": true, "dates": [],
        "date_type": "interval", "is_interval": true,
        "interval_bounds": {"start": "2024-03-09", "end": "2024-03-10"}}"#;

    const DANCE_EXPANSION: &str = "REFORMULATIONS:\n\
        1. dance night at a club this weekend\n\
        2. dancefloor music event\n\
        DISCIPLINES:\n\
        1. Danse\n";

    const NOT_FOUND_TEMPORAL: &str = r#"{"date_found": false, "dates": [],
        "date_type": "relative", "is_interval": false}"#;

    fn engine(generator: RoutedGenerator, index: Arc<dyn VectorIndex>) -> EventRetriever {
        let tz: Tz = "America/Montreal".parse().unwrap();
        let generator: Arc<dyn TextGenerator> = Arc::new(generator);
        let resolver = TemporalResolver::new(generator.clone(), 0.0, tz);
        let expander = QueryExpander::new(
            generator,
            0.7,
            crate::MAX_REFORMULATIONS,
            crate::MAX_DISCIPLINES,
        );
        let fanout = SearchFanout::new(
            Arc::new(ConstEmbedder),
            index,
            crate::DEFAULT_TOP_K,
            crate::MAX_CONCURRENT_SEARCHES,
        );
        let clock = FixedClock(NaiveDate::from_ymd_opt(2024, 3, 4).unwrap());
        EventRetriever::new(
            resolver,
            expander,
            fanout,
            Arc::new(clock),
            crate::MAX_GROUPED_RESULTS,
            crate::PROMPT_EVENT_COUNT,
        )
    }

    #[tokio::test]
    async fn test_filtered_weekend_search() {
        // In range: Sat 2024-03-09 ~ 1710003600 (noon EST)
        let index = MockIndex::new(vec![
            event("e1", "Soirée swing", "Danse", "2024-03-09", 1_710_003_600),
            event("e2", "Ballet du lundi", "Danse", "2024-03-11", 1_710_176_400),
            event("e3", "Vernissage", "Art visuel", "2024-03-09", 1_710_003_600),
        ]);

        let retriever = engine(
            RoutedGenerator::ok(WEEKEND_TEMPORAL, DANCE_EXPANSION),
            Arc::new(index),
        );
        let outcome = retriever.search("je veux danser ce weekend").await;

        assert_eq!(outcome.target_date.as_deref(), Some("2024-03-09"));
        assert_eq!(outcome.events.len(), 1);
        assert_eq!(outcome.events[0].title, "Soirée swing");
        assert_eq!(outcome.prompt_events.len(), 1);
    }

    #[tokio::test]
    async fn test_degraded_analysis_still_searches() {
        let index = MockIndex::new(vec![event(
            "e1",
            "Concert libre",
            "Musique",
            "2024-03-20",
            1_710_954_000,
        )]);

        let retriever = engine(RoutedGenerator::failing(), Arc::new(index));
        let outcome = retriever.search("quelque chose à faire").await;

        // Both analyses degraded: single unfiltered search on the raw query
        assert!(outcome.target_date.is_none());
        assert_eq!(outcome.events.len(), 1);
    }

    #[tokio::test]
    async fn test_total_search_failure_clears_target_date() {
        let retriever = engine(
            RoutedGenerator::ok(WEEKEND_TEMPORAL, DANCE_EXPANSION),
            Arc::new(DownIndex),
        );
        let outcome = retriever.search("danse ce weekend").await;

        assert!(outcome.events.is_empty());
        assert!(outcome.prompt_events.is_empty());
        assert!(outcome.target_date.is_none());
    }

    #[tokio::test]
    async fn test_prompt_events_are_a_prefix() {
        let records: Vec<IndexRecord> = (0..12)
            .map(|i| {
                event(
                    &format!("e{}", i),
                    &format!("Spectacle {}", i),
                    "Théâtre",
                    "2024-03-20",
                    1_710_954_000,
                )
            })
            .collect();
        let index = MockIndex::new(records);

        let retriever = engine(
            RoutedGenerator::ok(
                NOT_FOUND_TEMPORAL,
                "REFORMULATIONS:\n1. theatre plays\nDISCIPLINES:\n1. Théâtre\n",
            ),
            Arc::new(index),
        );
        let outcome = retriever.search("du théâtre").await;

        assert!(outcome.events.len() <= crate::MAX_GROUPED_RESULTS);
        assert_eq!(outcome.prompt_events.len(), crate::PROMPT_EVENT_COUNT);
        for (prompt, event) in outcome.prompt_events.iter().zip(&outcome.events) {
            assert_eq!(prompt.event_id, event.event_id);
        }
    }

    #[tokio::test]
    async fn test_no_date_found_means_unrestricted_dates() {
        // Event far in the future still matches when no date was extracted
        let index = MockIndex::new(vec![event(
            "e1",
            "Grand cirque",
            "Cirque",
            "2030-01-01",
            1_893_474_000,
        )]);

        let retriever = engine(
            RoutedGenerator::ok(
                NOT_FOUND_TEMPORAL,
                "REFORMULATIONS:\n1. circus show\nDISCIPLINES:\n1. Cirque\n",
            ),
            Arc::new(index),
        );
        let outcome = retriever.search("un cirque un jour").await;

        assert!(outcome.target_date.is_none());
        assert_eq!(outcome.events.len(), 1);
    }
}
