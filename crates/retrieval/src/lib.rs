//! Vitrine retrieval engine
//!
//! Turns one free-text query about cultural events into a ranked set of
//! event records:
//! - Temporal resolution (date/interval constraints against a civil calendar)
//! - Query expansion (reformulations + discipline classification)
//! - Filter composition (date range AND discipline membership)
//! - Vector search fan-out (one filtered similarity search per text)
//! - Result reduction (dedup, grouping, ranking, capping)
//!
//! Every external call degrades rather than fails: a provider fault narrows
//! the result, it never surfaces as an error to the caller.

pub mod calendar;
pub mod engine;
pub mod expand;
pub mod fanout;
pub mod filter;
pub mod reduce;
pub mod temporal;

pub use calendar::{CivilCalendar, Clock, SystemClock};
pub use engine::{EventRetriever, RetrievalOutcome};
pub use expand::{Discipline, QueryAnalysis, QueryExpander};
pub use fanout::{FanoutOutcome, SearchFanout};
pub use filter::{CompositeFilter, DateFilter, DisciplineFilter};
pub use temporal::{TemporalExtraction, TemporalKind, TemporalResolver};

use serde::{Deserialize, Serialize};
use vitrine_common::index::QueryMatch;

/// Maximum reformulations requested per query
pub const MAX_REFORMULATIONS: usize = 3;

/// Maximum disciplines classified per query
pub const MAX_DISCIPLINES: usize = 3;

/// Maximum grouped events returned to the caller
pub const MAX_GROUPED_RESULTS: usize = 10;

/// Leading events exposed for downstream prompt construction
pub const PROMPT_EVENT_COUNT: usize = 5;

/// Simultaneous outbound sub-searches during fan-out
pub const MAX_CONCURRENT_SEARCHES: usize = 4;

/// Results requested from the index per sub-search
pub const DEFAULT_TOP_K: usize = 10;

/// One scored event hit projected from an index match
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    /// Index-assigned event identifier
    pub event_id: String,

    /// Similarity score of the match that produced this hit
    pub score: f32,

    /// Event title
    pub title: String,

    /// Event description
    pub description: String,

    /// Venue name
    pub venue: String,

    /// City
    pub city: String,

    /// Occurrence date (ISO "YYYY-MM-DD")
    pub date: String,

    /// Occurrence time ("HH:MM")
    pub time: String,

    /// Discipline label(s)
    pub discipline: String,

    /// Price description
    pub price: String,

    /// Event page URL
    pub url: String,

    /// Poster image URL
    pub image_url: String,

    /// Occurrence date as epoch seconds, when indexed
    pub date_epoch: Option<i64>,
}

impl SearchHit {
    /// Project an index match into a hit, tolerating missing metadata fields
    pub fn from_match(m: QueryMatch) -> Self {
        let meta = &m.metadata;
        Self {
            event_id: m.id,
            score: m.score,
            title: string_field(meta, "title"),
            description: string_field(meta, "description"),
            venue: string_field(meta, "venue"),
            city: string_field(meta, "city"),
            date: string_field(meta, "date"),
            time: string_field(meta, "time"),
            discipline: string_field(meta, "discipline"),
            price: string_field(meta, "price"),
            // The index stores the link under "event_url"
            url: string_field(meta, "event_url"),
            image_url: string_field(meta, "image_url"),
            date_epoch: meta.get("date_unix").and_then(serde_json::Value::as_i64),
        }
    }
}

/// One logical event with its occurrences collapsed into a single record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupedEvent {
    /// Trimmed title shared by the grouped hits
    pub title: String,

    /// Distinct occurrence dates, ascending
    pub dates: Vec<String>,

    /// Occurrence times, index-aligned with `dates`
    pub times: Vec<String>,

    /// Best similarity score among the grouped hits
    pub best_score: f32,

    /// Representative metadata (taken from one member)
    pub description: String,
    pub venue: String,
    pub city: String,
    pub discipline: String,
    pub price: String,
    pub url: String,
    pub image_url: String,
    pub event_id: String,
    pub date_epoch: Option<i64>,
}

fn string_field(meta: &serde_json::Value, key: &str) -> String {
    match meta.get(key) {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Number(n)) => n.to_string(),
        // List-valued fields (e.g. multi-discipline events) are joined
        Some(serde_json::Value::Array(values)) => values
            .iter()
            .filter_map(serde_json::Value::as_str)
            .collect::<Vec<_>>()
            .join(", "),
        _ => String::new(),
    }
}
