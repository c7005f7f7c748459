//! Search handlers

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use validator::Validate;

use crate::AppState;
use vitrine_common::{
    errors::{AppError, Result},
    metrics,
};
use vitrine_retrieval::GroupedEvent;

/// Search request
#[derive(Debug, Deserialize, Validate)]
pub struct SearchRequest {
    #[validate(length(min = 1, max = 1000))]
    pub message: String,
}

/// Search response
#[derive(Serialize)]
pub struct SearchResponse {
    /// Ranked grouped events
    pub events: Vec<GroupedEvent>,

    /// Leading events sized for downstream prompt construction
    pub prompt_events: Vec<GroupedEvent>,

    /// Primary resolved date constraint, when one was found
    pub target_date: Option<String>,

    pub status: String,

    pub processing_time_ms: u64,
}

/// Resolve a free-text query into ranked events
pub async fn search(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResponse>> {
    let start = Instant::now();
    let request_metrics = metrics::RequestMetrics::start("POST", "/v1/search");

    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: Some("message".to_string()),
    })?;

    let query = request.message.trim();
    if query.is_empty() {
        return Err(AppError::Validation {
            message: "Message must not be blank".to_string(),
            field: Some("message".to_string()),
        });
    }

    let outcome = state.retriever.search(query).await;
    let processing_time_ms = start.elapsed().as_millis() as u64;

    tracing::info!(
        query,
        events = outcome.events.len(),
        target_date = outcome.target_date.as_deref(),
        latency_ms = processing_time_ms,
        "Search completed"
    );
    request_metrics.finish(200);

    Ok(Json(SearchResponse {
        events: outcome.events,
        prompt_events: outcome.prompt_events,
        target_date: outcome.target_date,
        status: "success".to_string(),
        processing_time_ms,
    }))
}
