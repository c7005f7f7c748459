//! Health check handlers

use axum::{extract::State, Json};
use serde::Serialize;
use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Serialize)]
pub struct ReadyResponse {
    pub status: String,
    pub checks: HealthChecks,
}

#[derive(Serialize)]
pub struct HealthChecks {
    pub generation: CheckResult,
    pub embedding: CheckResult,
    pub index: CheckResult,
}

#[derive(Serialize)]
pub struct CheckResult {
    pub status: String,
    pub provider: String,
}

/// Liveness probe - always returns healthy if server is running
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
    })
}

/// Readiness probe - reports provider configuration without calling out
pub async fn ready(State(state): State<AppState>) -> Json<ReadyResponse> {
    let generation = check_provider(
        &state.config.generation.provider,
        state.config.generation.api_key.is_some(),
    );
    let embedding = check_provider(
        &state.config.embedding.provider,
        state.config.embedding.api_key.is_some(),
    );
    let index = check_provider(
        &state.config.index.provider,
        state.config.index.api_key.is_some() && state.config.index.host.is_some(),
    );

    let all_configured = [&generation, &embedding, &index]
        .iter()
        .all(|check| check.status == "configured");

    Json(ReadyResponse {
        status: if all_configured { "ready" } else { "not_ready" }.to_string(),
        checks: HealthChecks {
            generation,
            embedding,
            index,
        },
    })
}

fn check_provider(provider: &str, configured: bool) -> CheckResult {
    // Mock providers need no credentials
    let status = if configured || provider == "mock" {
        "configured"
    } else {
        "missing_credentials"
    };

    CheckResult {
        status: status.to_string(),
        provider: provider.to_string(),
    }
}
