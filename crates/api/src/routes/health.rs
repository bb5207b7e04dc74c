//! Health endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use record_store::RecordStore;
use serde::Serialize;

use crate::routes::reservations::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// Saga runs currently between acceptance and a terminal outcome.
    pub reservas_en_curso: usize,
}

/// GET /health — liveness plus a count of in-flight reservations.
pub async fn check<S: RecordStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Json<HealthResponse> {
    let (status, reservas_en_curso) = match state.store.running().await {
        Ok(running) => ("ok", running.len()),
        Err(_) => ("degraded", 0),
    };
    Json(HealthResponse {
        status,
        reservas_en_curso,
    })
}
