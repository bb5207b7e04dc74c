//! HTTP API server for the travel reservation saga.
//!
//! Exposes the reservation endpoint consumed by the booking form, with
//! structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod key_lock;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use record_store::RecordStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use config::Config;
use routes::reservations::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: RecordStore + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check::<S>))
        .route("/reservar", post(routes::reservations::create::<S>))
        .route("/reservas/{id}", get(routes::reservations::get::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the default application state with in-memory step services.
pub fn create_default_state<S: RecordStore + Clone + 'static>(
    store: S,
    config: &Config,
) -> Arc<AppState<S>> {
    use key_lock::KeyLocks;
    use saga::{
        InMemoryFlightService, InMemoryHotelService, InMemoryPaymentService, SagaExecutor,
    };

    let flight = InMemoryFlightService::new();
    let hotel = InMemoryHotelService::new();
    let payment = InMemoryPaymentService::with_rule(config.rejection_rule());
    let executor = SagaExecutor::new(store.clone(), flight, hotel, payment);

    Arc::new(AppState {
        executor,
        store,
        key_locks: KeyLocks::new(),
    })
}

/// Resumes every run the record store still reports as in flight.
///
/// Called once at startup so a crash mid-saga leaves no reservation
/// stuck: interrupted forward work continues and recorded failures get
/// their compensation re-attempted.
pub async fn recover_in_flight<S: RecordStore + Clone + 'static>(
    state: &AppState<S>,
) -> Result<usize, saga::SagaError> {
    let running = state.store.running().await?;
    let count = running.len();
    if count > 0 {
        tracing::info!(count, "recovering in-flight saga runs");
    }

    for run in running {
        let id = run.id();
        let outcome = state.executor.resume(run).await?;
        tracing::info!(
            reservation_id = %id,
            status = %outcome.status(),
            "recovered saga run"
        );
    }

    Ok(count)
}
