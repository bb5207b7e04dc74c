//! Reservation booking and status endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use common::ReservationId;
use domain::{Money, ReservationRequest, RunStatus, SagaRun, StepName, StepStatus};
use record_store::RecordStore;
use saga::{
    InMemoryFlightService, InMemoryHotelService, InMemoryPaymentService, SagaExecutor,
};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::key_lock::KeyLocks;

/// Shared application state accessible from all handlers.
pub struct AppState<S: RecordStore> {
    pub executor: SagaExecutor<
        S,
        InMemoryFlightService,
        InMemoryHotelService,
        InMemoryPaymentService,
    >,
    pub store: S,
    pub key_locks: KeyLocks,
}

// -- Request types --

/// Wire form of a reservation request. Field names follow the published
/// contract with the booking-form client.
#[derive(Deserialize)]
pub struct ReservationBody {
    pub cliente: String,
    pub vuelo_destino: String,
    pub hotel_nombre: String,
    pub monto_total: f64,
}

// -- Response types --

#[derive(Serialize)]
pub struct ReservationResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reserva_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detalles: Option<ReservationDetails>,
    /// Set only when automatic compensation could not complete and an
    /// operator must reconcile manually.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requiere_intervencion: Option<bool>,
}

#[derive(Serialize)]
pub struct ReservationDetails {
    pub vuelo_confirmado: bool,
    pub hotel_confirmado: bool,
    pub pago_procesado: bool,
}

#[derive(Serialize)]
pub struct RunStatusResponse {
    pub reserva_id: String,
    pub estado: String,
    pub pasos: Vec<StepStatusResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub motivo_fallo: Option<String>,
}

#[derive(Serialize)]
pub struct StepStatusResponse {
    pub paso: String,
    pub estado: String,
}

// -- Handlers --

/// POST /reservar — book a flight, a hotel, and charge the payment as
/// one saga.
///
/// Requests bearing the same `Idempotency-Key` header serialize on that
/// key and replay the first terminal outcome instead of re-executing.
#[tracing::instrument(skip(state, headers, body))]
pub async fn create<S: RecordStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Json(body): Json<ReservationBody>,
) -> Result<(StatusCode, Json<ReservationResponse>), ApiError> {
    let request = ReservationRequest::new(
        body.cliente,
        body.vuelo_destino,
        body.hotel_nombre,
        Money::from_major_units(body.monto_total),
    );
    request.validate()?;

    let key = headers
        .get("idempotency-key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    let id = match &key {
        Some(k) => ReservationId::from_idempotency_key(k),
        None => ReservationId::new(),
    };

    // Concurrent requests with the same key wait here for the first
    // one's terminal outcome.
    let _guard = match &key {
        Some(k) => Some(state.key_locks.lock(k).await),
        None => None,
    };

    let run = state.executor.execute(id, request).await?;
    Ok(respond(&run))
}

/// GET /reservas/{id} — look up the stored outcome of a reservation.
#[tracing::instrument(skip(state))]
pub async fn get<S: RecordStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<RunStatusResponse>, ApiError> {
    let reservation_id = parse_reservation_id(&id)?;
    let run = state
        .store
        .get(reservation_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Reserva {id} no encontrada")))?;

    let pasos = run
        .steps()
        .iter()
        .map(|s| StepStatusResponse {
            paso: s.name.as_str().to_string(),
            estado: s.status.to_string(),
        })
        .collect();

    Ok(Json(RunStatusResponse {
        reserva_id: run.id().to_string(),
        estado: run.status().to_string(),
        pasos,
        motivo_fallo: run.failure_reason().map(String::from),
    }))
}

/// Maps a terminal run to the wire response.
fn respond(run: &SagaRun) -> (StatusCode, Json<ReservationResponse>) {
    let reserva_id = Some(run.id().to_string());
    match run.status() {
        RunStatus::Succeeded => (
            StatusCode::OK,
            Json(ReservationResponse {
                success: true,
                message: "Reserva procesada exitosamente".to_string(),
                reserva_id,
                detalles: Some(ReservationDetails {
                    vuelo_confirmado: run.step_status(StepName::Flight)
                        == StepStatus::Committed,
                    hotel_confirmado: run.step_status(StepName::Hotel)
                        == StepStatus::Committed,
                    pago_procesado: run.step_status(StepName::Payment)
                        == StepStatus::Committed,
                }),
                requiere_intervencion: None,
            }),
        ),
        RunStatus::FailedCompensated => (
            StatusCode::OK,
            Json(ReservationResponse {
                success: false,
                message: "Error en el procesamiento de la reserva. Las reservas ya \
                          confirmadas fueron canceladas automáticamente y no se realizó \
                          ningún cargo."
                    .to_string(),
                reserva_id,
                detalles: None,
                requiere_intervencion: None,
            }),
        ),
        RunStatus::FailedUncompensated => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ReservationResponse {
                success: false,
                message: "Error en el procesamiento de la reserva. La compensación \
                          automática no pudo completarse; se requiere intervención manual."
                    .to_string(),
                reserva_id,
                detalles: None,
                requiere_intervencion: Some(true),
            }),
        ),
        // The executor only returns terminal runs
        RunStatus::Running => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ReservationResponse {
                success: false,
                message: "La reserva sigue en proceso".to_string(),
                reserva_id,
                detalles: None,
                requiere_intervencion: None,
            }),
        ),
    }
}

fn parse_reservation_id(id: &str) -> Result<ReservationId, ApiError> {
    let uuid = uuid::Uuid::parse_str(id)
        .map_err(|e| ApiError::BadRequest(format!("ID de reserva inválido: {e}")))?;
    Ok(ReservationId::from_uuid(uuid))
}
