// handler/completion.rs
use std::sync::Arc;

use axum::{
    extract::{Path, Query},
    response::IntoResponse,
    routing::{get, post, put},
    Extension, Json, Router,
};
use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::{completiondb::CompletionExt, payoutdb::PayoutExt},
    dtos::completiondtos::*,
    error::HttpError,
    middleware::JWTAuthMiddleware,
    models::usermodel::UserRole,
    AppState,
};

pub fn completion_handler() -> Router {
    Router::new()
        // Cleaner-side completion routes
        .route("/appointments/:appointment_id/check-in", post(check_in))
        .route("/appointments/:appointment_id/submit", post(submit_completion))
        .route("/appointments/:appointment_id/solo-offer/accept", post(accept_solo_offer))
        // Homeowner-side approval routes
        .route(
            "/appointments/:appointment_id/workers/:worker_id/approve",
            put(approve_completion),
        )
        .route(
            "/appointments/:appointment_id/workers/:worker_id/request-review",
            put(request_review),
        )
        // Exits
        .route(
            "/appointments/:appointment_id/workers/:worker_id/dropout",
            put(mark_dropout),
        )
        .route(
            "/appointments/:appointment_id/workers/:worker_id/no-show",
            put(mark_no_show),
        )
        // Progress and settlement views
        .route("/appointments/:appointment_id/status", get(get_completion_status))
        .route("/appointments/:appointment_id/payouts", get(get_appointment_payouts))
}

pub async fn check_in(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddleware>,
    Path(appointment_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let record = app_state
        .completion_service
        .check_in(appointment_id, auth.user.id)
        .await?;

    Ok(Json(ApiResponse::success("Checked in", record)))
}

pub async fn submit_completion(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddleware>,
    Path(appointment_id): Path<Uuid>,
    Json(body): Json<SubmitCompletionDto>,
) -> Result<impl IntoResponse, HttpError> {
    let record = app_state
        .completion_service
        .submit(appointment_id, auth.user.id, body.checklist_evidence)
        .await?;

    Ok(Json(ApiResponse::success(
        "Completion submitted for approval",
        record,
    )))
}

pub async fn approve_completion(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddleware>,
    Path((appointment_id, worker_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, HttpError> {
    let result = app_state
        .completion_service
        .approve(appointment_id, worker_id, auth.user.id)
        .await?;

    Ok(Json(ApiResponse::success("Completion approved", result)))
}

pub async fn request_review(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddleware>,
    Path((appointment_id, worker_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<RequestReviewDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let result = app_state
        .completion_service
        .request_review(appointment_id, worker_id, auth.user.id, body.concerns)
        .await?;

    Ok(Json(ApiResponse::success(
        "Completion approved with review requested",
        result,
    )))
}

pub async fn mark_dropout(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddleware>,
    Path((appointment_id, worker_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<DropoutDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let result = app_state
        .completion_service
        .mark_dropout(appointment_id, worker_id, &auth.user, body.reason)
        .await?;

    Ok(Json(ApiResponse::success("Dropout recorded", result)))
}

pub async fn mark_no_show(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddleware>,
    Path((appointment_id, worker_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, HttpError> {
    let result = app_state
        .completion_service
        .mark_no_show(appointment_id, worker_id, &auth.user)
        .await?;

    Ok(Json(ApiResponse::success("No-show recorded", result)))
}

pub async fn accept_solo_offer(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddleware>,
    Path(appointment_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let offer = app_state
        .reassignment_service
        .accept_solo_offer(appointment_id, auth.user.id)
        .await?;

    Ok(Json(ApiResponse::success("Solo completion offer accepted", offer)))
}

pub async fn get_completion_status(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddleware>,
    Path(appointment_id): Path<Uuid>,
    Query(query): Query<StatusQueryDto>,
) -> Result<impl IntoResponse, HttpError> {
    let appointment = app_state
        .db_client
        .get_appointment(appointment_id)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?
        .ok_or_else(|| HttpError::not_found("Appointment not found"))?;

    let mut records = app_state
        .db_client
        .get_records_for_appointment(appointment_id)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    if let Some(worker_id) = query.worker_id {
        records.retain(|record| record.worker_id == worker_id);
    }

    let caller_is_homeowner = auth.user.id == appointment.homeowner_id;
    let status = CompletionStatusDto::build(&appointment, &records, caller_is_homeowner, Utc::now());

    Ok(Json(ApiResponse::success("Completion status", status)))
}

pub async fn get_appointment_payouts(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddleware>,
    Path(appointment_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let appointment = app_state
        .db_client
        .get_appointment(appointment_id)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?
        .ok_or_else(|| HttpError::not_found("Appointment not found"))?;

    let records = app_state
        .db_client
        .get_records_for_appointment(appointment_id)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    let is_assigned = records.iter().any(|record| record.worker_id == auth.user.id);
    if auth.user.id != appointment.homeowner_id
        && !is_assigned
        && auth.user.role != UserRole::Admin
    {
        return Err(HttpError::forbidden(
            "Only the homeowner or assigned cleaners can view payouts",
        ));
    }

    let payouts = app_state
        .db_client
        .get_payouts_for_appointment(appointment_id)
        .await
        .map_err(|e| HttpError::server_error(e.to_string()))?;

    Ok(Json(ApiResponse::success("Appointment payouts", payouts)))
}
