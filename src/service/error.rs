use axum::http::StatusCode;
use thiserror::Error;
use uuid::Uuid;

use crate::{error::HttpError, models::completionmodel::CompletionStatus};

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Appointment {0} not found")]
    AppointmentNotFound(Uuid),

    #[error("Worker {0} is not assigned to appointment {1}")]
    NotAssigned(Uuid, Uuid),

    #[error("Completion for appointment {0} has already been submitted")]
    AlreadySubmitted(Uuid),

    #[error("Completion for appointment {0} has already been approved")]
    AlreadyApproved(Uuid),

    #[error("Completion is not approvable from status {0:?}")]
    NotApprovable(CompletionStatus),

    #[error("Payment for appointment {0} has not been captured")]
    PaymentNotCaptured(Uuid),

    #[error("Checklist evidence is required before submitting completion")]
    EvidenceRequired,

    #[error("Too early to submit: the service window has not started and the minimum on-site time has not elapsed")]
    TimingNotAllowed,

    #[error("Invalid completion transition from {0:?} to {1:?}")]
    InvalidTransition(CompletionStatus, CompletionStatus),

    #[error("User {0} is not authorized to perform this action on appointment {1}")]
    Forbidden(Uuid, Uuid),

    #[error("No solo completion offer found for worker {0} on appointment {1}")]
    OfferNotFound(Uuid, Uuid),

    #[error("Solo completion offer has expired")]
    OfferExpired,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Transfer error: {0}")]
    Transfer(String),

    #[error("Notification error: {0}")]
    Notification(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl From<ServiceError> for HttpError {
    fn from(error: ServiceError) -> Self {
        match error {
            ServiceError::AppointmentNotFound(_)
            | ServiceError::OfferNotFound(_, _) => HttpError::not_found(error.to_string()),

            ServiceError::NotAssigned(_, _)
            | ServiceError::PaymentNotCaptured(_)
            | ServiceError::EvidenceRequired
            | ServiceError::TimingNotAllowed
            | ServiceError::Validation(_) => HttpError::bad_request(error.to_string()),

            ServiceError::AlreadySubmitted(_)
            | ServiceError::AlreadyApproved(_)
            | ServiceError::NotApprovable(_)
            | ServiceError::InvalidTransition(_, _)
            | ServiceError::OfferExpired
            | ServiceError::Conflict(_) => HttpError::conflict(error.to_string()),

            ServiceError::Forbidden(_, _) => HttpError::forbidden(error.to_string()),

            _ => HttpError::server_error(error.to_string()),
        }
    }
}

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::AppointmentNotFound(_)
            | ServiceError::OfferNotFound(_, _) => StatusCode::NOT_FOUND,

            ServiceError::NotAssigned(_, _)
            | ServiceError::PaymentNotCaptured(_)
            | ServiceError::EvidenceRequired
            | ServiceError::TimingNotAllowed
            | ServiceError::Validation(_) => StatusCode::BAD_REQUEST,

            ServiceError::AlreadySubmitted(_)
            | ServiceError::AlreadyApproved(_)
            | ServiceError::NotApprovable(_)
            | ServiceError::InvalidTransition(_, _)
            | ServiceError::OfferExpired
            | ServiceError::Conflict(_) => StatusCode::CONFLICT,

            ServiceError::Forbidden(_, _) => StatusCode::FORBIDDEN,

            ServiceError::Database(_)
            | ServiceError::Transfer(_)
            | ServiceError::Notification(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
