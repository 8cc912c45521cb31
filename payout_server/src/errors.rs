use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use log::*;
use payout_engine::SettlementError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("Could not read request path: {0}")]
    InvalidRequestPath(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
    #[error("The data was not found. {0}")]
    NoRecordFound(String),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    RailError(String),
    #[error("{0}")]
    PersistenceError(String),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::InvalidRequestPath(_) => StatusCode::BAD_REQUEST,
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::NoRecordFound(_) => StatusCode::NOT_FOUND,
            Self::RailError(_) => StatusCode::BAD_GATEWAY,
            Self::PersistenceError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BackendError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "error": self.to_string() }).to_string())
    }
}

impl From<SettlementError> for ServerError {
    fn from(e: SettlementError) -> Self {
        match e {
            SettlementError::Validation(_) | SettlementError::InvalidOrder(_) => Self::Validation(e.to_string()),
            SettlementError::Rail(_) => Self::RailError(e.to_string()),
            SettlementError::Conflict(_) => Self::Conflict(e.to_string()),
            SettlementError::Persistence(_) => Self::PersistenceError(e.to_string()),
            SettlementError::NotFound(_) => Self::NoRecordFound(e.to_string()),
            SettlementError::Database(_) => Self::BackendError(e.to_string()),
        }
    }
}

impl ServerError {
    /// Errors on the vendor surface keep their status code but never carry engine or rail details.
    pub fn for_vendor(e: SettlementError) -> Self {
        debug!("💻️ Vendor request failed. {e}");
        match e {
            SettlementError::NotFound(_) => Self::NoRecordFound("No such vendor".into()),
            SettlementError::Validation(_) | SettlementError::InvalidOrder(_) => {
                Self::Validation("The request could not be processed".into())
            },
            SettlementError::Conflict(_) => Self::Conflict("The request conflicts with the current state".into()),
            SettlementError::Rail(_) => Self::RailError("The payment provider is not available".into()),
            SettlementError::Persistence(_) | SettlementError::Database(_) => {
                Self::BackendError("Something went wrong. Please try again later.".into())
            },
        }
    }
}
