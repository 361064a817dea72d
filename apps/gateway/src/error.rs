//! Gateway error type and its HTTP mapping.
//!
//! Library errors are translated here once: structural input problems map
//! to 400, unknown entities to 404, business-rule conflicts to 409,
//! semantically unusable content to 422 and upstream transport problems to
//! 502. Internal failures are logged and masked. Callers always get the
//! transaction context through the `X-Transaction-ID` response header set
//! by the middleware.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use hie_ccda::CcdaError;
use hie_direct::DirectError;
use hie_fhir_proxy::FhirProxyError;
use hie_ledger::LedgerError;
use hie_netquery::NetqueryError;
use hie_x12::X12Error;

pub type Result<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    X12(#[from] X12Error),

    #[error(transparent)]
    Ccda(#[from] CcdaError),

    #[error(transparent)]
    FhirProxy(#[from] FhirProxyError),

    #[error(transparent)]
    Direct(#[from] DirectError),

    #[error(transparent)]
    Netquery(#[from] NetqueryError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("{0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::X12(err) => match err {
                X12Error::Malformed(_) | X12Error::UnknownTransactionType(_) => {
                    StatusCode::BAD_REQUEST
                }
                X12Error::PartnerNotFound(_) => StatusCode::NOT_FOUND,
                X12Error::Ledger(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Ccda(err) => match err {
                CcdaError::InvalidDocument(_) | CcdaError::Xml(_) => StatusCode::BAD_REQUEST,
                CcdaError::NotFound(_) => StatusCode::NOT_FOUND,
                CcdaError::XmlWrite(_) | CcdaError::Utf8(_) | CcdaError::Ledger(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            ApiError::FhirProxy(err) => match err {
                FhirProxyError::EndpointNotFound(_) => StatusCode::NOT_FOUND,
                FhirProxyError::NoDefaultEndpoint => StatusCode::SERVICE_UNAVAILABLE,
                FhirProxyError::Token(_) | FhirProxyError::Http(_) => StatusCode::BAD_GATEWAY,
                FhirProxyError::Ledger(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Direct(err) => match err {
                DirectError::AddressNotFound(_) => StatusCode::NOT_FOUND,
                DirectError::InvalidAddress(_) | DirectError::Mime(_) => StatusCode::BAD_REQUEST,
                DirectError::CertificateUnavailable(_) | DirectError::Crypto(_) => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                DirectError::Ledger(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Netquery(err) => match err {
                NetqueryError::MissingParameters(_) => StatusCode::BAD_REQUEST,
                NetqueryError::ParticipantNotFound(_) | NetqueryError::RepositoryNotFound(_) => {
                    StatusCode::NOT_FOUND
                }
                NetqueryError::AlreadyRegistered(_) => StatusCode::CONFLICT,
                NetqueryError::Xml(_) | NetqueryError::Http(_) | NetqueryError::Auth(_) => {
                    StatusCode::BAD_GATEWAY
                }
                NetqueryError::XmlWrite(_) | NetqueryError::Ledger(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            ApiError::Ledger(err) => match err {
                LedgerError::NotFound(_) => StatusCode::NOT_FOUND,
                LedgerError::AlreadyFinal { .. }
                | LedgerError::InvalidTransition { .. }
                | LedgerError::RetriesExhausted { .. } => StatusCode::CONFLICT,
            },
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
        };

        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("internal error: {self}");
            "internal server error".to_string()
        } else {
            self.to_string()
        };

        let body = Json(json!({
            "error": {
                "code": error_code(status),
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

fn error_code(status: StatusCode) -> &'static str {
    match status {
        StatusCode::BAD_REQUEST => "invalid",
        StatusCode::NOT_FOUND => "not-found",
        StatusCode::CONFLICT => "conflict",
        StatusCode::UNPROCESSABLE_ENTITY => "processing",
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE => "transient",
        _ => "exception",
    }
}
