//! Uniform response envelope and error mapping.
//!
//! Every endpoint answers with `{success, data, message: {en, fr}, error}`.
//! Domain errors carry a localized message pair and map to 406, validation
//! errors to 422, missing documents to 404, everything else to 500 with the
//! error string in the envelope.

use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use serde::{Deserialize, Serialize};

/// Localized message pair attached to every envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Msg {
    pub en: String,
    pub fr: String,
}

impl Msg {
    pub fn new(en: &str, fr: &str) -> Self {
        Self {
            en: en.to_string(),
            fr: fr.to_string(),
        }
    }
}

/// The platform-wide response envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Msg,
    pub error: String,
}

/// 200 envelope.
pub fn ok<T: Serialize>(data: T, message: Msg) -> (StatusCode, Json<Envelope<T>>) {
    (
        StatusCode::OK,
        Json(Envelope {
            success: true,
            data: Some(data),
            message,
            error: "OK".to_string(),
        }),
    )
}

/// 201 envelope.
pub fn created<T: Serialize>(data: T, message: Msg) -> (StatusCode, Json<Envelope<T>>) {
    (
        StatusCode::CREATED,
        Json(Envelope {
            success: true,
            data: Some(data),
            message,
            error: "OK".to_string(),
        }),
    )
}

/// Error type shared by every handler.
#[derive(Debug)]
pub enum ApiError {
    /// Enumerated domain error with a localized message (406).
    Domain(Msg),
    /// Malformed or missing field (422).
    Validation(String),
    /// Document not found (404).
    NotFound(String),
    /// Conflicting resource, e.g. duplicate email (409).
    Conflict(Msg),
    /// Caller lacks a required state, e.g. unverified email (403).
    Forbidden(Msg),
    /// Missing or invalid credentials (401).
    Unauthorized(String),
    /// Everything else (500).
    Internal(String),
}

impl ApiError {
    pub fn domain(en: &str, fr: &str) -> Self {
        ApiError::Domain(Msg::new(en, fr))
    }

    pub fn internal(err: impl std::fmt::Display) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, error) = match self {
            ApiError::Domain(msg) => (StatusCode::NOT_ACCEPTABLE, msg, "DOMAIN_ERROR".to_string()),
            ApiError::Validation(field) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Msg::new("Invalid request data.", "Données de requête invalides."),
                field,
            ),
            ApiError::NotFound(what) => (
                StatusCode::NOT_FOUND,
                Msg::new("Resource not found.", "Ressource introuvable."),
                format!("{} not found", what),
            ),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg, "CONFLICT".to_string()),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg, "FORBIDDEN".to_string()),
            ApiError::Unauthorized(err) => (
                StatusCode::UNAUTHORIZED,
                Msg::new("Authentication required.", "Authentification requise."),
                err,
            ),
            ApiError::Internal(err) => {
                tracing::error!(error = %err, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Msg::new("Something went wrong.", "Une erreur est survenue."),
                    err,
                )
            }
        };

        let body: Envelope<serde_json::Value> = Envelope {
            success: false,
            data: None,
            message,
            error,
        };
        (status, Json(body)).into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ApiError::NotFound("row".to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<jsonwebtoken::errors::Error> for ApiError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        ApiError::Unauthorized(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_serializes_bilingual_message() {
        let (_, body) = ok(42, Msg::new("done", "terminé"));
        let json = serde_json::to_value(&body.0).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["data"], 42);
        assert_eq!(json["message"]["en"], "done");
        assert_eq!(json["message"]["fr"], "terminé");
        assert_eq!(json["error"], "OK");
    }

    #[test]
    fn domain_error_maps_to_406() {
        let resp = ApiError::domain("bad code", "mauvais code").into_response();
        assert_eq!(resp.status(), StatusCode::NOT_ACCEPTABLE);
    }

    #[test]
    fn row_not_found_maps_to_404() {
        let err: ApiError = sqlx::Error::RowNotFound.into();
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
