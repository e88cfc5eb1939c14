// utils/error.rs
use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::{json, Map, Value};
use thiserror::Error;
use uuid::Uuid;
use validator::ValidationErrors;

/// Message renvoyé quand aucun format demandé n'existe
pub const INVALID_FORMATS_MESSAGE: &str = "Invalid format uid(s).";

#[derive(Error, Debug)]
pub enum AppError {
    // Erreurs de requête
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    #[error("Invalid format uid(s): {0:?}")]
    InvalidFormat(Vec<String>),

    #[error("Invalid preset: {0}")]
    InvalidPreset(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    // Erreurs de ressources
    #[error("{0} not found")]
    NotFound(String),

    // Erreurs de création / dispatch
    #[error("{0}")]
    ServerError(String),

    #[error("Could not dispatch job {job_uid}: {reason}")]
    Dispatch { job_uid: Uuid, reason: String },

    // Erreurs d'infrastructure
    #[error("Database error: {0}")]
    Database(String),

    #[error("Redis error: {0}")]
    Redis(String),

    #[error("Email error: {0}")]
    Email(String),

    #[error("External service error: {0}")]
    ExternalService(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal server error")]
    Internal,
}

impl AppError {
    /// Détail des erreurs de validation, champ par champ
    fn field_messages(errors: &ValidationErrors) -> Value {
        let mut fields = Map::new();
        for (field, field_errors) in errors.field_errors() {
            let messages: Vec<Value> = field_errors
                .iter()
                .map(|e| {
                    let message = e
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| e.code.to_string());
                    Value::String(message)
                })
                .collect();
            fields.insert(field.to_string(), Value::Array(messages));
        }
        Value::Object(fields)
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_)
            | AppError::InvalidFormat(_)
            | AppError::InvalidPreset(_)
            | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self {
            // 400 - Bad Request
            AppError::Validation(errors) => Self::field_messages(errors),
            AppError::InvalidFormat(_) => json!({ "formats": [INVALID_FORMATS_MESSAGE] }),
            AppError::InvalidPreset(message) => json!({ "preset": [message] }),
            AppError::BadRequest(message) => json!({
                "id": "bad_request",
                "message": message
            }),

            // 404 - Not Found
            AppError::NotFound(_) => json!({
                "id": "not_found",
                "message": self.to_string()
            }),

            // 500 - Internal Server Error
            AppError::ServerError(message) => json!({
                "id": "server_error",
                "message": message
            }),
            AppError::Dispatch { .. } => json!({
                "id": "dispatch_error",
                "message": self.to_string()
            }),
            _ => {
                tracing::error!("Internal server error: {}", self);
                json!({
                    "id": "server_error",
                    "message": "Internal server error"
                })
            }
        };

        HttpResponse::build(self.status_code()).json(body)
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => AppError::NotFound("Resource".to_string()),
            _ => AppError::Database(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        AppError::Database(format!("migration failed: {}", err))
    }
}

impl From<redis::RedisError> for AppError {
    fn from(err: redis::RedisError) -> Self {
        AppError::Redis(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::ExternalService(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::SerializeError(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Io(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err)
    }
}

// Type de résultat standard
pub type Result<T> = std::result::Result<T, AppError>;
