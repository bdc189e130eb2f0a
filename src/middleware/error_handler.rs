use actix_web::{
    error::{JsonPayloadError, PathError, QueryPayloadError},
    HttpRequest,
};

use crate::core::AppError;

/// Turns malformed JSON bodies into the standard error envelope
pub fn json_error_handler(err: JsonPayloadError, req: &HttpRequest) -> actix_web::Error {
    tracing::warn!(path = %req.path(), error = %err, "Rejected JSON payload");
    AppError::validation(format!("Invalid request body: {}", err)).into()
}

/// Turns malformed query strings into the standard error envelope
pub fn query_error_handler(err: QueryPayloadError, req: &HttpRequest) -> actix_web::Error {
    tracing::warn!(path = %req.path(), error = %err, "Rejected query string");
    AppError::validation(format!("Invalid query parameters: {}", err)).into()
}

pub fn path_error_handler(err: PathError, req: &HttpRequest) -> actix_web::Error {
    tracing::warn!(path = %req.path(), error = %err, "Rejected path parameters");
    AppError::validation(format!("Invalid path parameters: {}", err)).into()
}
