use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};

/// Application-wide Result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Main application error type
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    /// Course or plan selection does not qualify for EMI
    #[error("Not eligible for EMI: {0}")]
    IneligibleForEmi(String),

    /// An active EMI plan already exists for this user and course
    #[error("Active EMI plan already exists: {0}")]
    DuplicateActivePlan(String),

    /// No active EMI plan matches the lookup
    #[error("EMI plan not found: {0}")]
    PlanNotFound(String),

    /// The gateway transaction was already recorded against a plan
    #[error("Installment already recorded: {0}")]
    InstallmentAlreadyRecorded(String),

    /// Payment was charged for an installment that has since been paid
    #[error("Installment already settled by another payment: {0}")]
    InstallmentSuperseded(String),

    /// Gateway credential or token failure
    #[error("Gateway authentication error: {0}")]
    GatewayAuth(String),

    /// Gateway rejected the request or returned an unusable response
    #[error("Gateway request error: {0}")]
    GatewayRequest(String),

    /// Gateway could not be reached within the timeout
    #[error("Gateway unreachable: {0}")]
    GatewayUnreachable(String),

    /// Invoice sequence allocation collided with a concurrent writer
    #[error("Invoice sequence conflict: {0}")]
    SequenceConflict(String),

    /// Validation errors for business rules
    #[error("Validation error: {0}")]
    Validation(String),

    /// Caller identity missing from the request
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Database operation errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let status_code = self.status_code();
        let error_message = self.to_string();

        HttpResponse::build(status_code).json(serde_json::json!({
            "error": {
                "message": error_message,
                "code": status_code.as_u16(),
            }
        }))
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::IneligibleForEmi(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::DuplicateActivePlan(_) => StatusCode::CONFLICT,
            AppError::PlanNotFound(_) => StatusCode::NOT_FOUND,
            AppError::InstallmentAlreadyRecorded(_) => StatusCode::CONFLICT,
            AppError::InstallmentSuperseded(_) => StatusCode::CONFLICT,
            AppError::GatewayAuth(_) => StatusCode::BAD_GATEWAY,
            AppError::GatewayRequest(_) => StatusCode::BAD_GATEWAY,
            AppError::GatewayUnreachable(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::SequenceConflict(_) => StatusCode::CONFLICT,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Json(_) => StatusCode::BAD_REQUEST,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// Helper functions for common error scenarios
impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        AppError::NotFound(resource.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        AppError::Unauthorized(msg.into())
    }

    pub fn plan_not_found(msg: impl Into<String>) -> Self {
        AppError::PlanNotFound(msg.into())
    }

    pub fn ineligible(msg: impl Into<String>) -> Self {
        AppError::IneligibleForEmi(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        AppError::Internal(msg.into())
    }

    /// Whether the error is a gateway-side failure
    pub fn is_gateway_error(&self) -> bool {
        matches!(
            self,
            AppError::GatewayAuth(_) | AppError::GatewayRequest(_) | AppError::GatewayUnreachable(_)
        )
    }
}
