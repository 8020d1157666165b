use axum::{
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

#[derive(Serialize, Debug)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// Failure taxonomy for the integration endpoints. Every handler failure maps
/// to exactly one variant; `IntoResponse` renders the JSON envelope plus an
/// `X-Error-Code` header for metrics labelling.
#[derive(Debug)]
pub enum ApiError {
    /// Missing/malformed client input. No retry implied.
    BadRequest { code: &'static str, message: String },
    /// Unauthenticated caller or failed signature verification.
    Unauthorized { code: &'static str, message: String },
    /// Authenticated but under-privileged caller.
    Forbidden { message: String },
    /// Lookup miss; a client/gateway-configuration error, not retryable.
    NotFound { code: &'static str, message: String },
    /// Unexpected failure; detail stays in logs, body stays generic.
    Internal { message: Option<String> },
    /// Upstream gateway failed or answered with a server error.
    BadGateway { message: String },
    /// Operator misconfiguration (missing credential), not a client error.
    ServiceUnavailable { message: String },
}

impl ApiError {
    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::BadRequest {
            code,
            message: message.into(),
        }
    }

    pub fn unauthorized(code: &'static str, message: impl Into<String>) -> Self {
        Self::Unauthorized {
            code,
            message: message.into(),
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden {
            message: message.into(),
        }
    }

    pub fn not_found(code: &'static str, message: impl Into<String>) -> Self {
        Self::NotFound {
            code,
            message: message.into(),
        }
    }

    pub fn internal<E: std::fmt::Display>(e: E) -> Self {
        Self::Internal {
            message: Some(e.to_string()),
        }
    }

    pub fn internal_generic() -> Self {
        Self::Internal { message: None }
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self::BadGateway {
            message: message.into(),
        }
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::ServiceUnavailable {
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden { .. } => StatusCode::FORBIDDEN,
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::BadGateway { .. } => StatusCode::BAD_GATEWAY,
            ApiError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest { code, .. }
            | ApiError::Unauthorized { code, .. }
            | ApiError::NotFound { code, .. } => code,
            ApiError::Forbidden { .. } => "forbidden",
            ApiError::Internal { .. } => "internal_error",
            ApiError::BadGateway { .. } => "upstream_error",
            ApiError::ServiceUnavailable { .. } => "not_configured",
        }
    }

    pub fn message(&self) -> String {
        match self {
            ApiError::BadRequest { message, .. }
            | ApiError::Unauthorized { message, .. }
            | ApiError::Forbidden { message }
            | ApiError::NotFound { message, .. }
            | ApiError::BadGateway { message }
            | ApiError::ServiceUnavailable { message } => message.clone(),
            ApiError::Internal { message } => message
                .clone()
                .unwrap_or_else(|| "internal server error".to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.code();
        let body = ErrorBody {
            error: self.message(),
            code: Some(code.to_string()),
        };
        let mut resp = (self.status(), Json(body)).into_response();
        if let Ok(val) = HeaderValue::from_str(code) {
            resp.headers_mut().insert("X-Error-Code", val);
        }
        resp
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
