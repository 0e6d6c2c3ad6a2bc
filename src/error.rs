//! Error handler for the provisioner.

use axum::extract::rejection::JsonRejection;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::ValidationErrors;

pub type Result<T> = std::result::Result<T, ServerError>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Enum representing server-side errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("User must be authenticated.")]
    Unauthenticated,

    #[error("Only administrators can create users.")]
    PermissionDenied,

    #[error("A user with this email already exists.")]
    AlreadyExists,

    #[error("There were validation errors with your request.")]
    Validation(#[from] ValidationErrors),

    #[error(transparent)]
    Axum(#[from] JsonRejection),

    #[error("{details}")]
    Internal {
        details: String,
        source: Option<BoxError>,
    },
}

impl ServerError {
    /// Wrap a collaborator failure, keeping its cause in the message.
    pub fn internal<E>(details: &str, err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Internal {
            details: format!("{details}: {err}"),
            source: Some(Box::new(err)),
        }
    }

    /// Caller-facing code of this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            ServerError::Unauthenticated => ErrorCode::Unauthenticated,
            ServerError::PermissionDenied => ErrorCode::PermissionDenied,
            ServerError::AlreadyExists => ErrorCode::AlreadyExists,
            ServerError::Validation(_) | ServerError::Axum(_) => {
                ErrorCode::InvalidArgument
            },
            ServerError::Internal { .. } => ErrorCode::Internal,
        }
    }
}

/// Stable error codes of the callable protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCode {
    Unauthenticated,
    PermissionDenied,
    AlreadyExists,
    InvalidArgument,
    Internal,
}

impl ErrorCode {
    /// HTTP status carrying this code.
    pub fn status(&self) -> StatusCode {
        match self {
            ErrorCode::Unauthenticated => StatusCode::UNAUTHORIZED,
            ErrorCode::PermissionDenied => StatusCode::FORBIDDEN,
            ErrorCode::AlreadyExists => StatusCode::CONFLICT,
            ErrorCode::InvalidArgument => StatusCode::BAD_REQUEST,
            ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Structure for detailed error responses.
#[derive(Debug, Serialize, Deserialize)]
pub struct ResponseError {
    pub code: ErrorCode,
    pub status: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<FieldError>>,
}

impl ResponseError {
    /// Create a response for `code`.
    pub fn new(code: ErrorCode) -> Self {
        Self {
            code,
            status: code.status().as_u16(),
            message: String::default(),
            errors: None,
        }
    }

    /// Update `message` field.
    pub fn message(mut self, message: &str) -> Self {
        self.message = message.into();
        self
    }

    /// Automatically add errors field.
    pub fn errors(mut self, errors: &ValidationErrors) -> Self {
        self.errors = Some(parse_validation_errors(errors));
        self
    }

    /// Transform [`ResponseError`] into axum [`Response`].
    pub fn into_response(self) -> std::result::Result<Response, axum::http::Error> {
        if let Ok(body) = serde_json::to_string(&self) {
            Response::builder()
                .status(self.status)
                .header(header::CONTENT_TYPE, "application/json")
                .body(body.into())
        } else {
            Ok(internal_server_error())
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

fn parse_validation_errors(errors: &ValidationErrors) -> Vec<FieldError> {
    let mut fields = errors
        .field_errors()
        .iter()
        .flat_map(|(field, issues)| {
            issues.iter().map(move |issue| FieldError {
                field: wire_name(field),
                message: issue.to_string(),
            })
        })
        .collect::<Vec<_>>();
    fields.sort_by(|a, b| a.field.cmp(&b.field));
    fields
}

/// Request bodies are camelCase, validator reports Rust field names.
fn wire_name(field: &str) -> String {
    let mut name = String::with_capacity(field.len());
    let mut upper = false;
    for c in field.chars() {
        if c == '_' {
            upper = !name.is_empty();
        } else if upper {
            name.extend(c.to_uppercase());
            upper = false;
        } else {
            name.push(c);
        }
    }
    name
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let response = ResponseError::new(self.code()).message(&self.to_string());

        let response = match &self {
            ServerError::Validation(validation_errors) => {
                response.errors(validation_errors)
            },
            ServerError::Axum(rejection) => response.message(&rejection.body_text()),
            _ => response,
        };

        response
            .into_response()
            .unwrap_or_else(|_| internal_server_error())
    }
}

fn internal_server_error() -> Response {
    Response::builder()
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .header(header::CONTENT_TYPE, "application/json")
        .body(
            serde_json::json!({
                "code": ErrorCode::Internal,
                "status": StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
                "message": "Internal server error.",
            })
            .to_string()
            .into(),
        )
        .unwrap_or_else(|_| Response::new("Internal server error".into()))
}
