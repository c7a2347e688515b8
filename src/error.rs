//! Error handler for greenpoints.

use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use sqlx::Error as SQLxError;
use thiserror::Error;
use validator::ValidationErrors;

pub type Result<T> = std::result::Result<T, ServerError>;

/// Enum representing server-side errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("validation error occurred")]
    Validation(#[from] ValidationErrors),

    #[error("{0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Axum(#[from] JsonRejection),

    #[error(transparent)]
    Path(#[from] PathRejection),

    #[error(transparent)]
    Query(#[from] QueryRejection),

    #[error(transparent)]
    MultipartBody(#[from] MultipartRejection),

    #[error("invalid multipart body: {0}")]
    Multipart(#[from] MultipartError),

    #[error("SQL request failed: {0}")]
    Sql(#[from] SQLxError),

    #[error("{entity} not found")]
    NotFound { entity: &'static str },

    #[error("{0}")]
    Conflict(String),

    #[error("no challenge template in catalog")]
    EmptyCatalog,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("invalid 'Authorization' header")]
    Unauthorized,

    #[error("administrator rights required")]
    Forbidden,

    #[error("internal server error, {details}")]
    Internal {
        details: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl ServerError {
    /// Shortcut for [`ServerError::NotFound`].
    pub fn not_found(entity: &'static str) -> Self {
        Self::NotFound { entity }
    }

    /// Wrap any error as [`ServerError::Internal`].
    pub fn internal<E>(details: impl ToString, err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Internal {
            details: details.to_string(),
            source: Some(Box::new(err)),
        }
    }

    /// HTTP status bound to the error.
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::Validation(_)
            | ServerError::InvalidArgument(_)
            | ServerError::Axum(_)
            | ServerError::Path(_)
            | ServerError::Query(_)
            | ServerError::MultipartBody(_)
            | ServerError::Multipart(_) => StatusCode::BAD_REQUEST,
            ServerError::InvalidCredentials | ServerError::Unauthorized => {
                StatusCode::UNAUTHORIZED
            },
            ServerError::Forbidden => StatusCode::FORBIDDEN,
            ServerError::NotFound { .. } => StatusCode::NOT_FOUND,
            ServerError::Conflict(_) | ServerError::EmptyCatalog => {
                StatusCode::CONFLICT
            },
            ServerError::Sql(_) | ServerError::Internal { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            },
        }
    }
}

/// Structure for error responses.
#[derive(Debug, Serialize)]
pub struct ResponseError {
    result: bool,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<Vec<FieldError>>,
    #[serde(skip)]
    status: u16,
}

impl ResponseError {
    /// Update error status code.
    pub fn status(mut self, code: StatusCode) -> Self {
        self.status = code.as_u16();
        self
    }

    /// Update human-readable message.
    pub fn error(mut self, message: &str) -> Self {
        self.error = message.into();
        self
    }

    /// Automatically add errors field.
    pub fn errors(mut self, errors: &ValidationErrors) -> Self {
        self.errors = Some(parse_validation_errors(errors));
        self
    }

    /// Transform [`ResponseError`] into axum [`Response`].
    pub fn into_response(
        self,
    ) -> std::result::Result<Response, axum::http::Error> {
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

impl Default for ResponseError {
    fn default() -> Self {
        Self {
            result: false,
            error: "internal server error".to_owned(),
            errors: None,
            status: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
        }
    }
}

#[derive(Debug, Serialize)]
struct FieldError {
    field: String,
    message: String,
}

fn parse_validation_errors(errors: &ValidationErrors) -> Vec<FieldError> {
    errors
        .field_errors()
        .iter()
        .flat_map(|(field, issues)| {
            issues.iter().map(move |issue| FieldError {
                field: field.to_string(),
                message: issue
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| issue.code.to_string()),
            })
        })
        .collect()
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let response = ResponseError::default()
            .error(&self.to_string())
            .status(self.status());

        let response = match &self {
            ServerError::Validation(validation_errors) => response
                .error("There were validation errors with your request.")
                .errors(validation_errors),

            ServerError::Sql(err) => {
                tracing::error!(error = %err, "database request failed");
                ResponseError::default()
            },

            ServerError::Internal { details, source } => {
                tracing::error!(
                    error = source.as_ref().map(|s| s.to_string()),
                    %details,
                    "server returned 500 status"
                );
                ResponseError::default()
            },

            _ => response,
        };

        response
            .into_response()
            .unwrap_or_else(|_| internal_server_error())
    }
}

/// Fallback for routes that do not exist.
pub async fn not_found() -> Response {
    ResponseError::default()
        .error("API route not found")
        .status(StatusCode::NOT_FOUND)
        .into_response()
        .unwrap_or_else(|_| internal_server_error())
}

fn internal_server_error() -> Response {
    Response::builder()
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .header(header::CONTENT_TYPE, "application/json")
        .body(
            serde_json::json!({
                "result": false,
                "error": "internal server error",
            })
            .to_string()
            .into(),
        )
        .unwrap_or_else(|_| Response::new("internal server error".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_of(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_not_found_is_structured() {
        let response = ServerError::not_found("planning").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = body_of(response).await;
        assert_eq!(body["result"], false);
        assert_eq!(body["error"], "planning not found");
    }

    #[tokio::test]
    async fn test_internal_does_not_leak() {
        let err = ServerError::internal(
            "photo upload",
            std::io::Error::other("disk /var/secret is full"),
        );
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body_of(response).await;
        assert_eq!(body["error"], "internal server error");
        assert!(!body.to_string().contains("secret"));
    }

    #[tokio::test]
    async fn test_conflict_status() {
        let response =
            ServerError::Conflict("email already used".into()).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(body_of(response).await["error"], "email already used");
    }
}
