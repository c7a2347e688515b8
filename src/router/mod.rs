//! HTTP API.
pub mod challenges;
pub mod departments;
pub mod photo;
pub mod status;
pub mod users;

use axum::Json;
use axum::extract::{FromRequest, FromRequestParts, Path, Query, Request};
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use validator::Validate;

use crate::ServerError;

/// JSON body checked with [`Validate`] before reaching the handler.
#[derive(Debug, Clone, Copy, Default)]
pub struct Valid<T>(pub T);

impl<T, S> FromRequest<S> for Valid<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        value.validate()?;
        Ok(Valid(value))
    }
}

/// URL parameters; rejections use the JSON error body.
#[derive(Debug, Clone, Copy, Default)]
pub struct Param<T>(pub T);

impl<T, S> FromRequestParts<S> for Param<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(value) = Path::<T>::from_request_parts(parts, state).await?;
        Ok(Param(value))
    }
}

/// Query string; rejections use the JSON error body.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryString<T>(pub T);

impl<T, S> FromRequestParts<S> for QueryString<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state).await?;
        Ok(QueryString(value))
    }
}

#[derive(Serialize)]
struct Envelope<T> {
    result: bool,
    #[serde(flatten)]
    body: T,
}

#[derive(Serialize)]
struct Declined {
    error: String,
}

/// Response wrapped into `{ "result": bool, ... }`.
pub struct Reply<T> {
    status: StatusCode,
    result: bool,
    body: T,
}

impl<T: Serialize> Reply<T> {
    /// `200 OK` with `result: true`.
    pub fn ok(body: T) -> Self {
        Self {
            status: StatusCode::OK,
            result: true,
            body,
        }
    }

    /// `201 Created` with `result: true`.
    pub fn created(body: T) -> Self {
        Self {
            status: StatusCode::CREATED,
            ..Self::ok(body)
        }
    }
}

/// Expected, non-exceptional refusal: `{ "result": false, "error": ... }`.
pub fn declined(status: StatusCode, error: impl Into<String>) -> Response {
    Reply {
        status,
        result: false,
        body: Declined {
            error: error.into(),
        },
    }
    .into_response()
}

impl<T: Serialize> IntoResponse for Reply<T> {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(Envelope {
                result: self.result,
                body: self.body,
            }),
        )
            .into_response()
    }
}
