//! Public status page and metrics exposition.

use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::router::Reply;
use crate::{AppState, ServerError};

/// Structured status.
#[derive(Debug, Serialize)]
pub struct Status {
    version: String,
    name: String,
}

/// Public server status.
pub async fn status(State(state): State<AppState>) -> Reply<Status> {
    Reply::ok(Status {
        version: state.config.version().to_owned(),
        name: state.config.name.clone(),
    })
}

/// Prometheus text exposition.
pub async fn metrics(State(state): State<AppState>) -> Result<Response, ServerError> {
    let handle = state.metrics.as_ref().ok_or(ServerError::not_found("metrics"))?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        handle.render(),
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};

    use crate::router::tests;
    use crate::{app, body_json, make_request};

    #[tokio::test]
    async fn test_status() {
        let app = app(tests::state());

        let response = make_request(app.clone(), Method::GET, "/status.json", None, String::new()).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["result"], true);
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
        assert_eq!(body["name"], "greenpoints");

        // No recorder installed.
        let metrics = make_request(app.clone(), Method::GET, "/metrics", None, String::new()).await;
        assert_eq!(metrics.status(), StatusCode::NOT_FOUND);

        let unknown = make_request(app, Method::GET, "/nowhere", None, String::new()).await;
        assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(unknown).await["error"], "API route not found");
    }
}
