//! Greenpoints runs team sustainability challenges: plannings to complete,
//! submissions, and department leaderboards kept consistent with them.

#![forbid(unsafe_code)]
pub mod blob;
pub mod challenge;
pub mod clock;
pub mod config;
pub mod crypto;
pub mod database;
pub mod department;
pub mod error;
pub mod id;
pub mod ledger;
mod middleware;
mod router;
pub mod telemetry;
pub mod user;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::http::{Method, StatusCode, header};
use axum::routing::get;
use axum::{Router, middleware as AxumMiddleware};
pub use error::ServerError;
use metrics_exporter_prometheus::PrometheusHandle;
use tower::ServiceBuilder;
use tower_http::LatencyUnit;
use tower_http::cors::{Any, CorsLayer};
use tower_http::sensitive_headers::SetSensitiveHeadersLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{
    DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer,
};

use crate::blob::{BlobStore, CloudinaryStore};
use crate::challenge::{Catalog, Comments};
use crate::clock::{Clock, SystemClock};
use crate::department::Directory;
use crate::ledger::Ledger;
use crate::user::IdentityService;

/// MUST NEVER be used in production.
#[cfg(test)]
pub async fn make_request(
    app: Router,
    method: Method,
    path: &str,
    token: Option<&str>,
    body: String,
) -> axum::http::Response<axum::body::Body> {
    let bearer = token.map(|token| format!("Bearer {token}"));
    let headers: Vec<(&str, &str)> = bearer
        .as_deref()
        .map(|bearer| vec![("authorization", bearer)])
        .unwrap_or_default();

    make_request_with(app, method, path, &headers, body).await
}

/// [`make_request`] with arbitrary headers.
#[cfg(test)]
pub async fn make_request_with(
    app: Router,
    method: Method,
    path: &str,
    headers: &[(&str, &str)],
    body: String,
) -> axum::http::Response<axum::body::Body> {
    use axum::extract::Request;
    use tower::util::ServiceExt;

    let mut request = Request::builder()
        .method(method)
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json");
    for (name, value) in headers {
        request = request.header(*name, *value);
    }

    app.oneshot(request.body(axum::body::Body::from(body)).unwrap())
        .await
        .unwrap()
}

/// Collect a JSON response body.
#[cfg(test)]
pub async fn body_json(
    response: axum::http::Response<axum::body::Body>,
) -> serde_json::Value {
    use http_body_util::BodyExt;

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// State sharing between routes.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<config::Configuration>,
    pub db: database::Database,
    pub crypto: Arc<crypto::Crypto>,
    pub clock: Arc<dyn Clock>,
    /// `None` when photo storage is not configured.
    pub blob: Option<Arc<dyn BlobStore>>,
    /// `None` when no recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn identity(&self) -> IdentityService {
        IdentityService::new(Arc::clone(&self.db.store), Arc::clone(&self.crypto))
    }

    pub fn directory(&self) -> Directory {
        Directory::new(Arc::clone(&self.db.store))
    }

    pub fn catalog(&self) -> Catalog {
        Catalog::new(
            Arc::clone(&self.db.store),
            Arc::clone(&self.clock),
            self.config.challenges.clone(),
        )
    }

    pub fn ledger(&self) -> Ledger {
        Ledger::new(Arc::clone(&self.db.store), Arc::clone(&self.clock))
    }

    pub fn comments(&self) -> Comments {
        Comments::new(Arc::clone(&self.db.store), Arc::clone(&self.clock))
    }
}

/// Create router.
pub fn app(state: AppState) -> Router {
    let middleware = ServiceBuilder::new()
        // Add high level tracing/logging to all requests.
        .layer(
            TraceLayer::new_for_http()
                .on_body_chunk(|chunk: &Bytes, latency: Duration, _span: &tracing::Span| {
                    tracing::trace!(size_bytes = chunk.len(), latency = ?latency, "sending body chunk")
                })
                .make_span_with(DefaultMakeSpan::new().include_headers(true).level(tracing::Level::INFO))
                .on_request(DefaultOnRequest::new())
                .on_response(DefaultOnResponse::new().include_headers(true).latency_unit(LatencyUnit::Micros)),
        )
        // Set a timeout.
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, Duration::from_secs(10)))
        // Remove sensitive headers from trace.
        .layer(SetSensitiveHeadersLayer::new([
            header::AUTHORIZATION,
            header::COOKIE,
            middleware::ADMIN_KEY,
        ]))
        // Add CORS preflight support.
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE, Method::OPTIONS])
                .allow_headers(Any)
                .vary([header::AUTHORIZATION]),
        );

    Router::new()
        // `GET /status.json` goes to `status`.
        .route("/status.json", get(router::status::status))
        // `GET /metrics` goes to `metrics`.
        .route("/metrics", get(router::status::metrics))
        .nest("/users", router::users::router(state.clone()))
        .nest("/depts", router::departments::router(state.clone()))
        .nest("/challenges", router::challenges::router(state.clone()))
        .nest("/photo", router::photo::router())
        .fallback(error::not_found)
        .with_state(state)
        .route_layer(AxumMiddleware::from_fn(telemetry::track))
        .layer(middleware)
}

/// Initialize the application state.
pub async fn initialize_state() -> Result<AppState, Box<dyn std::error::Error>>
{
    // read configuration file. let it in memory.
    let path = std::env::var("CONFIG_PATH").unwrap_or_default();
    let config = config::Configuration::default().path(path.into()).read()?;

    let db = match config.postgres {
        Some(ref config) => {
            database::Database::postgres(
                &config.address,
                config
                    .username
                    .as_deref()
                    .unwrap_or(database::DEFAULT_CREDENTIALS),
                config
                    .password
                    .as_deref()
                    .unwrap_or(database::DEFAULT_CREDENTIALS),
                config
                    .database
                    .as_deref()
                    .unwrap_or(database::DEFAULT_DATABASE_NAME),
                config.pool_size.unwrap_or(database::DEFAULT_POOL_SIZE),
            )
            .await?
        },
        None => {
            tracing::warn!(
                "missing `postgres` entry on `config.yaml` file, data is kept in memory"
            );
            database::Database::memory()
        },
    };

    let crypto = Arc::new(crypto::Crypto::new(config.argon2.clone())?);

    let blob = match config.cloudinary.clone() {
        Some(cloudinary) => {
            Some(Arc::new(CloudinaryStore::new(cloudinary)) as Arc<dyn BlobStore>)
        },
        None => {
            tracing::warn!("missing `cloudinary` entry, photo upload is disabled");
            None
        },
    };

    let metrics = match telemetry::setup_metrics_recorder() {
        Ok(handle) => Some(handle),
        Err(err) => {
            tracing::error!(error = %err, "prometheus recorder not installed");
            None
        },
    };

    Ok(AppState {
        config,
        db,
        crypto,
        clock: Arc::new(SystemClock),
        blob,
        metrics,
    })
}
