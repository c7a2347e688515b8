//! Photo upload proxy.

use axum::Router;
use axum::extract::multipart::MultipartRejection;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use serde::Serialize;

use crate::error::Result;
use crate::router::{Reply, declined};
use crate::{AppState, ServerError};

const PHOTO_FIELD: &str = "photoFromFront";
const MAX_PHOTO_SIZE: usize = 10 * 1024 * 1024;

#[derive(Debug, Serialize)]
pub struct Uploaded {
    url: String,
}

/// Buffer the photo into a temporary file, then forward it.
///
/// The file is removed when `file` drops, whichever way this returns.
async fn upload(
    State(state): State<AppState>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Response> {
    let mut multipart = multipart?;
    let Some(blob) = state.blob.clone() else {
        return Ok(declined(
            StatusCode::SERVICE_UNAVAILABLE,
            "photo storage is not configured",
        ));
    };

    let mut photo = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some(PHOTO_FIELD) {
            photo = Some(field.bytes().await?);
            break;
        }
    }
    let photo = photo
        .filter(|bytes| !bytes.is_empty())
        .ok_or_else(|| ServerError::InvalidArgument(format!("{PHOTO_FIELD} is required")))?;

    let mut builder = tempfile::Builder::new();
    builder.prefix("photo-").suffix(".jpg");
    let file = match state
        .config
        .cloudinary
        .as_ref()
        .and_then(|config| config.tmp_dir.as_ref())
    {
        Some(dir) => builder.tempfile_in(dir),
        None => builder.tempfile(),
    }
    .map_err(|err| ServerError::internal("creating temporary photo", err))?;

    tokio::fs::write(file.path(), &photo)
        .await
        .map_err(|err| ServerError::internal("writing temporary photo", err))?;

    let url = blob.upload(file.path()).await?;

    Ok(Reply::ok(Uploaded { url }).into_response())
}

pub fn router() -> Router<AppState> {
    Router::new()
        // `POST /photo/upload` goes to `upload`.
        .route("/upload", post(upload))
        .layer(DefaultBodyLimit::max(MAX_PHOTO_SIZE))
}
