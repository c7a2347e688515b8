//! Remote photo hosting.

use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use sha1::{Digest, Sha1};

use crate::ServerError;
use crate::config::Cloudinary;
use crate::error::Result;

const CLOUDINARY_API: &str = "https://api.cloudinary.com/v1_1";

/// Upload a local file and get back its public URL.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn upload(&self, path: &Path) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: String,
}

/// Sign upload parameters: `k=v` pairs sorted by key, joined with `&`,
/// followed by the secret.
fn sign(params: &[(&str, &str)], secret: &str) -> String {
    let mut params = params.to_vec();
    params.sort_by(|a, b| a.0.cmp(b.0));
    let payload = params
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&");

    let mut hasher = Sha1::new();
    hasher.update(payload.as_bytes());
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// Cloudinary image API client.
#[derive(Clone)]
pub struct CloudinaryStore {
    http: Client,
    config: Cloudinary,
}

impl CloudinaryStore {
    pub fn new(config: Cloudinary) -> Self {
        Self {
            http: Client::new(),
            config,
        }
    }
}

#[async_trait]
impl BlobStore for CloudinaryStore {
    async fn upload(&self, path: &Path) -> Result<String> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|err| ServerError::internal("reading temporary photo", err))?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "photo.jpg".to_owned());

        let timestamp = Utc::now().timestamp().to_string();
        let mut params = vec![("timestamp", timestamp.as_str())];
        if let Some(preset) = self.config.upload_preset.as_deref() {
            params.push(("upload_preset", preset));
        }
        let signature = sign(&params, &self.config.api_secret);

        let mut form = Form::new()
            .part("file", Part::bytes(bytes).file_name(file_name))
            .text("api_key", self.config.api_key.clone())
            .text("signature", signature);
        for (key, value) in params {
            form = form.text(key, value.to_owned());
        }

        let response = self
            .http
            .post(format!(
                "{CLOUDINARY_API}/{}/image/upload",
                self.config.cloud_name
            ))
            .multipart(form)
            .send()
            .await
            .map_err(|err| ServerError::internal("photo upload", err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ServerError::Internal {
                details: format!("photo upload rejected with status {status}"),
                source: None,
            });
        }

        let body = response
            .json::<UploadResponse>()
            .await
            .map_err(|err| ServerError::internal("photo upload response", err))?;

        tracing::debug!(url = %body.secure_url, "photo uploaded");
        Ok(body.secure_url)
    }
}

/// Store answering a fixed URL.
#[cfg(test)]
pub struct StaticBlobStore(pub String);

#[cfg(test)]
#[async_trait]
impl BlobStore for StaticBlobStore {
    async fn upload(&self, path: &Path) -> Result<String> {
        assert!(path.exists(), "temporary file must exist during upload");
        Ok(self.0.clone())
    }
}

/// Store whose upload always fails, once the file is in place.
#[cfg(test)]
pub struct FailingBlobStore;

#[cfg(test)]
#[async_trait]
impl BlobStore for FailingBlobStore {
    async fn upload(&self, path: &Path) -> Result<String> {
        assert!(path.exists(), "temporary file must exist during upload");
        Err(ServerError::Internal {
            details: "photo storage rejected the upload".into(),
            source: None,
        })
    }
}
