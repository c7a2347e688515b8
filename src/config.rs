//! Configuration manager for greenpoints.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::extract::FromRef;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::AppState;

const DEFAULT_CONFIG_PATH: &str = "config.yaml";
const DEFAULT_ADDRESS: &str = "0.0.0.0:3000";
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    /// Instance name.
    pub name: String,
    /// Public URL of current instance.
    pub url: String,
    /// Socket address the server binds to.
    pub address: String,
    version: String,
    #[serde(skip)]
    path: PathBuf,
    /// Related to PostgreSQL configuration.
    #[serde(skip_serializing)]
    pub postgres: Option<Postgres>,
    /// Related to Argon2 configuration.
    #[serde(skip_serializing)]
    pub argon2: Option<Argon2>,
    /// Related to photo hosting.
    #[serde(skip_serializing)]
    pub cloudinary: Option<Cloudinary>,
    /// Related to administrators.
    #[serde(skip_serializing)]
    pub admin: Option<Admin>,
    /// Related to challenge scheduling.
    pub challenges: Challenges,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_owned(),
            url: String::default(),
            address: DEFAULT_ADDRESS.to_owned(),
            version: VERSION.to_owned(),
            path: PathBuf::default(),
            postgres: None,
            argon2: None,
            cloudinary: None,
            admin: None,
            challenges: Challenges::default(),
        }
    }
}

/// PostgreSQL configuration.
#[derive(Debug, Default, PartialEq, Clone, Serialize, Deserialize)]
pub struct Postgres {
    /// Hostname:(?port) for PostgreSQL instance.
    pub address: String,
    /// Database name.
    pub database: Option<String>,
    /// Username credential to connect.
    pub username: Option<String>,
    /// Password credential to connect.
    pub password: Option<String>,
    /// Maximum pool connections.
    pub pool_size: Option<u32>,
}

/// Argon2 configuration.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Argon2 {
    /// Memory used while hashing.
    pub memory_cost: u32,
    /// Iterations of hash.
    pub iterations: u32,
    /// Parallelism degree.
    pub parallelism: u32,
    /// Output hash length.
    pub hash_length: usize,
}

impl Default for Argon2 {
    fn default() -> Self {
        Self {
            memory_cost: 1024 * 19, // 19 MiB.
            iterations: 2,
            parallelism: 1,
            hash_length: 32,
        }
    }
}

/// Cloudinary configuration.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cloudinary {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    /// Optional unsigned-upload preset.
    pub upload_preset: Option<String>,
    /// Directory for temporary photo files.
    pub tmp_dir: Option<PathBuf>,
}

/// Administrator configuration.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Admin {
    /// Secret expected in `X-Admin-Key` to create an administrator.
    /// Admin signup is closed while unset.
    pub signup_key: Option<String>,
}

/// Bulk generation windows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Challenges {
    pub daily_hours: i64,
    pub weekly_days: i64,
}

impl Default for Challenges {
    fn default() -> Self {
        Self {
            daily_hours: 24,
            weekly_days: 7,
        }
    }
}

impl FromRef<AppState> for Arc<Configuration> {
    fn from_ref(state: &AppState) -> Arc<Configuration> {
        Arc::clone(&state.config)
    }
}

impl Configuration {
    pub fn path(mut self, path: PathBuf) -> Self {
        self.path = path;
        self
    }

    /// Current crate version.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Normalizes a URL string by ensuring it starts with a valid scheme
    /// (`http` or `https`).
    fn normalize_url(&self, url: &str) -> Result<String, url::ParseError> {
        let url_with_scheme =
            if url.starts_with("http://") || url.starts_with("https://") {
                url.to_string()
            } else {
                format!("https://{url}")
            };

        let parsed_url = Url::parse(&url_with_scheme)?;
        Ok(parsed_url.to_string())
    }

    /// Reads the `config.yaml` file from the specified path or the default
    /// location.
    pub fn read(self) -> Result<Arc<Self>, url::ParseError> {
        let file_path = if self.path.is_file() {
            &self.path
        } else {
            &Path::new(DEFAULT_CONFIG_PATH).to_path_buf()
        };

        match File::open(file_path) {
            Ok(file) => {
                let mut config: Configuration =
                    match serde_yaml::from_reader(file) {
                        Ok(config) => config,
                        Err(err) => {
                            return Ok(Arc::new(self.error(err)));
                        },
                    };

                config.version = VERSION.to_owned();
                if !config.url.is_empty() {
                    config.url = self.normalize_url(&config.url)?;
                }

                // `PORT` wins over the configured port.
                if let Ok(port) = std::env::var("PORT") {
                    config.address = replace_port(&config.address, &port);
                }

                Ok(Arc::new(config))
            },
            Err(err) => Ok(Arc::new(self.error(err))),
        }
    }

    /// Return a default configuration as fallback.
    fn error(&self, err: impl std::error::Error) -> Self {
        tracing::error!(error = %err, "`config.yaml` file not found or invalid");
        let mut config = Self::default();
        if let Ok(port) = std::env::var("PORT") {
            config.address = replace_port(&config.address, &port);
        }
        config
    }
}

fn replace_port(address: &str, port: &str) -> String {
    match address.rsplit_once(':') {
        Some((host, _)) => format!("{host}:{port}"),
        None => format!("{address}:{port}"),
    }
}
