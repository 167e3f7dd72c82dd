//! Server settings.
//!
//! Sources, lowest precedence first: built-in defaults, an optional TOML
//! file, `INFERENCE_`-prefixed environment variables (`__` separates
//! sections, e.g. `INFERENCE_SERVER__PORT`), and the bare `BACKEND_ENDPOINT`
//! variable. Variables can also come from a `.env` file loaded with
//! [`load_env_file`]; the real environment wins over it.

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, ConfigBuilder, Environment, File, FileFormat};
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::image::InputShape;

/// Default location of the settings file.
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Default location of the environment file.
pub const DEFAULT_ENV_FILE: &str = ".env";

/// Export the variables of a `.env` file into the process environment.
///
/// Variables already set are left alone. Returns `false` if the file does
/// not exist.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_env_file<P: AsRef<Path>>(path: P) -> Result<bool> {
    let path = path.as_ref();
    match dotenvy::from_path(path) {
        Ok(()) => Ok(true),
        Err(e) if e.not_found() => Ok(false),
        Err(source) => Err(Error::EnvFile {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Top-level settings.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub app_name: String,
    /// Where verification decisions are PUT.
    pub backend_endpoint: String,
    pub server: ServerSettings,
    pub model: ModelSettings,
    pub http: HttpSettings,
}

/// HTTP listener settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Worker threads; 0 lets actix pick one per core.
    pub workers: usize,
    /// Largest accepted upload, in bytes.
    pub max_upload_bytes: usize,
}

/// Model artifact settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelSettings {
    /// ONNX artifact loaded at startup.
    pub path: PathBuf,
    /// Where `/pull-model` fetches a replacement artifact from.
    pub source_url: Option<String>,
    /// `[width, height, channels]`, for models with dynamic input dims.
    pub input_shape: Option<[usize; 3]>,
    /// ONNX Runtime intra-op threads.
    pub intra_threads: usize,
    /// How long a pull holds the gate when no `source_url` is set.
    pub pull_delay_secs: u64,
}

/// Outbound HTTP settings.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpSettings {
    pub fetch_timeout_secs: u64,
    pub report_timeout_secs: u64,
    pub download_timeout_secs: u64,
}

impl Settings {
    /// Load settings from [`DEFAULT_CONFIG_PATH`] and the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a source is malformed or validation fails.
    pub fn load() -> Result<Self> {
        Self::load_from_path(DEFAULT_CONFIG_PATH)
    }

    /// Load settings from a specific file (if it exists) and the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a source is malformed or validation fails.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let builder = defaults()?
            .add_source(File::from(path.as_ref()).required(false))
            .add_source(
                Environment::with_prefix("INFERENCE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("backend_endpoint", std::env::var("BACKEND_ENDPOINT").ok())?;

        Self::finish(builder)
    }

    /// Load settings from TOML text on top of the defaults, ignoring the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is malformed or validation fails.
    pub fn from_toml(text: &str) -> Result<Self> {
        Self::finish(defaults()?.add_source(File::from_str(text, FileFormat::Toml)))
    }

    fn finish(builder: ConfigBuilder<config::builder::DefaultState>) -> Result<Self> {
        let settings: Self = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate the settings.
    ///
    /// # Errors
    ///
    /// Returns an error if any value is out of its valid range.
    pub fn validate(&self) -> Result<()> {
        validate_http_url("backend_endpoint", &self.backend_endpoint)?;

        if let Some(url) = &self.model.source_url {
            validate_http_url("model.source_url", url)?;
        }

        if self.server.port == 0 {
            return Err(Error::InvalidParameter {
                name: "server.port".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }

        if self.server.max_upload_bytes == 0 {
            return Err(Error::InvalidParameter {
                name: "server.max_upload_bytes".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }

        if self.model.intra_threads == 0 {
            return Err(Error::InvalidParameter {
                name: "model.intra_threads".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }

        self.model.shape_override()?;

        Ok(())
    }

    /// Address the HTTP server binds to.
    #[must_use]
    pub fn bind_address(&self) -> (String, u16) {
        (self.server.host.clone(), self.server.port)
    }
}

impl ModelSettings {
    /// The configured input shape override, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the override is not a valid RGB shape.
    pub fn shape_override(&self) -> Result<Option<InputShape>> {
        let Some([width, height, channels]) = self.input_shape else {
            return Ok(None);
        };

        let to_u32 = |name: &str, value: usize| {
            u32::try_from(value).map_err(|_| Error::InvalidParameter {
                name: format!("model.input_shape.{name}"),
                reason: "too large".to_string(),
            })
        };

        InputShape::new(to_u32("width", width)?, to_u32("height", height)?, channels).map(Some)
    }

    #[must_use]
    pub const fn pull_delay(&self) -> Duration {
        Duration::from_secs(self.pull_delay_secs)
    }
}

impl HttpSettings {
    #[must_use]
    pub const fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    #[must_use]
    pub const fn report_timeout(&self) -> Duration {
        Duration::from_secs(self.report_timeout_secs)
    }

    #[must_use]
    pub const fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }
}

fn defaults() -> Result<ConfigBuilder<config::builder::DefaultState>> {
    Ok(Config::builder()
        .set_default("app_name", "Bersihin Server Inference")?
        .set_default("server.host", "0.0.0.0")?
        .set_default("server.port", 8000)?
        .set_default("server.workers", 0)?
        .set_default("server.max_upload_bytes", 10 * 1024 * 1024)?
        .set_default("model.path", "model/mymodel.onnx")?
        .set_default("model.intra_threads", 1)?
        .set_default("model.pull_delay_secs", 10)?
        .set_default("http.fetch_timeout_secs", 30)?
        .set_default("http.report_timeout_secs", 10)?
        .set_default("http.download_timeout_secs", 600)?)
}

fn validate_http_url(name: &str, value: &str) -> Result<()> {
    let invalid = |reason: String| Error::InvalidParameter {
        name: name.to_string(),
        reason,
    };

    let url = reqwest::Url::parse(value).map_err(|e| invalid(format!("not a URL: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(invalid(format!("unsupported scheme {other}"))),
    }
}
