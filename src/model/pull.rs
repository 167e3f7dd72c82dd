//! Background replacement of the model artifact.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;

use crate::config::Settings;
use crate::error::{Error, Result};

use super::{DownloadTicket, Predictor};

/// Pulls a new model artifact and swaps it into the running predictor.
#[derive(Clone)]
pub struct ModelPuller {
    client: reqwest::Client,
    predictor: Arc<dyn Predictor>,
    source_url: Option<String>,
    path: PathBuf,
    idle_delay: Duration,
}

impl ModelPuller {
    /// Create a puller from the server settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(settings: &Settings, predictor: Arc<dyn Predictor>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.http.download_timeout())
            .build()
            .map_err(|source| Error::ModelDownload {
                url: settings.model.source_url.clone().unwrap_or_default(),
                source,
            })?;

        Ok(Self {
            client,
            predictor,
            source_url: settings.model.source_url.clone(),
            path: settings.model.path.clone(),
            idle_delay: settings.model.pull_delay(),
        })
    }

    /// Run one pull while holding `ticket`.
    ///
    /// Without a configured source this only holds the gate for the idle
    /// delay. The ticket is released when this returns, whatever the outcome.
    ///
    /// # Errors
    ///
    /// Returns an error if the download, the write or the reload fails.
    pub async fn pull(&self, ticket: DownloadTicket) -> Result<()> {
        let result = match &self.source_url {
            Some(url) => self.download_and_reload(url).await,
            None => {
                tracing::info!(
                    delay_secs = self.idle_delay.as_secs(),
                    "No model source configured, nothing to pull"
                );
                tokio::time::sleep(self.idle_delay).await;
                Ok(())
            }
        };

        ticket.end();
        result
    }

    async fn download_and_reload(&self, url: &str) -> Result<()> {
        download_file(&self.client, url, &self.path).await?;

        let predictor = Arc::clone(&self.predictor);
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || predictor.reload(&path))
            .await
            .map_err(|e| Error::Worker(e.to_string()))?
    }
}

/// Download a file from a URL to a path.
async fn download_file(client: &reqwest::Client, url: &str, path: &Path) -> Result<()> {
    tracing::info!("Downloading model from {url}");

    let download_error = |source: reqwest::Error| Error::ModelDownload {
        url: url.to_string(),
        source,
    };

    let mut response = client
        .get(url)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(download_error)?;

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    // Write to a temporary file first, then rename for atomicity
    let temp_path = path.with_extension("tmp");
    let downloaded = match write_body(&mut response, &temp_path, download_error).await {
        Ok(bytes) => bytes,
        Err(e) => {
            if let Err(cleanup) = tokio::fs::remove_file(&temp_path).await {
                tracing::warn!(
                    path = %temp_path.display(),
                    "Failed to remove partial download: {cleanup}"
                );
            }
            return Err(e);
        }
    };

    tokio::fs::rename(&temp_path, path).await?;

    tracing::info!(bytes = downloaded, path = %path.display(), "Model downloaded");
    Ok(())
}

/// Stream the response body into `temp_path`, returning the byte count.
async fn write_body(
    response: &mut reqwest::Response,
    temp_path: &Path,
    download_error: impl Fn(reqwest::Error) -> Error,
) -> Result<u64> {
    let mut file = tokio::fs::File::create(temp_path).await?;

    let mut downloaded = 0u64;
    while let Some(chunk) = response.chunk().await.map_err(&download_error)? {
        file.write_all(&chunk).await?;
        downloaded += chunk.len() as u64;
    }
    file.flush().await?;

    Ok(downloaded)
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::image::{ImageTensor, InputShape};
    use crate::model::DownloadGate;

    struct CountingReload(AtomicUsize);

    impl Predictor for CountingReload {
        fn input_shape(&self) -> InputShape {
            InputShape::new(8, 8, 3).unwrap()
        }

        fn predict(&self, _input: &ImageTensor) -> Result<Vec<f32>> {
            Ok(vec![0.0])
        }

        fn reload(&self, _path: &Path) -> Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn settings(extra: &str) -> Settings {
        Settings::from_toml(&format!(
            "backend_endpoint = \"http://localhost:3000/submissions\"\n{extra}"
        ))
        .unwrap()
    }

    #[actix_web::test]
    async fn test_pull_without_source_releases_gate() {
        let settings = settings("[model]\npull_delay_secs = 0");
        let predictor = Arc::new(CountingReload(AtomicUsize::new(0)));
        let puller = ModelPuller::new(&settings, predictor.clone()).unwrap();
        let gate = DownloadGate::new();

        let ticket = gate.try_begin().unwrap();
        puller.pull(ticket).await.unwrap();

        assert!(!gate.is_downloading());
        assert_eq!(predictor.0.load(Ordering::SeqCst), 0);
    }

    #[actix_web::test]
    async fn test_failed_pull_releases_gate() {
        let settings = settings(
            "[model]\nsource_url = \"http://127.0.0.1:1/mymodel.onnx\"\npath = \"target/pull-test/mymodel.onnx\"",
        );
        let predictor = Arc::new(CountingReload(AtomicUsize::new(0)));
        let puller = ModelPuller::new(&settings, predictor.clone()).unwrap();
        let gate = DownloadGate::new();

        let ticket = gate.try_begin().unwrap();
        let err = puller.pull(ticket).await.unwrap_err();

        assert!(matches!(err, Error::ModelDownload { .. }));
        assert!(!gate.is_downloading());
        assert_eq!(predictor.0.load(Ordering::SeqCst), 0);
    }

    /// Serve one response that promises more bytes than it sends, then hang up.
    fn truncated_server() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut buf).unwrap();
                if n == 0 {
                    return;
                }
                request.extend_from_slice(&buf[..n]);
            }
            stream
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 4096\r\n\r\npartial model bytes")
                .unwrap();
            stream.flush().unwrap();
        });

        format!("http://{addr}/mymodel.onnx")
    }

    #[actix_web::test]
    async fn test_interrupted_download_removes_temp_file() {
        let dir = std::env::temp_dir().join(format!("bersihin-pull-{}", std::process::id()));
        let model_path = dir.join("mymodel.onnx");
        let settings = settings(&format!(
            "[model]\nsource_url = \"{}\"\npath = \"{}\"",
            truncated_server(),
            model_path.display()
        ));
        let predictor = Arc::new(CountingReload(AtomicUsize::new(0)));
        let puller = ModelPuller::new(&settings, predictor.clone()).unwrap();
        let gate = DownloadGate::new();

        let err = puller.pull(gate.try_begin().unwrap()).await.unwrap_err();

        assert!(matches!(err, Error::ModelDownload { .. }));
        assert!(!model_path.with_extension("tmp").exists());
        assert!(!model_path.exists());
        assert!(!gate.is_downloading());
        assert_eq!(predictor.0.load(Ordering::SeqCst), 0);

        let _ = std::fs::remove_dir_all(dir);
    }
}
