//! Downloads images referenced by URL.

use std::time::Duration;

use crate::error::{Error, Result};

/// HTTP client for image URLs.
#[derive(Debug, Clone)]
pub struct ImageFetcher {
    client: reqwest::Client,
}

impl ImageFetcher {
    /// Create a fetcher whose requests give up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| Error::Fetch {
                url: String::new(),
                source,
            })?;

        Ok(Self { client })
    }

    /// GET `url` and return the body.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server answers with a
    /// non-success status.
    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let fetch_error = |source: reqwest::Error| Error::Fetch {
            url: url.to_string(),
            source,
        };

        let response = self.client.get(url).send().await.map_err(fetch_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::FetchStatus {
                url: url.to_string(),
                status,
            });
        }

        let bytes = response.bytes().await.map_err(fetch_error)?;
        tracing::debug!(url, bytes = bytes.len(), "Fetched image");

        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[actix_web::test]
    async fn test_unreachable_host_is_fetch_error() {
        let fetcher = ImageFetcher::new(Duration::from_secs(5)).unwrap();

        let err = fetcher.fetch("http://127.0.0.1:1/cat.png").await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Fetch);
        assert!(err.to_string().contains("http://127.0.0.1:1/cat.png"));
    }

    #[actix_web::test]
    async fn test_malformed_url_is_fetch_error() {
        let fetcher = ImageFetcher::new(Duration::from_secs(5)).unwrap();

        let err = fetcher.fetch("not a url").await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Fetch);
    }
}
