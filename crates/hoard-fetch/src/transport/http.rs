//! reqwest-backed transport with `file://` support

use futures::{FutureExt, StreamExt, TryStreamExt};
use futures::future::BoxFuture;
use hoard_core::{HoardError, HoardResult};
use reqwest::{Client, ClientBuilder};
use std::time::Duration;
use tokio_util::io::ReaderStream;
use tracing::debug;
use url::Url;

use super::{TransferResponse, Transport};

/// Streams `http(s)://` links with reqwest and `file://` links from disk
#[derive(Debug, Clone)]
pub struct HttpTransport {
    /// Underlying HTTP client with connection pooling
    client: Client,
}

impl HttpTransport {
    pub fn new() -> HoardResult<Self> {
        let client = ClientBuilder::new()
            // Connection pooling configuration
            .pool_max_idle_per_host(8)
            .pool_idle_timeout(Duration::from_secs(90))
            // Only bound connecting; large bodies are policed by the rate monitor
            .connect_timeout(Duration::from_secs(30))
            .gzip(true)
            .user_agent(concat!("hoard/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| HoardError::network(format!("Failed to create HTTP client: {}", e), e))?;
        Ok(Self { client })
    }

    async fn open_http(&self, link: &Url) -> HoardResult<TransferResponse> {
        let response = self
            .client
            .get(link.clone())
            .send()
            .await
            .map_err(|e| HoardError::network(format!("Failed to request {}: {}", link, e), e))?;

        let status = response.status().as_u16();
        let content_length = response.content_length();
        debug!("{} answered {} (length {:?})", link, status, content_length);

        let body = response
            .bytes_stream()
            .map_err(|e| HoardError::network(format!("Failed to read body: {}", e), e))
            .boxed();

        Ok(TransferResponse {
            status,
            content_length,
            body,
        })
    }

    async fn open_file(&self, link: &Url) -> HoardResult<TransferResponse> {
        let path = link.to_file_path().map_err(|_| HoardError::InvalidAsset {
            name: link.to_string(),
            reason: "file link does not name a local path".to_string(),
        })?;
        let file = tokio::fs::File::open(&path)
            .await
            .map_err(|e| HoardError::io(format!("Failed to open {}", path.display()), e))?;
        let content_length = file
            .metadata()
            .await
            .map_err(|e| HoardError::io(format!("Failed to stat {}", path.display()), e))?
            .len();

        let body = ReaderStream::new(file)
            .map_err(|e| HoardError::io("Failed to read local file".to_string(), e))
            .boxed();

        Ok(TransferResponse {
            status: 200,
            content_length: Some(content_length),
            body,
        })
    }
}

impl Transport for HttpTransport {
    fn open<'a>(&'a self, link: &'a Url) -> BoxFuture<'a, HoardResult<TransferResponse>> {
        async move {
            match link.scheme() {
                "http" | "https" => self.open_http(link).await,
                "file" => self.open_file(link).await,
                scheme => Err(HoardError::InvalidAsset {
                    name: link.to_string(),
                    reason: format!("unsupported link scheme '{}'", scheme),
                }),
            }
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use tempfile::tempdir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn collect(response: TransferResponse) -> Vec<u8> {
        response
            .body
            .try_fold(Vec::new(), |mut acc, chunk| async move {
                acc.extend_from_slice(&chunk);
                Ok(acc)
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_http_body_and_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/media/clip.bin"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"clip".to_vec()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let transport = HttpTransport::new().unwrap();
        let link = Url::parse(&format!("{}/media/clip.bin", server.uri())).unwrap();
        let response = transport.open(&link).await.unwrap();
        assert!(response.is_success());
        assert_eq!(collect(response).await, b"clip");

        let link = Url::parse(&format!("{}/missing", server.uri())).unwrap();
        let response = transport.open(&link).await.unwrap();
        assert_eq!(response.status, 404);
        assert!(!response.is_success());
    }

    #[tokio::test]
    async fn test_file_link() {
        let temp_dir = tempdir().unwrap();
        let file = temp_dir.path().join("local.bin");
        std::fs::write(&file, b"local bytes").unwrap();

        let transport = HttpTransport::new().unwrap();
        let response = transport
            .open(&Url::from_file_path(&file).unwrap())
            .await
            .unwrap();
        assert_eq!(response.content_length, Some(11));
        assert_eq!(collect(response).await, b"local bytes");

        let missing = Url::from_file_path(temp_dir.path().join("nope")).unwrap();
        assert!(matches!(
            transport.open(&missing).await,
            Err(HoardError::Io { .. })
        ));
    }

    #[tokio::test]
    async fn test_unsupported_scheme() {
        let transport = HttpTransport::new().unwrap();
        let link = Url::parse("ftp://example.com/a").unwrap();
        assert!(matches!(
            transport.open(&link).await,
            Err(HoardError::InvalidAsset { .. })
        ));
    }
}
