use super::page::PageResponse;
use crate::error::ConnectorError;
use async_trait::async_trait;
use engine_core::{
    metrics::Metrics,
    retry::{RetryDisposition, RetryPolicy},
    source::UnitError,
};
use model::pagination::batch::BatchDescriptor;
use reqwest::{Client, StatusCode, Url};
use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};
use thiserror::Error;
use tracing::{debug, warn};

const USER_AGENT: &str = concat!("matsync/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Statuses worth another attempt.
const RETRY_STATUSES: [StatusCode; 5] = [
    StatusCode::TOO_MANY_REQUESTS,
    StatusCode::INTERNAL_SERVER_ERROR,
    StatusCode::BAD_GATEWAY,
    StatusCode::SERVICE_UNAVAILABLE,
    StatusCode::GATEWAY_TIMEOUT,
];

/// Fetches a single page of entries.
#[async_trait]
pub trait PageClient: Send + Sync {
    async fn fetch_page(&self, batch: &BatchDescriptor) -> Result<PageResponse, UnitError>;
}

#[derive(Debug, Error)]
enum RequestFailure {
    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    #[error("HTTP {0}")]
    Status(StatusCode),
}

impl RequestFailure {
    fn disposition(&self) -> RetryDisposition {
        match self {
            RequestFailure::Status(status) if RETRY_STATUSES.contains(status) => {
                RetryDisposition::Retry
            }
            RequestFailure::Transport(err) if err.is_timeout() || err.is_connect() => {
                RetryDisposition::Retry
            }
            _ => RetryDisposition::Stop,
        }
    }
}

/// HTTP client for an OPTIMADE `/structures` endpoint.
pub struct OptimadeClient {
    client: Client,
    base_url: Url,
    retry: RetryPolicy,
    metrics: Metrics,
}

impl OptimadeClient {
    pub fn new(base_url: &str, retry: RetryPolicy, metrics: Metrics) -> Result<Self, ConnectorError> {
        let base_url =
            Url::parse(base_url).map_err(|_| ConnectorError::InvalidUrl(base_url.to_string()))?;
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(OptimadeClient {
            client,
            base_url,
            retry,
            metrics,
        })
    }

    /// `{base}?page_limit=N&sort=id&page_offset=M`. Sorting by id keeps
    /// offsets stable between requests.
    pub fn page_url(&self, batch: &BatchDescriptor) -> Url {
        let mut url = self.base_url.clone();
        url.query_pairs_mut()
            .append_pair("page_limit", &batch.limit.to_string())
            .append_pair("sort", "id")
            .append_pair("page_offset", &batch.offset.to_string());
        url
    }

    async fn get_once(&self, url: &Url) -> Result<PageResponse, RequestFailure> {
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(RequestFailure::Status(status));
        }
        Ok(response.json::<PageResponse>().await?)
    }
}

#[async_trait]
impl PageClient for OptimadeClient {
    async fn fetch_page(&self, batch: &BatchDescriptor) -> Result<PageResponse, UnitError> {
        let url = self.page_url(batch);
        debug!("GET {}", url);

        let attempts = AtomicU64::new(0);
        let counter = &attempts;
        let target = &url;
        let result = self
            .retry
            .run(
                move || async move {
                    counter.fetch_add(1, Ordering::Relaxed);
                    self.get_once(target).await
                },
                |err: &RequestFailure| {
                    let disposition = err.disposition();
                    if disposition == RetryDisposition::Retry {
                        warn!("Request for {} failed ({}), retrying", batch, err);
                    }
                    disposition
                },
            )
            .await;

        let retries = attempts.load(Ordering::Relaxed).saturating_sub(1);
        if retries > 0 {
            self.metrics.increment_retries(retries);
        }

        result.map_err(|err| {
            UnitError::external(format!("fetching {batch} from {}", self.base_url), err.into_inner())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
    };

    /// Serves `responses` in order, one per connection.
    async fn serve(responses: Vec<(u16, &'static str)>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            for (status, body) in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut buf = Vec::new();
                let mut chunk = [0u8; 1024];
                while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                    let n = socket.read(&mut chunk).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    buf.extend_from_slice(&chunk[..n]);
                }
                let reply = format!(
                    "HTTP/1.1 {status} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                socket.write_all(reply.as_bytes()).await.unwrap();
                socket.shutdown().await.ok();
            }
        });

        format!("http://{addr}/v1/structures")
    }

    fn client(url: &str, attempts: usize) -> OptimadeClient {
        OptimadeClient::new(url, RetryPolicy::immediate(attempts), Metrics::new()).unwrap()
    }

    #[test]
    fn builds_paged_urls() {
        let client = client("https://alexandria.icams.rub.de/pbe/v1/structures", 1);
        let url = client.page_url(&BatchDescriptor::new(1000, 500));
        assert_eq!(
            url.as_str(),
            "https://alexandria.icams.rub.de/pbe/v1/structures?page_limit=500&sort=id&page_offset=1000"
        );
    }

    #[test]
    fn rejects_bad_base_url() {
        let result = OptimadeClient::new("not a url", RetryPolicy::immediate(1), Metrics::new());
        assert!(matches!(result, Err(ConnectorError::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn fetches_and_decodes_page() {
        let url = serve(vec![(200, r#"{"data":[{"id":"a"},{"id":"b"}],"meta":{}}"#)]).await;
        let page = client(&url, 1)
            .fetch_page(&BatchDescriptor::new(0, 2))
            .await
            .unwrap();
        assert_eq!(page.data.len(), 2);
    }

    #[tokio::test]
    async fn retries_throttled_requests() {
        let url = serve(vec![(503, "{}"), (200, r#"{"data":[{"id":"a"}]}"#)]).await;
        let metrics = Metrics::new();
        let client = OptimadeClient::new(&url, RetryPolicy::immediate(3), metrics.clone()).unwrap();

        let page = client.fetch_page(&BatchDescriptor::new(0, 10)).await.unwrap();
        assert_eq!(page.data.len(), 1);
        assert_eq!(metrics.snapshot().retry_count, 1);
    }

    #[tokio::test]
    async fn client_errors_are_recoverable() {
        let url = serve(vec![(404, "{}")]).await;
        let err = client(&url, 3)
            .fetch_page(&BatchDescriptor::new(0, 10))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("HTTP 404"));
        assert!(!err.is_critical());
    }

    #[tokio::test]
    async fn refused_connections_are_critical() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = client(&format!("http://{addr}/v1/structures"), 2)
            .fetch_page(&BatchDescriptor::new(0, 10))
            .await
            .unwrap_err();
        assert!(err.is_critical(), "expected critical, got {err}");
    }
}
