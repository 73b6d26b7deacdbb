use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::config::Tunables;
use crate::error::XformerError;

/// Added on top of the server's `Retry-After` before re-issuing a request.
pub const RETRY_AFTER_PADDING: Duration = Duration::from_secs(1);

/// A single HTTP response, reduced to what pagination needs.
#[derive(Debug, Clone)]
pub struct PageResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl PageResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    fn retry_after(&self) -> Option<u64> {
        self.header("retry-after")
            .and_then(|value| value.trim().parse::<u64>().ok())
            .filter(|seconds| *seconds > 0)
    }
}

/// Blocking request/sleep seam used by [`GuideFetcher`].
pub trait Transport {
    fn get(&mut self, url: &str, api_key: &str) -> Result<PageResponse, XformerError>;

    fn pause(&mut self, delay: Duration) {
        thread::sleep(delay);
    }
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn get(&mut self, url: &str, api_key: &str) -> Result<PageResponse, XformerError> {
        (**self).get(url, api_key)
    }

    fn pause(&mut self, delay: Duration) {
        (**self).pause(delay);
    }
}

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, XformerError> {
        let client = Client::builder()
            .user_agent(concat!("schedule-xformer/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn get(&mut self, url: &str, api_key: &str) -> Result<PageResponse, XformerError> {
        let response = self
            .client
            .get(url)
            .header(AUTHORIZATION, format!("JWT {api_key}"))
            .send()?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(key, value)| {
                (
                    key.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = response.text()?;

        Ok(PageResponse {
            status,
            headers,
            body,
        })
    }
}

#[derive(Debug, Deserialize)]
struct PageEnvelope {
    #[serde(default)]
    count: u64,
    #[serde(default)]
    next: Option<String>,
    #[serde(default)]
    results: Vec<Value>,
}

/// Follows Guidebook's `next` cursors for one collection at a time.
///
/// The fetcher keeps a running count of successful page requests across every
/// collection it has fetched; rate-limited attempts are not counted.
#[derive(Debug)]
pub struct GuideFetcher<T> {
    transport: T,
    api_base: String,
    guide_id: String,
    api_key: String,
    successful_requests: usize,
}

impl GuideFetcher<HttpTransport> {
    pub fn from_tunables(tunables: &Tunables) -> Result<Self, XformerError> {
        Ok(Self::new(
            HttpTransport::new()?,
            &tunables.api_base,
            &tunables.guide_id,
            &tunables.api_key,
        ))
    }
}

impl<T: Transport> GuideFetcher<T> {
    pub fn new(transport: T, api_base: &str, guide_id: &str, api_key: &str) -> Self {
        Self {
            transport,
            api_base: api_base.trim_end_matches('/').to_string(),
            guide_id: guide_id.to_string(),
            api_key: api_key.to_string(),
            successful_requests: 0,
        }
    }

    pub fn successful_requests(&self) -> usize {
        self.successful_requests
    }

    pub fn collection_url(&self, collection: &str) -> String {
        format!("{}/{}/?guide={}", self.api_base, collection, self.guide_id)
    }

    /// Fetch every page of `collection` and return the concatenated `results`
    /// re-encoded as a JSON array.
    pub fn fetch_collection(&mut self, collection: &str) -> Result<Vec<u8>, XformerError> {
        let mut results: Vec<Value> = Vec::new();
        let mut next_url = Some(self.collection_url(collection));

        while let Some(url) = next_url {
            let response = self.fetch_page(collection, &url)?;
            let page: PageEnvelope = serde_json::from_str(&response.body).map_err(|source| {
                error!(collection, payload = %response.body, "Undecodable page envelope");
                XformerError::Decode {
                    resource: format!("{collection} page"),
                    payload: response.body.clone(),
                    source,
                }
            })?;

            debug!(
                collection,
                count = page.count,
                received = page.results.len(),
                "Fetched page"
            );
            results.extend(page.results);
            next_url = page.next.filter(|next| !next.trim().is_empty());
        }

        info!(
            collection,
            requests = self.successful_requests,
            "Fetched {collection} chain"
        );

        Ok(serde_json::to_vec(&results)?)
    }

    fn fetch_page(&mut self, collection: &str, url: &str) -> Result<PageResponse, XformerError> {
        loop {
            let response = self.transport.get(url, &self.api_key)?;
            match response.status {
                200 => {
                    self.successful_requests += 1;
                    return Ok(response);
                }
                429 => match response.retry_after() {
                    Some(seconds) => {
                        warn!(
                            collection,
                            request = self.successful_requests + 1,
                            wait_secs = seconds,
                            "Rate limited; waiting before retrying"
                        );
                        self.transport
                            .pause(Duration::from_secs(seconds) + RETRY_AFTER_PADDING);
                    }
                    None => {
                        warn!(
                            collection,
                            "Rate limited without Retry-After; response headers follow"
                        );
                        for (key, value) in &response.headers {
                            warn!(header = %key, value = %value, "rate-limit response header");
                        }
                        return Err(XformerError::RateLimited {
                            collection: collection.to_string(),
                        });
                    }
                },
                status => {
                    return Err(XformerError::Status {
                        collection: collection.to_string(),
                        status,
                        body: response.body,
                    });
                }
            }
        }
    }
}
