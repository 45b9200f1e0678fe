//! Client for the remote file-listing API.
//!
//! [`RemoteApi`] is the seam the walker and downloader talk to; [`HttpApi`]
//! implements it over `reqwest`. Two POST endpoints are used (list a
//! directory, resolve a direct download link) plus a plain GET for the
//! file body.

pub mod retry;

#[cfg(test)]
pub(crate) mod mock;

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::config::{Config, RetryConfig};
use crate::error::{Error, Result};

/// Logged response bodies are cut to this many characters.
const LOG_BODY_LIMIT: usize = 200;

/// Streamed body of a file download.
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// One item of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteEntry {
    /// Base name.
    pub name: String,
    /// Whether the entry is a directory.
    pub is_dir: bool,
    /// Size in bytes; directories usually report 0.
    #[serde(default)]
    pub size: u64,
}

impl RemoteEntry {
    /// A file entry.
    #[must_use]
    pub fn file(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            is_dir: false,
            size,
        }
    }

    /// A directory entry.
    #[must_use]
    pub fn dir(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_dir: true,
            size: 0,
        }
    }
}

/// Envelope every JSON endpoint answers with.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    code: i64,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

impl<T> ApiResponse<T> {
    fn into_data(self) -> Result<T> {
        if self.code != 200 {
            return Err(Error::Api {
                code: self.code,
                message: if self.message.is_empty() {
                    "unknown error".to_string()
                } else {
                    self.message
                },
            });
        }
        self.data.ok_or(Error::MissingData)
    }
}

#[derive(Debug, Deserialize)]
struct ListData {
    #[serde(default)]
    content: Option<Vec<RemoteEntry>>,
}

#[derive(Debug, Deserialize)]
struct LinkData {
    raw_url: String,
}

/// Operations the mirror needs from the remote side.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Lists the entries of the directory at `full_path`.
    async fn list_dir(&self, full_path: &str) -> Result<Vec<RemoteEntry>>;

    /// Resolves the direct download URL for the file at `remote_path`.
    async fn resolve_download_url(&self, remote_path: &str) -> Result<String>;

    /// Starts a download and returns its body as a stream of chunks.
    async fn open_download(&self, url: &str) -> Result<ByteStream>;
}

/// [`RemoteApi`] over HTTP. Holds the single session used for the whole run.
pub struct HttpApi {
    http: reqwest::Client,
    headers: HeaderMap,
    list_url: Url,
    get_url: Url,
    password: String,
    per_page: u32,
    list_timeout: Duration,
    retry: RetryConfig,
}

fn header_map(config: &Config) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    for (name, value) in &config.headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| Error::Config(format!("header name {name:?}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| Error::Config(format!("header {name}: {e}")))?;
        headers.insert(name, value);
    }
    Ok(headers)
}

/// Builds the session client: fixed headers, optional TLS verification and
/// connect/read timeouts for downloads.
fn build_http_client(config: &Config, headers: HeaderMap) -> Result<reqwest::Client> {
    let timeout = config.sync.download_timeout();
    Ok(reqwest::Client::builder()
        .default_headers(headers)
        .danger_accept_invalid_certs(config.sync.accept_invalid_certs)
        .connect_timeout(timeout)
        .read_timeout(timeout)
        .tcp_keepalive(Duration::from_secs(30))
        .build()?)
}

/// Resolves `endpoint` against `base` the way a browser resolves a link:
/// an absolute endpoint path replaces the base path.
fn endpoint_url(base: &str, endpoint: &str) -> Result<Url> {
    let base = Url::parse(base).map_err(|e| Error::InvalidUrl(format!("{base}: {e}")))?;
    base.join(endpoint)
        .map_err(|e| Error::InvalidUrl(format!("{endpoint}: {e}")))
}

/// Replaces the `password` field of a request body for logging.
fn redacted(body: &Value) -> Value {
    let mut body = body.clone();
    if let Some(password) = body.get_mut("password") {
        *password = Value::String("***".to_string());
    }
    body
}

fn truncated(text: &str) -> &str {
    text.char_indices()
        .nth(LOG_BODY_LIMIT)
        .map_or(text, |(end, _)| &text[..end])
}

fn log_response(response: &reqwest::Response) {
    log::debug!("<- {} {}", response.status(), response.url());
    for (name, value) in response.headers() {
        log::debug!("   {name}: {}", value.to_str().unwrap_or("<binary>"));
    }
}

/// Adapts a response into a chunk stream that ends after the first error.
fn body_stream(response: reqwest::Response) -> ByteStream {
    stream::unfold(Some(response), |state| async move {
        let mut response = state?;
        match response.chunk().await {
            Ok(Some(chunk)) => Some((Ok(chunk), Some(response))),
            Ok(None) => None,
            Err(e) => Some((Err(Error::Http(e)), None)),
        }
    })
    .boxed()
}

impl HttpApi {
    /// Creates the client from the loaded configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if a header or endpoint is invalid or the TLS
    /// backend cannot be initialised.
    pub fn new(config: &Config) -> Result<Self> {
        let headers = header_map(config)?;
        Ok(Self {
            http: build_http_client(config, headers.clone())?,
            headers,
            list_url: endpoint_url(&config.base_url, &config.api.list_endpoint)?,
            get_url: endpoint_url(&config.base_url, &config.api.get_endpoint)?,
            password: config.auth.password.clone(),
            per_page: config.sync.per_page,
            list_timeout: config.sync.list_timeout(),
            retry: config.sync.retry.clone(),
        })
    }

    /// One send, with status-triggered backoff, failing on non-2xx.
    async fn send(
        &self,
        method: &Method,
        url: &Url,
        body: Option<&Value>,
        timeout: Option<Duration>,
    ) -> Result<reqwest::Response> {
        log::debug!("-> {method} {url}");
        if log::log_enabled!(log::Level::Debug) {
            for (name, value) in &self.headers {
                log::debug!("   {name}: {}", value.to_str().unwrap_or("<binary>"));
            }
            if let Some(body) = body {
                log::debug!("   body: {}", redacted(body));
            }
        }

        let response = retry::send_with_backoff(&self.retry, || {
            let mut request = self.http.request(method.clone(), url.clone());
            if let Some(timeout) = timeout {
                request = request.timeout(timeout);
            }
            if let Some(body) = body {
                request = request
                    .header(CONTENT_TYPE, "application/json")
                    .body(body.to_string());
            }
            request
        })
        .await?;

        log_response(&response);

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response)
    }

    /// POSTs `body` to `url` and unwraps the `{code, message, data}` envelope.
    async fn post_json<T: DeserializeOwned>(&self, url: &Url, body: &Value) -> Result<T> {
        let envelope: ApiResponse<T> =
            retry::with_jitter(&self.retry, &format!("POST {url}"), || async {
                let response = self
                    .send(&Method::POST, url, Some(body), Some(self.list_timeout))
                    .await?;
                let is_json = response
                    .headers()
                    .get(CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .is_some_and(|v| v.contains("application/json"));
                let text = response.text().await?;
                log::debug!("   content: {}", truncated(&text));
                if !is_json {
                    log::debug!("   response is not labelled as JSON, parsing anyway");
                }
                Ok(serde_json::from_str(&text)?)
            })
            .await?;
        envelope.into_data()
    }
}

#[async_trait]
impl RemoteApi for HttpApi {
    async fn list_dir(&self, full_path: &str) -> Result<Vec<RemoteEntry>> {
        let body = json!({
            "path": full_path,
            "password": self.password,
            "page": 1,
            "per_page": self.per_page,
            "refresh": false,
        });
        let data: ListData = self.post_json(&self.list_url, &body).await?;
        Ok(data.content.unwrap_or_default())
    }

    async fn resolve_download_url(&self, remote_path: &str) -> Result<String> {
        let body = json!({
            "path": remote_path,
            "password": self.password,
        });
        let data: LinkData = self.post_json(&self.get_url, &body).await?;
        Ok(data.raw_url)
    }

    async fn open_download(&self, url: &str) -> Result<ByteStream> {
        let url = Url::parse(url).map_err(|e| Error::InvalidUrl(format!("{url}: {e}")))?;
        let get = Method::GET;
        let response = retry::with_jitter(&self.retry, &format!("GET {url}"), || {
            self.send(&get, &url, None, None)
        })
        .await?;
        Ok(body_stream(response))
    }
}
