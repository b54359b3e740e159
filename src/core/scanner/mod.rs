// src/core/scanner/mod.rs

//! Probe collaborators.
//!
//! Every probe has the shape `async fn(&ProbeContext) -> Result<Payload, ProbeError>`.
//! The context is built once per run and shared read-only by all of them.

pub mod content_scanner;
pub mod dns_scanner;
pub mod external_scanner;
pub mod fingerprint_scanner;
pub mod headers_scanner;
pub mod ssl_scanner;

use std::collections::BTreeMap;
use std::sync::Arc;

use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::TokioAsyncResolver;
use reqwest::header::HeaderMap;
use reqwest::{redirect, Client, Response, StatusCode};
use tracing::{debug, warn};
use url::Url;

use crate::config::ScanConfig;
use crate::core::error::{ProbeError, ReconError};
use crate::core::fingerprint::Classifier;

/// Immutable state shared by every probe of a run.
pub struct ProbeContext {
    pub url: Url,
    /// Host of `url`, without IPv6 brackets.
    pub host: String,
    pub config: ScanConfig,
    /// Follows up to `config.max_redirects` redirects.
    pub http: Client,
    /// Never follows redirects, for walking a chain by hand.
    pub no_redirect_http: Client,
    pub resolver: TokioAsyncResolver,
    pub classifier: Arc<Classifier>,
}

impl std::fmt::Debug for ProbeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProbeContext")
            .field("url", &self.url.as_str())
            .field("host", &self.host)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// A page fetched with the redirect-following client.
#[derive(Debug)]
pub struct FetchedPage {
    pub final_url: Url,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
    /// The body hit `config.max_body_bytes` and was cut short.
    pub truncated: bool,
}

impl ProbeContext {
    pub fn new(url: &Url, config: &ScanConfig, classifier: Arc<Classifier>) -> Result<Self, ReconError> {
        let host = url
            .host_str()
            .map(|h| h.trim_start_matches('[').trim_end_matches(']'))
            .filter(|h| !h.is_empty())
            .ok_or_else(|| ReconError::InvalidTarget(url.to_string()))?
            .to_string();

        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.probe_timeout)
            .redirect(redirect::Policy::limited(config.max_redirects))
            .build()?;
        let no_redirect_http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.probe_timeout)
            .redirect(redirect::Policy::none())
            .build()?;

        let mut opts = ResolverOpts::default();
        opts.timeout = config.probe_timeout;
        let resolver = TokioAsyncResolver::tokio(ResolverConfig::default(), opts);

        Ok(Self { url: url.clone(), host, config: config.clone(), http, no_redirect_http, resolver, classifier })
    }

    pub fn is_https(&self) -> bool {
        self.url.scheme() == "https"
    }

    /// The host with a leading `www.` removed, where mail and registry records live.
    pub fn root_domain(&self) -> &str {
        self.host.strip_prefix("www.").unwrap_or(&self.host)
    }

    /// Fetches the target URL itself. Any status code counts as a response.
    pub async fn fetch_page(&self) -> Result<FetchedPage, ProbeError> {
        debug!(url = %self.url, "Fetching target page.");
        let response = self.http.get(self.url.clone()).send().await?;
        let final_url = response.url().clone();
        let status = response.status();
        let headers = response.headers().clone();
        let (body, truncated) = self.read_body(response).await?;
        debug!(url = %final_url, status = %status, bytes = body.len(), truncated, "Target page fetched.");
        Ok(FetchedPage { final_url, status, headers, body, truncated })
    }

    /// Fetches a path relative to the target origin.
    ///
    /// `Ok(None)` when the server answers 404 or 410; other error statuses fail the probe.
    pub async fn fetch_text(&self, path: &str) -> Result<Option<(Url, String)>, ProbeError> {
        let url = self.url.join(path).map_err(|e| ProbeError::Parse(format!("{path}: {e}")))?;
        debug!(url = %url, "Fetching resource.");
        let response = self.http.get(url.clone()).send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
            debug!(url = %url, status = %status, "Resource not present.");
            return Ok(None);
        }
        if !status.is_success() {
            return Err(ProbeError::Http(format!("{url} answered {status}")));
        }
        let (text, _) = self.read_body(response).await?;
        Ok(Some((url, text)))
    }

    /// Reads a response body chunk by chunk, stopping at `config.max_body_bytes`.
    ///
    /// The body is decoded as UTF-8; a character split by the cap is dropped.
    pub async fn read_body(&self, mut response: Response) -> Result<(String, bool), ProbeError> {
        let limit = self.config.max_body_bytes;
        let mut bytes: Vec<u8> = Vec::new();
        let mut truncated = false;
        while let Some(chunk) = response.chunk().await? {
            let room = limit - bytes.len();
            if chunk.len() > room {
                bytes.extend_from_slice(&chunk[..room]);
                truncated = true;
                break;
            }
            bytes.extend_from_slice(&chunk);
        }
        if truncated {
            warn!(url = %response.url(), limit, "Response body truncated.");
        }
        Ok((decode_body(bytes), truncated))
    }
}

fn decode_body(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => {
            let utf8 = e.utf8_error();
            let mut bytes = e.into_bytes();
            if utf8.error_len().is_none() {
                bytes.truncate(utf8.valid_up_to());
            }
            String::from_utf8_lossy(&bytes).into_owned()
        }
    }
}

/// Flattens a header map into lowercase names. Repeated headers are joined with `", "`.
pub fn header_pairs(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut pairs: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        pairs
            .entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert(value);
    }
    pairs
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use url::Url;

    /// Answers every request on a loopback port with `200 OK` and `body` as HTML.
    pub async fn serve_http(body: Vec<u8>) -> Url {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let body = Arc::new(body);
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let body = Arc::clone(&body);
                tokio::spawn(async move {
                    let mut request = [0u8; 4096];
                    let _ = socket.read(&mut request).await;
                    let head = format!(
                        "HTTP/1.1 200 OK\r\ncontent-type: text/html\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
                        body.len()
                    );
                    if socket.write_all(head.as_bytes()).await.is_err() {
                        return;
                    }
                    // The client may hang up early once it has read enough.
                    for chunk in body.chunks(64 * 1024) {
                        if socket.write_all(chunk).await.is_err() {
                            return;
                        }
                    }
                });
            }
        });
        Url::parse(&format!("http://{addr}/")).unwrap()
    }
}
