//! Remote file fetching for download-to-folder.
//!
//! The response body is exposed as an [`AsyncRead`] so it can be streamed
//! straight into the file store without buffering it in memory.

use std::io;
use std::net::IpAddr;
use std::pin::Pin;
use std::time::Duration;

use futures::TryStreamExt;
use reqwest::redirect::{Attempt, Policy};
use reqwest::Client;
use tokio::io::AsyncRead;
use tokio_util::io::StreamReader;
use tracing::{debug, warn};
use url::{Host, Url};

use crate::config::DownloadConfig;
use crate::{Result, StoreError};

/// Connect timeout in seconds.
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// User agent string for downloads.
const USER_AGENT: &str = concat!("folderkeep/", env!("CARGO_PKG_VERSION"));

/// A remote file being fetched.
pub struct RemoteFile {
    /// Final URL after redirects.
    pub url: Url,
    /// File name suggested by the URL path, if any.
    pub name_hint: Option<String>,
    /// Declared content type, without parameters.
    pub mime: Option<String>,
    /// Declared content length.
    pub content_length: Option<u64>,
    /// Response body.
    pub body: Pin<Box<dyn AsyncRead + Send>>,
}

impl std::fmt::Debug for RemoteFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteFile")
            .field("url", &self.url.as_str())
            .field("name_hint", &self.name_hint)
            .field("mime", &self.mime)
            .field("content_length", &self.content_length)
            .finish()
    }
}

/// HTTP client for download-to-folder.
#[derive(Debug, Clone)]
pub struct Downloader {
    client: Client,
    allow_private_hosts: bool,
}

impl Downloader {
    /// Create a downloader from configuration.
    pub fn new(config: &DownloadConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(config.timeout_secs))
            .redirect(redirect_policy(config.max_redirects, config.allow_private_hosts))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| StoreError::Download(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            allow_private_hosts: config.allow_private_hosts,
        })
    }

    /// Start fetching `url`.
    ///
    /// Only the headers are read here; the body is consumed through
    /// [`RemoteFile::body`].
    pub async fn fetch(&self, url: &str) -> Result<RemoteFile> {
        let parsed = validate_url(url, self.allow_private_hosts)?;

        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| StoreError::Download(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            warn!(status = %response.status(), "download rejected by remote");
            return Err(StoreError::Download(format!(
                "HTTP error: {}",
                response.status()
            )));
        }

        let url = response.url().clone();
        let mime = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(|v| v.trim().to_ascii_lowercase())
            .filter(|v| !v.is_empty());
        let content_length = response.content_length();
        let name_hint = name_hint(&url);

        debug!(url = %url, ?mime, ?content_length, "download started");

        let stream = response.bytes_stream().map_err(io::Error::other);
        Ok(RemoteFile {
            url,
            name_hint,
            mime,
            content_length,
            body: Box::pin(StreamReader::new(stream)),
        })
    }
}

/// Follow at most `max_redirects` hops, each target passing
/// [`validate_url`].
fn redirect_policy(max_redirects: usize, allow_private_hosts: bool) -> Policy {
    Policy::custom(move |attempt: Attempt| {
        let hops = attempt.previous().len();
        match check_redirect(attempt.url(), hops, max_redirects, allow_private_hosts) {
            Ok(()) => attempt.follow(),
            Err(e) => {
                warn!(url = %attempt.url(), error = %e, "redirect refused");
                attempt.error(e)
            }
        }
    })
}

/// Check one redirect hop. `hops` counts the URLs already visited.
fn check_redirect(
    target: &Url,
    hops: usize,
    max_redirects: usize,
    allow_private_hosts: bool,
) -> Result<()> {
    if hops > max_redirects {
        return Err(StoreError::Download("too many redirects".to_string()));
    }
    validate_url(target.as_str(), allow_private_hosts).map(|_| ())
}

/// Last non-empty path segment of `url`, percent-decoded.
pub fn name_hint(url: &Url) -> Option<String> {
    let segment = url.path_segments()?.rev().find(|s| !s.is_empty())?;
    match urlencoding::decode(segment) {
        Ok(decoded) => Some(decoded.into_owned()),
        Err(_) => Some(segment.to_string()),
    }
}

/// Parse `url` and reject schemes other than http(s) and, unless allowed,
/// hosts on loopback or private networks.
pub fn validate_url(url: &str, allow_private_hosts: bool) -> Result<Url> {
    let parsed = Url::parse(url).map_err(|e| StoreError::Download(format!("invalid URL: {e}")))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(StoreError::Download(format!(
                "unsupported URL scheme: {scheme}"
            )))
        }
    }

    let host = parsed
        .host()
        .ok_or_else(|| StoreError::Download("URL has no host".to_string()))?;

    if allow_private_hosts {
        return Ok(parsed);
    }

    let forbidden = match host {
        Host::Domain(domain) => is_forbidden_hostname(domain),
        Host::Ipv4(ip) => is_private_ip(&IpAddr::V4(ip)),
        Host::Ipv6(ip) => is_private_ip(&IpAddr::V6(ip)),
    };
    if forbidden {
        return Err(StoreError::Download("host not allowed".to_string()));
    }

    Ok(parsed)
}

fn is_forbidden_hostname(host: &str) -> bool {
    let host = host.to_ascii_lowercase();
    host == "localhost"
        || [".local", ".localhost", ".internal", ".lan"]
            .iter()
            .any(|suffix| host.ends_with(suffix))
}

fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(ip) => {
            ip.is_loopback()
                || ip.is_private()
                || ip.is_link_local()
                || ip.is_broadcast()
                || ip.is_unspecified()
        }
        IpAddr::V6(ip) => {
            let first = ip.segments()[0];
            ip.is_loopback()
                || ip.is_unspecified()
                || (first & 0xfe00) == 0xfc00 // unique local
                || (first & 0xffc0) == 0xfe80 // link-local
        }
    }
}
