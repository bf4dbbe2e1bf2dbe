//! Authenticated resource download
//!
//! Fetches opaque resources (snapshot images, backup bundles) referenced by
//! URL. Devices demand either HTTP Basic or Digest; the client tries Basic
//! first and falls back to Digest exactly once on a 401. When both are
//! rejected the Basic failure is reported, since a device without digest
//! support would otherwise mask the real cause.

use crate::auth::digest::{DigestChallenge, DigestState};
use crate::error::{OnvifError, Result};
use reqwest::{header, Response, StatusCode};
use std::time::Duration;
use tracing::debug;
use url::Url;

const BODY_PREVIEW_LIMIT: usize = 200;

/// Device credentials for snapshot and backup downloads
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new<S: Into<String>>(username: S, password: S) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// Downloader configuration
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// User agent presented to the device
    pub user_agent: String,
    /// Per-request timeout, applied to the Basic and Digest attempts
    /// independently
    pub timeout: Duration,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            user_agent: concat!("onvif-client-rust/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// HTTP downloader negotiating Basic and Digest authentication.
///
/// One instance owns one digest nonce counter and may be shared across
/// sequential or concurrent downloads.
pub struct AuthenticatedDownloader {
    client: reqwest::Client,
    credentials: Option<Credentials>,
    digest: Option<DigestState>,
    user_agent: String,
}

impl AuthenticatedDownloader {
    /// Create a downloader with default configuration
    pub fn new(credentials: Option<Credentials>) -> Result<Self> {
        Self::with_config(credentials, DownloadConfig::default())
    }

    /// Create a downloader with explicit configuration
    pub fn with_config(credentials: Option<Credentials>, config: DownloadConfig) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        let digest = credentials
            .as_ref()
            .map(|c| DigestState::new(c.username.clone(), c.password.clone()));
        Ok(Self {
            client,
            credentials,
            digest,
            user_agent: config.user_agent,
        })
    }

    /// Fetch the resource at `url`, returning its bytes unmodified.
    ///
    /// Basic first; one Digest retry on 401; every other status is an
    /// immediate error carrying the status, a truncated body preview, and
    /// remediation guidance.
    pub async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let mut request = self.request(url);
        if let Some(creds) = &self.credentials {
            request = request.basic_auth(&creds.username, Some(&creds.password));
        }
        let response = request.send().await?;

        if response.status().is_success() {
            return Ok(response.bytes().await?.to_vec());
        }

        let status = response.status();
        let preview = body_preview(response).await;
        let basic_err = status_error(status, &preview, url);

        if status != StatusCode::UNAUTHORIZED {
            return Err(basic_err);
        }
        let Some(digest) = &self.digest else {
            return Err(basic_err);
        };

        debug!(%url, "basic auth rejected, retrying with digest");

        // Unauthenticated GET to capture the WWW-Authenticate challenge. A
        // device that does not answer with a parseable Digest challenge
        // leaves the basic failure as the authoritative cause.
        let probe = self.request(url).send().await?;
        let challenge = match probe
            .headers()
            .get(header::WWW_AUTHENTICATE)
            .and_then(|v| v.to_str().ok())
            .map(DigestChallenge::parse)
        {
            Some(Ok(challenge)) => challenge,
            _ => return Err(basic_err),
        };

        let authorization = digest.authorization(&challenge, "GET", &request_uri(url)?);
        let retry = self
            .request(url)
            .header(header::AUTHORIZATION, authorization)
            .send()
            .await?;

        let retry_status = retry.status();
        if retry_status.is_success() {
            return Ok(retry.bytes().await?.to_vec());
        }
        if retry_status == StatusCode::UNAUTHORIZED {
            debug!(%url, "digest retry also rejected, reporting the basic auth failure");
            return Err(basic_err);
        }
        let retry_preview = body_preview(retry).await;
        Err(status_error(retry_status, &retry_preview, url))
    }

    /// Base GET request: identifying user agent, no connection reuse
    fn request(&self, url: &str) -> reqwest::RequestBuilder {
        self.client
            .get(url)
            .header(header::USER_AGENT, &self.user_agent)
            .header(header::CONNECTION, "close")
    }
}

/// Digest `uri` parameter: path plus query of the request URL
fn request_uri(url: &str) -> Result<String> {
    let parsed = Url::parse(url)
        .map_err(|e| OnvifError::invalid_input(format!("invalid download URL {url:?}: {e}")))?;
    let mut uri = parsed.path().to_string();
    if let Some(query) = parsed.query() {
        uri.push('?');
        uri.push_str(query);
    }
    Ok(uri)
}

/// Read at most [`BODY_PREVIEW_LIMIT`] bytes of the response body for error
/// reporting
async fn body_preview(response: Response) -> String {
    match response.bytes().await {
        Ok(bytes) => {
            let cut = bytes.len().min(BODY_PREVIEW_LIMIT);
            String::from_utf8_lossy(&bytes[..cut]).into_owned()
        }
        Err(_) => String::new(),
    }
}

/// Map a non-success status to an error with status, body preview, and
/// status-specific guidance
fn status_error(status: StatusCode, preview: &str, url: &str) -> OnvifError {
    match status {
        StatusCode::UNAUTHORIZED => OnvifError::authentication(format!(
            "HTTP 401 from {url}: {preview} (check the device username and password)"
        )),
        StatusCode::FORBIDDEN => OnvifError::authentication(format!(
            "HTTP 403 from {url}: {preview} (credentials accepted but not permitted for this resource)"
        )),
        StatusCode::NOT_FOUND => OnvifError::not_found(format!(
            "HTTP 404 from {url}: {preview} (verify the snapshot or backup URI is still current)"
        )),
        _ => OnvifError::upstream(format!("HTTP {status} from {url}: {preview}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_uri_strips_origin() {
        assert_eq!(
            request_uri("http://192.168.1.20/onvif/snapshot?profile=1").unwrap(),
            "/onvif/snapshot?profile=1"
        );
        assert_eq!(request_uri("http://cam.local/media.jpg").unwrap(), "/media.jpg");
        assert!(request_uri("not a url").is_err());
    }

    #[test]
    fn test_status_error_guidance() {
        let err = status_error(StatusCode::UNAUTHORIZED, "denied", "http://cam/x");
        assert!(err.is_auth_error());
        assert!(err.to_string().contains("401"));
        assert!(err.to_string().contains("denied"));

        let err = status_error(StatusCode::NOT_FOUND, "", "http://cam/x");
        assert!(matches!(err, OnvifError::NotFound(_)));

        let err = status_error(StatusCode::INTERNAL_SERVER_ERROR, "boom", "http://cam/x");
        assert!(matches!(err, OnvifError::Upstream(_)));
        assert!(err.to_string().contains("500"));
    }
}
