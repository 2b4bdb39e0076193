use std::path::PathBuf;
use std::time::Duration;

use asset_sync::SourceError;
use reqwest::header::{AUTHORIZATION, USER_AGENT};
use url::Url;

/// Timeout applied to every outbound request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Extra certificate trusted in addition to the system roots, when present.
pub const DEFAULT_ADDITIONAL_CA: &str = "/usr/local/share/ca-certificates/ca.crt";

/// Configuration for the shared HTTP transport.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent_comment: Option<String>,
    /// PEM file appended to the trust store. Ignored when the file does not exist.
    pub additional_ca: Option<PathBuf>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            user_agent_comment: None,
            additional_ca: Some(PathBuf::from(DEFAULT_ADDITIONAL_CA)),
        }
    }
}

/// HTTP transport shared by every source and importer worker.
///
/// Cloning is cheap; clones share one connection pool.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    user_agent: String,
}

impl HttpClient {
    pub fn new(config: &HttpClientConfig) -> Result<Self, SourceError> {
        let mut builder = reqwest::Client::builder().timeout(config.timeout);

        if let Some(path) = &config.additional_ca
            && path.exists()
        {
            let pem = std::fs::read(path).map_err(|e| {
                SourceError::Config(format!("failed to read {}: {e}", path.display()))
            })?;
            let certs = reqwest::Certificate::from_pem_bundle(&pem).map_err(|e| {
                SourceError::Config(format!("failed to parse {}: {e}", path.display()))
            })?;
            if certs.is_empty() {
                return Err(SourceError::Config(format!(
                    "no certificates found in {}",
                    path.display()
                )));
            }
            for cert in certs {
                builder = builder.add_root_certificate(cert);
            }
        }

        let client = builder
            .build()
            .map_err(|e| SourceError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            user_agent: user_agent(config.user_agent_comment.as_deref()),
        })
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Issue a GET, failing on connection errors and non-success statuses.
    pub async fn get(
        &self,
        url: &str,
        auth_header: Option<&str>,
    ) -> Result<reqwest::Response, SourceError> {
        let mut req = self.client.get(url).header(USER_AGENT, &self.user_agent);

        if let Some(auth) = auth_header {
            req = req.header(AUTHORIZATION, auth);
        }

        let response = req
            .send()
            .await
            .map_err(|e| SourceError::Network(format!("GET {url} failed: {e}")))?;

        if !response.status().is_success() {
            return Err(SourceError::Network(format!(
                "GET {url} returned HTTP {}",
                response.status()
            )));
        }

        Ok(response)
    }

    /// GET `url` and read the whole body.
    pub async fn get_bytes(
        &self,
        url: &str,
        auth_header: Option<&str>,
    ) -> Result<Vec<u8>, SourceError> {
        let response = self.get(url, auth_header).await?;
        let body = response
            .bytes()
            .await
            .map_err(|e| SourceError::Network(format!("failed to read body of {url}: {e}")))?;
        Ok(body.to_vec())
    }
}

/// `asset-syncer/<version>`, with the optional comment in parentheses.
pub fn user_agent(comment: Option<&str>) -> String {
    let base = format!("asset-syncer/{}", env!("CARGO_PKG_VERSION"));
    match comment.filter(|c| !c.is_empty()) {
        Some(comment) => format!("{base} ({comment})"),
        None => base,
    }
}

/// Parse a repository URL, which must be absolute.
pub fn parse_repo_url(raw: &str) -> Result<Url, SourceError> {
    let trimmed = raw.trim();
    let url = Url::parse(trimmed)
        .map_err(|e| SourceError::Config(format!("invalid repository URL {trimmed:?}: {e}")))?;

    if url.cannot_be_a_base() {
        return Err(SourceError::Config(format!(
            "invalid repository URL {trimmed:?}: not a hierarchical URL"
        )));
    }

    Ok(url)
}

/// Join `segments` onto the path of `base`, normalizing slashes and dot
/// segments. The query and fragment of `base` are kept.
pub(crate) fn join_path(base: &Url, segments: &[&str]) -> Url {
    let mut parts: Vec<&str> = Vec::new();

    for piece in std::iter::once(base.path())
        .chain(segments.iter().copied())
        .flat_map(|s| s.split('/'))
    {
        match piece {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }

    let mut joined = base.clone();
    joined.set_path(&format!("/{}", parts.join("/")));
    joined
}
