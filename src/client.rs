//! HTTP client for the release API
//!
//! [`ApiClient`] owns the connection pool and the settings every request needs.
//! Each attempt, including retried ones, is built from scratch so the `Accept`,
//! `X-GitHub-Api-Version`, `User-Agent` and optional `Authorization` headers are
//! always present.

use crate::config::{ApiConfig, RetryConfig};
use crate::error::{Error, Result};
use crate::retry::send_with_backoff;
use crate::types::RepositoryId;
use reqwest::header::{ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Method, RequestBuilder, Response};
use std::sync::Arc;
use tracing::debug;

/// Header carrying the API version
pub const API_VERSION_HEADER: &str = "X-GitHub-Api-Version";

/// Media type requested from an endpoint
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Accept {
    /// JSON API documents
    Json,
    /// Raw file bytes
    OctetStream,
}

impl Accept {
    /// The header value
    pub fn as_str(self) -> &'static str {
        match self {
            Accept::Json => "application/vnd.github+json",
            Accept::OctetStream => "application/octet-stream",
        }
    }
}

/// Shared, cheaply cloneable client for the release API
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    api: Arc<ApiConfig>,
    retry: Arc<RetryConfig>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.api.base_url)
            .field("authenticated", &self.api.token.is_some())
            .finish()
    }
}

impl ApiClient {
    /// Create a client from the API and retry settings
    ///
    /// # Errors
    /// Returns error if the underlying HTTP client cannot be created
    pub fn new(api: ApiConfig, retry: RetryConfig) -> Result<Self> {
        // Redirects are followed; asset downloads redirect to a storage host
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| Error::config("api", format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            http,
            api: Arc::new(api),
            retry: Arc::new(retry),
        })
    }

    /// API settings this client was built with
    pub fn api(&self) -> &ApiConfig {
        &self.api
    }

    /// Retry settings this client was built with
    pub fn retry(&self) -> &RetryConfig {
        &self.retry
    }

    /// URL of a repository's release listing
    pub fn releases_url(&self, repository: &RepositoryId) -> String {
        format!(
            "{}/repos/{}/{}/releases",
            self.api.base_url.trim_end_matches('/'),
            repository.owner(),
            repository.name()
        )
    }

    /// GET with backoff; `query` is appended to the URL
    pub async fn get(&self, url: &str, accept: Accept, query: &[(String, String)]) -> Result<Response> {
        self.send(Method::GET, url, accept, query).await
    }

    /// HEAD with backoff
    pub async fn head(&self, url: &str, accept: Accept) -> Result<Response> {
        self.send(Method::HEAD, url, accept, &[]).await
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        accept: Accept,
        query: &[(String, String)],
    ) -> Result<Response> {
        send_with_backoff(&self.retry, url, || {
            debug!("{} {}", method, url);
            let mut request = self.request(method.clone(), url, accept);
            if !query.is_empty() {
                request = request.query(query);
            }
            request.send()
        })
        .await
    }

    /// Build a request carrying the required headers
    fn request(&self, method: Method, url: &str, accept: Accept) -> RequestBuilder {
        let mut request = self
            .http
            .request(method, url)
            .header(ACCEPT, accept.as_str())
            .header(API_VERSION_HEADER, &self.api.api_version)
            .header(USER_AGENT, &self.api.user_agent);
        if let Some(token) = &self.api.token {
            request = request.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        request
    }
}
