use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

use crate::auth::TokenStore;
use crate::error::HttpException;

/// API version prefix applied to relative paths
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ApiVersion {
    #[default]
    V1,
    V2,
}

impl ApiVersion {
    pub fn prefix(&self) -> &'static str {
        match self {
            ApiVersion::V1 => "/v1",
            ApiVersion::V2 => "/v2",
        }
    }
}

/// Which credential, if any, rides along as the bearer token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Credential {
    /// Last persisted access token
    #[default]
    Access,
    /// No Authorization header
    None,
}

/// Per-call options
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestOptions {
    pub version: ApiVersion,
    pub credential: Credential,
}

impl RequestOptions {
    pub fn v2() -> Self {
        Self {
            version: ApiVersion::V2,
            ..Self::default()
        }
    }

    pub fn anonymous() -> Self {
        Self {
            credential: Credential::None,
            ..Self::default()
        }
    }
}

/// HTTP client for the identity API
///
/// Owns the single base origin for the process. Every failure leaving this type is an
/// `HttpException`; nothing is retried here.
pub struct PortalHttpClient {
    /// Shared HTTP client with connection pooling
    client: Client,

    /// Validated origin, no trailing slash and no path
    base_url: String,

    /// Source of the bearer token
    token_store: Arc<TokenStore>,
}

impl PortalHttpClient {
    /// Create a new HTTP client against `base_url`
    pub fn new(base_url: &str, token_store: Arc<TokenStore>) -> Result<Self> {
        let base_url = normalize_base_url(base_url)?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .default_headers(headers)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url,
            token_store,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for `path` under the version prefix
    ///
    /// Paths that are already absolute URLs pass through untouched.
    pub fn url_for(&self, path: &str, version: ApiVersion) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }

        if path.starts_with('/') {
            format!("{}{}{}", self.base_url, version.prefix(), path)
        } else {
            format!("{}{}/{}", self.base_url, version.prefix(), path)
        }
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> Result<T, HttpException> {
        let request = self.request(Method::GET, path, options);
        let response = self.execute(request).await?;
        decode(response).await
    }

    pub async fn post<B, T>(
        &self,
        path: &str,
        body: Option<&B>,
        options: RequestOptions,
    ) -> Result<T, HttpException>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let mut request = self.request(Method::POST, path, options);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = self.execute(request).await?;
        decode(response).await
    }

    /// POST whose success response carries nothing of interest (e.g. 204)
    pub async fn post_no_content<B>(
        &self,
        path: &str,
        body: Option<&B>,
        options: RequestOptions,
    ) -> Result<(), HttpException>
    where
        B: Serialize + ?Sized,
    {
        let mut request = self.request(Method::POST, path, options);
        if let Some(body) = body {
            request = request.json(body);
        }
        self.execute(request).await.map(|_| ())
    }

    fn request(&self, method: Method, path: &str, options: RequestOptions) -> RequestBuilder {
        let url = self.url_for(path, options.version);
        let mut request = self.client.request(method, url);

        if options.credential == Credential::Access {
            if let Some(tokens) = self.token_store.load() {
                request = request.header(AUTHORIZATION, format!("Bearer {}", tokens.access_token));
            }
        }

        request
    }

    /// Send the request, mapping every failure into the taxonomy
    async fn execute(&self, request: RequestBuilder) -> Result<reqwest::Response, HttpException> {
        let request = request.build().map_err(|e| {
            tracing::error!(error = %e, "Failed to build HTTP request");
            HttpException::from_transport(&e)
        })?;

        let method = request.method().clone();
        let url = request.url().clone();
        tracing::debug!(method = %method, url = %url, "Sending HTTP request");

        let response = match self.client.execute(request).await {
            Ok(response) => response,
            Err(e) => {
                // Categorize the error for better debugging
                let error_kind = if e.is_timeout() {
                    "timeout"
                } else if e.is_connect() {
                    "connection_failed"
                } else if e.is_request() {
                    "request_error"
                } else {
                    "unknown"
                };

                tracing::warn!(
                    error_kind = error_kind,
                    error = %e,
                    url = %url,
                    "HTTP request error"
                );
                return Err(HttpException::from_transport(&e));
            }
        };

        let status = response.status();
        tracing::debug!(status = %status, "Received HTTP response");

        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let exception = HttpException::from_response(status.as_u16(), &body);

        tracing::warn!(
            status = status.as_u16(),
            url = %url,
            message = %exception,
            "HTTP request failed with error response"
        );

        Err(exception)
    }
}

/// Decode a successful JSON body
async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, HttpException> {
    let body = response.text().await.map_err(|e| HttpException::from_transport(&e))?;

    serde_json::from_str(&body).map_err(|e| {
        tracing::warn!(error = %e, "Failed to parse response body");
        HttpException::unclassified(&format!("Failed to parse response: {}", e))
    })
}

/// Validate and normalize the configured backend origin
///
/// Trims whitespace and trailing slashes. The result must be an absolute http(s) URL with no
/// path, query or fragment.
pub fn normalize_base_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        anyhow::bail!("Backend URL is missing. Set it to an origin such as https://api.kleff.io");
    }

    let url = Url::parse(trimmed)
        .with_context(|| format!("Backend URL is not a valid absolute URL: \"{}\"", raw))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        anyhow::bail!("Backend URL must use http or https: \"{}\"", raw);
    }

    if url.cannot_be_a_base() || url.host_str().is_none() {
        anyhow::bail!("Backend URL is not a valid absolute URL: \"{}\"", raw);
    }

    if !matches!(url.path(), "" | "/") || url.query().is_some() || url.fragment().is_some() {
        anyhow::bail!(
            "Backend URL must be an origin only (e.g. https://api.kleff.io), not \"{}\"",
            trimmed
        );
    }

    Ok(trimmed.to_string())
}
