// Authorized JSON REST plumbing shared by the control-plane and identity
// clients: URL joining, bearer-token injection, status mapping, and raw
// request forwarding.

use std::sync::Arc;

use reqwest::Method;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::auth::TokenProvider;
use crate::error::Error;

// ── Error response shapes ────────────────────────────────────────────

/// Union of the control-plane (`description`, `error_code`) and identity
/// (`error_description`, `error`, `message`) error bodies.
#[derive(serde::Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

// ── RestClient ───────────────────────────────────────────────────────

pub(crate) struct RestClient {
    http: reqwest::Client,
    base_url: Url,
    tokens: Option<Arc<TokenProvider>>,
}

impl RestClient {
    pub(crate) fn new(
        base_url: &str,
        http: reqwest::Client,
        tokens: Option<Arc<TokenProvider>>,
    ) -> Result<Self, Error> {
        let mut url = Url::parse(base_url)?;
        let path = url.path().trim_end_matches('/').to_owned();
        url.set_path(&format!("{path}/"));
        Ok(Self {
            http,
            base_url: url,
            tokens,
        })
    }

    pub(crate) fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Join a path onto the base URL. Leading slashes are ignored so that
    /// `/v2/apps` and `v2/apps` resolve identically.
    pub(crate) fn url(&self, path: &str) -> Result<Url, Error> {
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }

    async fn request(&self, method: Method, url: Url) -> Result<reqwest::RequestBuilder, Error> {
        let mut builder = self.http.request(method, url);
        if let Some(tokens) = &self.tokens {
            builder = builder.header(AUTHORIZATION, tokens.authorization().await?);
        }
        Ok(builder)
    }

    // ── HTTP verbs ───────────────────────────────────────────────────

    pub(crate) async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, Error> {
        let url = self.url(path)?;
        debug!("GET {url}");

        let resp = self.request(Method::GET, url).await?.send().await?;
        self.handle_response(resp).await
    }

    pub(crate) async fn get_with_params<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, Error> {
        let url = self.url(path)?;
        debug!("GET {url} params={params:?}");

        let resp = self
            .request(Method::GET, url)
            .await?
            .query(params)
            .send()
            .await?;
        self.handle_response(resp).await
    }

    /// Forward a request verbatim: the body is sent as-is with a JSON
    /// content type and the query pairs are appended unchanged.
    pub(crate) async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(String, String)],
        body: Option<&str>,
    ) -> Result<(), Error> {
        let url = self.url(path)?;
        debug!("{method} {url} query={query:?}");

        let mut builder = self.request(method, url).await?;
        if !query.is_empty() {
            builder = builder.query(query);
        }
        if let Some(raw) = body {
            builder = builder
                .header(CONTENT_TYPE, "application/json")
                .body(raw.to_owned());
        }

        let resp = builder.send().await?;
        self.handle_empty(resp).await
    }

    // ── Response handling ────────────────────────────────────────────

    async fn handle_response<T: DeserializeOwned>(
        &self,
        resp: reqwest::Response,
    ) -> Result<T, Error> {
        let status = resp.status();
        if status.is_success() {
            let body = resp.text().await?;
            serde_json::from_str(&body).map_err(|e| {
                let preview: String = body.chars().take(200).collect();
                Error::Deserialization {
                    message: format!("{e} (body preview: {preview:?})"),
                    body,
                }
            })
        } else {
            Err(self.parse_error(status, resp).await)
        }
    }

    async fn handle_empty(&self, resp: reqwest::Response) -> Result<(), Error> {
        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(self.parse_error(status, resp).await)
        }
    }

    async fn parse_error(&self, status: reqwest::StatusCode, resp: reqwest::Response) -> Error {
        if status == reqwest::StatusCode::UNAUTHORIZED {
            if let Some(tokens) = &self.tokens {
                tokens.invalidate().await;
            }
        }

        let raw = resp.text().await.unwrap_or_default();

        let (message, code) = match serde_json::from_str::<ErrorResponse>(&raw) {
            Ok(err) => (
                err.description
                    .or(err.error_description)
                    .or(err.message)
                    .unwrap_or_else(|| status.to_string()),
                err.error_code.or(err.error),
            ),
            Err(_) if raw.is_empty() => (status.to_string(), None),
            Err(_) => (raw.clone(), None),
        };

        Error::Api {
            status: status.as_u16(),
            message,
            code,
            body: raw,
        }
    }
}
