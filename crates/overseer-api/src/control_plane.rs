// Control-plane v2 REST client.
//
// Listing follows `next_url` until the collection is exhausted. Mutations
// go through `send`, which forwards method, query, and raw body verbatim.

use std::sync::Arc;

use reqwest::Method;
use serde_json::{Map, Value};
use tracing::debug;
use url::Url;

use crate::auth::TokenProvider;
use crate::error::Error;
use crate::rest::RestClient;
use crate::transport::TransportConfig;
use crate::types::{CcPage, CcResource};

const RESULTS_PER_PAGE: u32 = 100;

/// Async client for the control-plane v2 API.
pub struct ControlPlaneClient {
    rest: RestClient,
}

impl ControlPlaneClient {
    // ── Constructors ─────────────────────────────────────────────────

    /// Build from a transport config and a shared token provider.
    pub fn new(
        base_url: &str,
        tokens: Arc<TokenProvider>,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self {
            rest: RestClient::new(base_url, http, Some(tokens))?,
        })
    }

    /// Wrap an existing `reqwest::Client`. Without a token provider no
    /// `Authorization` header is sent.
    pub fn from_reqwest(
        base_url: &str,
        http: reqwest::Client,
        tokens: Option<Arc<TokenProvider>>,
    ) -> Result<Self, Error> {
        Ok(Self {
            rest: RestClient::new(base_url, http, tokens)?,
        })
    }

    pub fn base_url(&self) -> &Url {
        self.rest.base_url()
    }

    // ── Listing ──────────────────────────────────────────────────────

    /// Collect every resource of a v2 collection, e.g. `v2/apps`.
    pub async fn list_all(&self, collection: &str) -> Result<Vec<CcResource>, Error> {
        let mut all = Vec::new();
        let mut page: CcPage = self
            .rest
            .get_with_params(
                collection,
                &[("results-per-page", RESULTS_PER_PAGE.to_string())],
            )
            .await?;

        loop {
            all.extend(page.resources);
            let Some(next) = page.next_url.filter(|n| !n.is_empty()) else {
                break;
            };
            debug!(collection, next = %next, "following next_url");
            page = self.rest.get(&next).await?;
        }

        debug!(collection, count = all.len(), "listed control-plane collection");
        Ok(all)
    }

    /// Feature flags are served as a bare array rather than a paged
    /// collection.
    pub async fn list_feature_flags(&self) -> Result<Vec<Map<String, Value>>, Error> {
        self.rest.get("v2/config/feature_flags").await
    }

    // ── Mutations ────────────────────────────────────────────────────

    pub async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(String, String)],
        body: Option<&str>,
    ) -> Result<(), Error> {
        self.rest.send(method, path, query, body).await
    }
}
