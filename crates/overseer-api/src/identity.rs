// Identity server client: SCIM users and groups, OAuth clients, and the
// identity zones and providers they belong to.

use std::sync::Arc;

use reqwest::Method;
use serde_json::{Map, Value};
use tracing::debug;

use crate::auth::TokenProvider;
use crate::error::Error;
use crate::rest::RestClient;
use crate::transport::TransportConfig;
use crate::types::ScimPage;

const PAGE_SIZE: u64 = 100;

/// Async client for the identity server's SCIM endpoints.
pub struct IdentityClient {
    rest: RestClient,
}

impl IdentityClient {
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

    pub fn from_reqwest(
        base_url: &str,
        http: reqwest::Client,
        tokens: Option<Arc<TokenProvider>>,
    ) -> Result<Self, Error> {
        Ok(Self {
            rest: RestClient::new(base_url, http, tokens)?,
        })
    }

    pub async fn list_users(&self) -> Result<Vec<Map<String, Value>>, Error> {
        self.paginate_all("Users").await
    }

    pub async fn list_groups(&self) -> Result<Vec<Map<String, Value>>, Error> {
        self.paginate_all("Groups").await
    }

    pub async fn list_clients(&self) -> Result<Vec<Map<String, Value>>, Error> {
        self.paginate_all("oauth/clients").await
    }

    /// Zones are served as a bare array, not a SCIM page.
    pub async fn list_identity_zones(&self) -> Result<Vec<Map<String, Value>>, Error> {
        self.rest.get("identity-zones").await
    }

    /// Providers of the current zone, also a bare array.
    pub async fn list_identity_providers(&self) -> Result<Vec<Map<String, Value>>, Error> {
        self.rest.get("identity-providers").await
    }

    pub async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(String, String)],
        body: Option<&str>,
    ) -> Result<(), Error> {
        self.rest.send(method, path, query, body).await
    }

    // ── Pagination helper ────────────────────────────────────────────

    /// SCIM paging: `startIndex` is 1-based and advances by the number of
    /// resources received.
    async fn paginate_all(&self, path: &str) -> Result<Vec<Map<String, Value>>, Error> {
        let mut all = Vec::new();
        let mut start_index: u64 = 1;

        loop {
            let page: ScimPage = self
                .rest
                .get_with_params(
                    path,
                    &[
                        ("startIndex", start_index.to_string()),
                        ("count", PAGE_SIZE.to_string()),
                    ],
                )
                .await?;

            let received = u64::try_from(page.resources.len()).unwrap_or(u64::MAX);
            all.extend(page.resources);

            if received == 0 || u64::try_from(all.len()).unwrap_or(u64::MAX) >= page.total_results {
                break;
            }
            start_index += received;
        }

        debug!(path, count = all.len(), "listed identity collection");
        Ok(all)
    }
}
