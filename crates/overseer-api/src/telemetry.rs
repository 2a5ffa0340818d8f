// Telemetry bus client.
//
// Components announce themselves to a registry; each announced component
// serves a `/varz` document with its live operational fields. Discovery
// lists the registry, then scrapes every component concurrently. A failed
// scrape is reported per component rather than failing the whole sweep.

use futures_util::future::join_all;
use serde_json::{Map, Value};
use tracing::{debug, warn};
use url::Url;

use crate::error::Error;
use crate::transport::TransportConfig;
use crate::types::{ComponentRegistration, ComponentStatus};

/// Async client for the component registry and per-component varz.
pub struct TelemetryClient {
    http: reqwest::Client,
    registry_url: Url,
}

impl TelemetryClient {
    pub fn new(registry_url: &str, transport: &TransportConfig) -> Result<Self, Error> {
        Self::from_reqwest(registry_url, transport.build_client()?)
    }

    pub fn from_reqwest(registry_url: &str, http: reqwest::Client) -> Result<Self, Error> {
        Ok(Self {
            http,
            registry_url: Url::parse(registry_url)?,
        })
    }

    /// List every component currently announced on the registry.
    pub async fn list_components(&self) -> Result<Vec<ComponentRegistration>, Error> {
        let url = self.registry_url.join("components")?;
        debug!("GET {url}");

        let resp = self.http.get(url).send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(Error::Api {
                status: status.as_u16(),
                message: status.to_string(),
                code: None,
                body,
            });
        }

        serde_json::from_str(&body).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body,
        })
    }

    /// Fetch the varz document of a single component.
    pub async fn scrape(&self, component: &ComponentRegistration) -> Result<Map<String, Value>, Error> {
        let uri = component.varz_uri();
        debug!("GET {uri}");

        let mut request = self.http.get(&uri);
        if let Some([user, pass]) = component.credentials.as_deref() {
            request = request.basic_auth(user, Some(pass));
        }

        let resp = request.send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(Error::Api {
                status: status.as_u16(),
                message: format!("varz scrape of {uri} failed"),
                code: None,
                body,
            });
        }

        serde_json::from_str(&body).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body,
        })
    }

    /// List the registry and scrape every component in parallel.
    ///
    /// Only a registry failure is an error; scrape failures are carried in
    /// [`ComponentStatus::varz`].
    pub async fn discover(&self) -> Result<Vec<ComponentStatus>, Error> {
        let components = self.list_components().await?;

        let scrapes = components.iter().map(|c| self.scrape(c));
        let results = join_all(scrapes).await;

        Ok(components
            .into_iter()
            .zip(results)
            .map(|(registration, result)| {
                let uri = registration.varz_uri();
                let varz = result.map_err(|e| {
                    warn!(uri = %uri, error = %e, "varz scrape failed");
                    e.to_string()
                });
                ComponentStatus {
                    registration,
                    uri,
                    varz,
                }
            })
            .collect())
    }
}
