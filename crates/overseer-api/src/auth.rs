// OAuth client-credentials token provider.
//
// The control-plane and identity clients both authenticate with a bearer
// token minted by the identity server. One provider is shared between
// them and caches the token until shortly before it expires.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;
use url::Url;

use crate::error::Error;

/// Tokens are refreshed this long before their advertised expiry.
const EXPIRY_MARGIN: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
}

struct CachedToken {
    header: String,
    expires_at: Instant,
}

/// Client-credentials grant against `{identity}/oauth/token`.
pub struct TokenProvider {
    http: reqwest::Client,
    token_url: Url,
    client_id: String,
    client_secret: SecretString,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenProvider {
    pub fn new(
        identity_url: &Url,
        client_id: String,
        client_secret: SecretString,
        http: reqwest::Client,
    ) -> Result<Self, Error> {
        let token_url = identity_url.join("oauth/token")?;
        Ok(Self {
            http,
            token_url,
            client_id,
            client_secret,
            cached: Mutex::new(None),
        })
    }

    /// Return an `Authorization` header value, minting a new token if the
    /// cached one is missing or about to expire.
    pub async fn authorization(&self) -> Result<String, Error> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.expires_at {
                return Ok(token.header.clone());
            }
        }

        debug!(url = %self.token_url, "requesting client-credentials token");
        let resp = self
            .http
            .post(self.token_url.clone())
            .basic_auth(&self.client_id, Some(self.client_secret.expose_secret()))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(Error::Authentication {
                message: format!("token grant rejected (HTTP {}): {body}", status.as_u16()),
            });
        }

        let parsed: TokenResponse =
            serde_json::from_str(&body).map_err(|e| Error::Deserialization {
                message: e.to_string(),
                body: body.clone(),
            })?;

        let lifetime = Duration::from_secs(parsed.expires_in.unwrap_or(0))
            .saturating_sub(EXPIRY_MARGIN);
        let header = format!(
            "{} {}",
            parsed.token_type.as_deref().unwrap_or("bearer"),
            parsed.access_token
        );

        *cached = Some(CachedToken {
            header: header.clone(),
            expires_at: Instant::now() + lifetime,
        });
        Ok(header)
    }

    /// Drop the cached token so the next call re-authenticates.
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }
}
