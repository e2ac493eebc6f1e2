use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use adsync_core::error::AppError;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::http::{build_client, send_error};

pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

const TOKEN_TIMEOUT: Duration = Duration::from_secs(30);
/// Tokens this close to expiry are refreshed before use.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Credential bundle for the ads platform.
#[derive(Clone)]
pub struct GoogleAdsCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    pub developer_token: String,
    /// Manager account the calls are made through, digits only.
    pub login_customer_id: Option<String>,
}

impl fmt::Debug for GoogleAdsCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GoogleAdsCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"***")
            .field("refresh_token", &"***")
            .field("developer_token", &"***")
            .field("login_customer_id", &self.login_customer_id)
            .finish()
    }
}

impl GoogleAdsCredentials {
    /// Read credentials from environment variables.
    ///
    /// - `GOOGLE_ADS_CLIENT_ID`, `GOOGLE_ADS_CLIENT_SECRET`,
    ///   `GOOGLE_ADS_REFRESH_TOKEN`, `GOOGLE_ADS_DEVELOPER_TOKEN` (required)
    /// - `GOOGLE_ADS_LOGIN_CUSTOMER_ID` (optional)
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| AppError::ConfigError(format!("{key} not set")))
        };

        Ok(Self {
            client_id: required("GOOGLE_ADS_CLIENT_ID")?,
            client_secret: required("GOOGLE_ADS_CLIENT_SECRET")?,
            refresh_token: required("GOOGLE_ADS_REFRESH_TOKEN")?,
            developer_token: required("GOOGLE_ADS_DEVELOPER_TOKEN")?,
            login_customer_id: lookup("GOOGLE_ADS_LOGIN_CUSTOMER_ID")
                .map(|id| id.replace('-', ""))
                .filter(|id| !id.is_empty()),
        })
    }
}

/// Where access tokens come from.
#[derive(Clone)]
enum TokenSource {
    /// OAuth2 refresh-token grant.
    RefreshToken {
        client_id: String,
        client_secret: String,
        refresh_token: String,
        token_url: String,
    },
    /// The metadata server of the VM or container the process runs on.
    Metadata { url: String },
    Static(String),
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

struct CachedToken {
    token: String,
    expires_at: Instant,
}

/// Hands out bearer tokens, caching them until shortly before expiry.
#[derive(Clone)]
pub struct AccessTokenProvider {
    client: Client,
    source: TokenSource,
    cache: Arc<Mutex<Option<CachedToken>>>,
}

impl AccessTokenProvider {
    fn with_source(source: TokenSource) -> Result<Self, AppError> {
        Ok(Self {
            client: build_client(TOKEN_TIMEOUT)?,
            source,
            cache: Arc::new(Mutex::new(None)),
        })
    }

    pub fn from_credentials(credentials: &GoogleAdsCredentials) -> Result<Self, AppError> {
        Self::with_source(TokenSource::RefreshToken {
            client_id: credentials.client_id.clone(),
            client_secret: credentials.client_secret.clone(),
            refresh_token: credentials.refresh_token.clone(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
        })
    }

    pub fn metadata() -> Result<Self, AppError> {
        Self::with_source(TokenSource::Metadata {
            url: METADATA_TOKEN_URL.to_string(),
        })
    }

    pub fn static_token(token: impl Into<String>) -> Result<Self, AppError> {
        Self::with_source(TokenSource::Static(token.into()))
    }

    /// Token source for Cloud Storage and BigQuery: `GCP_ACCESS_TOKEN` if
    /// set, otherwise the metadata server.
    pub fn cloud_from_env() -> Result<Self, AppError> {
        match std::env::var("GCP_ACCESS_TOKEN") {
            Ok(token) if !token.is_empty() => Self::static_token(token),
            _ => Self::metadata(),
        }
    }

    /// Override the token endpoint (refresh-token and metadata sources).
    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        match &mut self.source {
            TokenSource::RefreshToken { token_url, .. } => *token_url = url.into(),
            TokenSource::Metadata { url: current } => *current = url.into(),
            TokenSource::Static(_) => {}
        }
        self
    }

    /// A valid access token, fetched or refreshed as needed.
    pub async fn access_token(&self) -> Result<String, AppError> {
        if let TokenSource::Static(token) = &self.source {
            return Ok(token.clone());
        }

        let mut cache = self.cache.lock().await;
        if let Some(cached) = cache.as_ref()
            && cached.expires_at > Instant::now() + EXPIRY_MARGIN
        {
            return Ok(cached.token.clone());
        }

        let fresh = self.request_token().await?;
        tracing::debug!(expires_in = fresh.expires_in, "Access token refreshed");
        let token = fresh.access_token.clone();
        *cache = Some(CachedToken {
            token: fresh.access_token,
            expires_at: Instant::now() + Duration::from_secs(fresh.expires_in),
        });
        Ok(token)
    }

    async fn request_token(&self) -> Result<TokenResponse, AppError> {
        let request = match &self.source {
            TokenSource::RefreshToken {
                client_id,
                client_secret,
                refresh_token,
                token_url,
            } => {
                let body = url::form_urlencoded::Serializer::new(String::new())
                    .append_pair("grant_type", "refresh_token")
                    .append_pair("client_id", client_id)
                    .append_pair("client_secret", client_secret)
                    .append_pair("refresh_token", refresh_token)
                    .finish();
                self.client
                    .post(token_url)
                    .header("Content-Type", "application/x-www-form-urlencoded")
                    .body(body)
            }
            TokenSource::Metadata { url } => {
                self.client.get(url).header("Metadata-Flavor", "Google")
            }
            TokenSource::Static(token) => {
                return Ok(TokenResponse {
                    access_token: token.clone(),
                    expires_in: default_expires_in(),
                });
            }
        };

        let response = request
            .send()
            .await
            .map_err(|e| send_error(e, TOKEN_TIMEOUT.as_secs()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::AuthError(format!(
                "token request failed with HTTP {}: {}",
                status.as_u16(),
                body
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::AuthError(format!("Failed to parse token response: {e}")))
    }
}
