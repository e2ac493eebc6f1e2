use std::time::Duration;

use adsync_core::error::AppError;
use adsync_core::traits::{AdsApi, RowStream};
use futures::{StreamExt, TryStreamExt, stream};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::auth::{AccessTokenProvider, GoogleAdsCredentials};
use crate::http::{build_client, send_error, status_error};

pub const DEFAULT_BASE_URL: &str = "https://googleads.googleapis.com";
pub const DEFAULT_API_VERSION: &str = "v21";

const SEARCH_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest<'a> {
    query: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    page_token: Option<&'a str>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchPage {
    #[serde(default)]
    results: Vec<Value>,
    #[serde(default)]
    next_page_token: Option<String>,
}

/// REST client for the ads search endpoint.
#[derive(Clone)]
pub struct GoogleAdsClient {
    client: Client,
    tokens: AccessTokenProvider,
    developer_token: String,
    login_customer_id: Option<String>,
    base_url: String,
    api_version: String,
}

impl GoogleAdsClient {
    pub fn new(credentials: &GoogleAdsCredentials) -> Result<Self, AppError> {
        let tokens = AccessTokenProvider::from_credentials(credentials)?;
        Self::with_tokens(credentials, tokens)
    }

    pub fn with_tokens(
        credentials: &GoogleAdsCredentials,
        tokens: AccessTokenProvider,
    ) -> Result<Self, AppError> {
        Ok(Self {
            client: build_client(SEARCH_TIMEOUT)?,
            tokens,
            developer_token: credentials.developer_token.clone(),
            login_customer_id: credentials.login_customer_id.clone(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
        })
    }

    pub fn from_env() -> Result<Self, AppError> {
        Self::new(&GoogleAdsCredentials::from_env()?)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = version.into();
        self
    }

    fn search_url(&self, customer_id: &str) -> String {
        format!(
            "{}/{}/customers/{}/googleAds:search",
            self.base_url, self.api_version, customer_id
        )
    }

    async fn search_page(
        &self,
        customer_id: &str,
        query: &str,
        page_token: Option<&str>,
    ) -> Result<SearchPage, AppError> {
        let token = self.tokens.access_token().await?;

        let mut request = self
            .client
            .post(self.search_url(customer_id))
            .bearer_auth(token)
            .header("developer-token", &self.developer_token)
            .json(&SearchRequest { query, page_token });
        if let Some(login) = &self.login_customer_id {
            request = request.header("login-customer-id", login);
        }

        let response = request
            .send()
            .await
            .map_err(|e| send_error(e, SEARCH_TIMEOUT.as_secs()))?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let page: SearchPage = response
            .json()
            .await
            .map_err(|e| AppError::HttpError(format!("Failed to parse search page: {e}")))?;

        tracing::debug!(
            customer_id,
            rows = page.results.len(),
            has_next = page.next_page_token.is_some(),
            "Search page received"
        );
        Ok(page)
    }
}

impl AdsApi for GoogleAdsClient {
    fn search(&self, customer_id: &str, query: &str) -> RowStream {
        let client = self.clone();
        let customer_id = customer_id.replace('-', "");
        let query = query.to_string();

        // State: `None` once the last page is consumed, otherwise the token
        // of the page to request next (`Some(None)` for the first page).
        stream::try_unfold(Some(None::<String>), move |state| {
            let client = client.clone();
            let customer_id = customer_id.clone();
            let query = query.clone();
            async move {
                let Some(page_token) = state else {
                    return Ok::<_, AppError>(None);
                };
                let page = client
                    .search_page(&customer_id, &query, page_token.as_deref())
                    .await?;
                let next = page
                    .next_page_token
                    .filter(|t| !t.is_empty())
                    .map(Some);
                Ok(Some((page.results, next)))
            }
        })
        .map_ok(|rows| stream::iter(rows.into_iter().map(Ok::<_, AppError>)))
        .try_flatten()
        .boxed()
    }
}
