use std::time::Duration;

use adsync_core::error::AppError;
use adsync_core::traits::ObjectStore;
use reqwest::{Client, StatusCode};
use url::Url;

use crate::auth::AccessTokenProvider;
use crate::http::{build_client, send_error, status_error};

pub const DEFAULT_STORAGE_URL: &str = "https://storage.googleapis.com";

const STORAGE_TIMEOUT: Duration = Duration::from_secs(300);

/// Cloud Storage JSON API adapter.
#[derive(Clone)]
pub struct GcsObjectStore {
    client: Client,
    tokens: AccessTokenProvider,
    project: String,
    base_url: String,
}

impl GcsObjectStore {
    pub fn new(project: impl Into<String>, tokens: AccessTokenProvider) -> Result<Self, AppError> {
        Ok(Self {
            client: build_client(STORAGE_TIMEOUT)?,
            tokens,
            project: project.into(),
            base_url: DEFAULT_STORAGE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn url(&self, path: &str, params: &[(&str, &str)]) -> Result<Url, AppError> {
        let raw = format!("{}{}", self.base_url, path);
        let url = if params.is_empty() {
            Url::parse(&raw)
        } else {
            Url::parse_with_params(&raw, params)
        };
        url.map_err(|e| AppError::ConfigError(format!("Invalid storage URL: {e}")))
    }

    async fn bucket_exists(&self, bucket: &str, token: &str) -> Result<bool, AppError> {
        let url = self.url(&format!("/storage/v1/b/{bucket}"), &[])?;
        let response = self
            .client
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| send_error(e, STORAGE_TIMEOUT.as_secs()))?;

        match response.status() {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(status_error(response).await),
        }
    }
}

impl ObjectStore for GcsObjectStore {
    async fn ensure_bucket(&self, bucket: &str) -> Result<(), AppError> {
        let token = self.tokens.access_token().await?;
        if self.bucket_exists(bucket, &token).await? {
            return Ok(());
        }

        let url = self.url("/storage/v1/b", &[("project", &self.project)])?;
        let response = self
            .client
            .post(url)
            .bearer_auth(&token)
            .json(&serde_json::json!({ "name": bucket }))
            .send()
            .await
            .map_err(|e| send_error(e, STORAGE_TIMEOUT.as_secs()))?;

        match response.status() {
            s if s.is_success() => {
                tracing::info!(bucket, project = %self.project, "Bucket created");
                Ok(())
            }
            // Created concurrently by someone else.
            StatusCode::CONFLICT => Ok(()),
            _ => Err(status_error(response).await),
        }
    }

    async fn write_blob(
        &self,
        bucket: &str,
        path: &str,
        content_type: &str,
        content: Vec<u8>,
    ) -> Result<(), AppError> {
        let token = self.tokens.access_token().await?;
        let url = self.url(
            &format!("/upload/storage/v1/b/{bucket}/o"),
            &[("uploadType", "media"), ("name", path)],
        )?;
        let size = content.len();

        let response = self
            .client
            .post(url)
            .bearer_auth(token)
            .header("Content-Type", content_type)
            .body(content)
            .send()
            .await
            .map_err(|e| AppError::StorageWriteError(format!("gs://{bucket}/{path}: {e}")))?;

        if !response.status().is_success() {
            let cause = status_error(response).await;
            return Err(AppError::StorageWriteError(format!("gs://{bucket}/{path}: {cause}")));
        }

        tracing::debug!(bucket, path, bytes = size, "Blob written");
        Ok(())
    }
}
