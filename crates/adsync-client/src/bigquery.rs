use std::time::Duration;

use adsync_core::error::AppError;
use adsync_core::schema::{FieldSpec, bigquery_schema};
use adsync_core::traits::Warehouse;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use url::Url;

use crate::auth::AccessTokenProvider;
use crate::http::{build_client, send_error, status_error};

pub const DEFAULT_BIGQUERY_URL: &str = "https://bigquery.googleapis.com";

const BIGQUERY_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Job {
    job_reference: JobReference,
    #[serde(default)]
    status: JobStatus,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    job_id: String,
    #[serde(default)]
    location: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobStatus {
    #[serde(default)]
    state: String,
    #[serde(default)]
    error_result: Option<JobError>,
}

#[derive(Debug, Deserialize)]
struct JobError {
    #[serde(default)]
    reason: Option<String>,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableInfo {
    /// Serialized as a decimal string by the API.
    #[serde(default)]
    num_rows: Option<String>,
}

/// BigQuery REST adapter: table deletion and NDJSON load jobs.
#[derive(Clone)]
pub struct BigQueryWarehouse {
    client: Client,
    tokens: AccessTokenProvider,
    project: String,
    base_url: String,
    poll_interval: Duration,
}

impl BigQueryWarehouse {
    pub fn new(project: impl Into<String>, tokens: AccessTokenProvider) -> Result<Self, AppError> {
        Ok(Self {
            client: build_client(BIGQUERY_TIMEOUT)?,
            tokens,
            project: project.into(),
            base_url: DEFAULT_BIGQUERY_URL.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn project_url(&self, path: &str) -> String {
        format!("{}/bigquery/v2/projects/{}{}", self.base_url, self.project, path)
    }

    async fn insert_load_job(
        &self,
        token: &str,
        dataset: &str,
        table: &str,
        schema: &[FieldSpec],
        uri: &str,
    ) -> Result<Job, AppError> {
        let body = serde_json::json!({
            "configuration": {
                "load": {
                    "sourceUris": [uri],
                    "sourceFormat": "NEWLINE_DELIMITED_JSON",
                    "destinationTable": {
                        "projectId": self.project,
                        "datasetId": dataset,
                        "tableId": table,
                    },
                    "schema": bigquery_schema(schema),
                    "createDisposition": "CREATE_IF_NEEDED",
                    "writeDisposition": "WRITE_APPEND",
                }
            }
        });

        let response = self
            .client
            .post(self.project_url("/jobs"))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| send_error(e, BIGQUERY_TIMEOUT.as_secs()))?;

        if !response.status().is_success() {
            let cause = status_error(response).await;
            return Err(AppError::LoadJobError(format!("{table}: {cause}")));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::LoadJobError(format!("Failed to parse job: {e}")))
    }

    /// Poll until the job is DONE. Long loads can outlive an access token,
    /// so every poll asks the provider for a current one.
    async fn wait_for_job(&self, mut job: Job) -> Result<(), AppError> {
        while job.status.state != "DONE" {
            tokio::time::sleep(self.poll_interval).await;
            let token = self.tokens.access_token().await?;

            let raw = self.project_url(&format!("/jobs/{}", job.job_reference.job_id));
            let url = match &job.job_reference.location {
                Some(location) => Url::parse_with_params(&raw, &[("location", location)]),
                None => Url::parse(&raw),
            }
            .map_err(|e| AppError::ConfigError(format!("Invalid BigQuery URL: {e}")))?;

            let response = self
                .client
                .get(url)
                .bearer_auth(&token)
                .send()
                .await
                .map_err(|e| send_error(e, BIGQUERY_TIMEOUT.as_secs()))?;
            if !response.status().is_success() {
                return Err(status_error(response).await);
            }
            job = response
                .json()
                .await
                .map_err(|e| AppError::LoadJobError(format!("Failed to parse job: {e}")))?;
            tracing::debug!(job_id = %job.job_reference.job_id, state = %job.status.state, "Load job polled");
        }

        match job.status.error_result {
            Some(err) => Err(AppError::LoadJobError(format!(
                "job {} failed ({}): {}",
                job.job_reference.job_id,
                err.reason.as_deref().unwrap_or("unknown"),
                err.message
            ))),
            None => Ok(()),
        }
    }

    async fn table_rows(&self, dataset: &str, table: &str) -> Result<u64, AppError> {
        let token = self.tokens.access_token().await?;
        let response = self
            .client
            .get(self.project_url(&format!("/datasets/{dataset}/tables/{table}")))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| send_error(e, BIGQUERY_TIMEOUT.as_secs()))?;
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let info: TableInfo = response
            .json()
            .await
            .map_err(|e| AppError::HttpError(format!("Failed to parse table: {e}")))?;
        info.num_rows
            .as_deref()
            .unwrap_or("0")
            .parse()
            .map_err(|e| AppError::HttpError(format!("Invalid numRows: {e}")))
    }
}

impl Warehouse for BigQueryWarehouse {
    async fn delete_table(&self, dataset: &str, table: &str) -> Result<bool, AppError> {
        let token = self.tokens.access_token().await?;
        let response = self
            .client
            .delete(self.project_url(&format!("/datasets/{dataset}/tables/{table}")))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| send_error(e, BIGQUERY_TIMEOUT.as_secs()))?;

        match response.status() {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(status_error(response).await),
        }
    }

    async fn load_from_uri(
        &self,
        dataset: &str,
        table: &str,
        schema: &[FieldSpec],
        uri: &str,
    ) -> Result<u64, AppError> {
        let token = self.tokens.access_token().await?;
        let job = self.insert_load_job(&token, dataset, table, schema, uri).await?;
        let job_id = job.job_reference.job_id.clone();
        tracing::debug!(%job_id, dataset, table, uri, "Load job submitted");

        self.wait_for_job(job).await?;
        let rows = self.table_rows(dataset, table).await?;
        tracing::info!(%job_id, dataset, table, rows, "Load job done");
        Ok(rows)
    }
}
