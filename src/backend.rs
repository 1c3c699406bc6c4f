//! HTTP client for the natural-language-to-query service.
//!
//! The service owns query planning, SQL generation and execution; this
//! module only speaks its wire protocol. `submit_query` is consumed by the
//! submission pipeline through the `QueryBackend` trait so tests can stand
//! in a fake; preview, summary and upload are plain methods used to seed
//! sessions and populate the pre-chat preview screen.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::error::Error;
use std::time::Duration;

use crate::compact::ContextMessage;
use crate::synthesize::{decode_payload, QueryPayload};
use crate::turn::CellValue;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";
const REQUEST_TIMEOUT_SECS: u64 = 60; // query planning + execution can be slow

pub type BackendError = Box<dyn Error + Send + Sync>;

/// The one call the submission pipeline depends on.
#[async_trait]
pub trait QueryBackend: Send + Sync {
    /// Ask one question about a dataset, grounded by compacted history.
    ///
    /// `Ok` carries the decoded payload, including the case where the
    /// service itself reported a failure (`payload.error` set). `Err`
    /// means the round trip failed: transport error, unexpected status,
    /// or an unparseable body.
    async fn submit_query(
        &self,
        question: &str,
        dataset_ref: &str,
        context: &[ContextMessage],
    ) -> Result<QueryPayload, BackendError>;
}

#[async_trait]
impl<B: QueryBackend + ?Sized> QueryBackend for std::sync::Arc<B> {
    async fn submit_query(
        &self,
        question: &str,
        dataset_ref: &str,
        context: &[ContextMessage],
    ) -> Result<QueryPayload, BackendError> {
        (**self).submit_query(question, dataset_ref, context).await
    }
}

// ============ Wire Types ============

#[derive(Debug, Serialize)]
struct QueryRequest<'a> {
    question: &'a str,
    db_path: &'a str,
    chat_history: &'a [ContextMessage],
}

/// First rows of the dataset, for the pre-chat preview screen.
#[derive(Debug, Deserialize, Clone)]
pub struct DataPreview {
    pub table_name: Option<String>,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatasetSummary {
    pub table_name: Option<String>,
    pub row_count: i64,
    pub column_count: i64,
}

/// Result of handing a file to the ingestion service; seeds a new session.
#[derive(Debug, Deserialize, Clone)]
pub struct UploadResult {
    #[serde(rename = "db_path")]
    pub dataset_ref: String,
    #[serde(rename = "filename")]
    pub display_name: String,
}

// ============ HTTP Client ============

pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: &str) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Fetch the first `limit` rows of the dataset's table.
    pub async fn fetch_preview(
        &self,
        dataset_ref: &str,
        limit: usize,
    ) -> Result<DataPreview, BackendError> {
        let response = self
            .client
            .get(format!("{}/data/preview", self.base_url))
            .query(&[("db_path", dataset_ref), ("limit", &limit.to_string())])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(format!("data preview failed ({})", response.status()).into());
        }

        Ok(response.json().await?)
    }

    /// Fetch table name plus row/column counts for the dataset.
    pub async fn fetch_summary(&self, dataset_ref: &str) -> Result<DatasetSummary, BackendError> {
        let response = self
            .client
            .get(format!("{}/data/summary", self.base_url))
            .query(&[("db_path", dataset_ref)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(format!("data summary failed ({})", response.status()).into());
        }

        Ok(response.json().await?)
    }

    /// Hand a tabular file to the ingestion service. The returned
    /// `dataset_ref` is opaque to this crate; it is only carried on the
    /// session and echoed back on every query.
    pub async fn upload_dataset(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<UploadResult, BackendError> {
        let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name.to_string());
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(format!("{}/upload/", self.base_url))
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(format!("upload failed ({}): {}", status, body).into());
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl QueryBackend for HttpBackend {
    async fn submit_query(
        &self,
        question: &str,
        dataset_ref: &str,
        context: &[ContextMessage],
    ) -> Result<QueryPayload, BackendError> {
        let request = QueryRequest {
            question,
            db_path: dataset_ref,
            chat_history: context,
        };

        let response = self
            .client
            .post(format!("{}/query/", self.base_url))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        crate::logging::log_backend(None, &format!("query round trip returned {}", status));
        let body: Value = response.json().await?;

        if !status.is_success() {
            // The service reports planner and executor failures as an HTTP
            // error carrying a detail string; that is a backend-reported
            // outcome, not a transport problem.
            if let Some(detail) = body.get("detail").and_then(Value::as_str) {
                return Ok(QueryPayload::from_error(detail));
            }
            return Err(format!("query endpoint returned {}", status).into());
        }

        Ok(decode_payload(&body))
    }
}
