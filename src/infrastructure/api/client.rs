//! HTTP client for the scanning platform's REST API

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde_json::Value;
use tracing::{debug, info};

use super::{PlatformDataSource, PROJECTS_ENDPOINT};
use crate::application::errors::{ApiError, EngineError};
use crate::domain::recipe::QueryParams;
use crate::infrastructure::cache::{query_key, FetchProgress, ProgressStore};
use crate::infrastructure::resilience::{retry_with_backoff, RetryConfig};

/// Sparse list windows come back as empty pages; give up after this many in a row
const MAX_CONSECUTIVE_EMPTY_PAGES: u32 = 3;

/// Cap on response body excerpts quoted in error messages
const ERROR_EXCERPT_LEN: usize = 200;

/// Authenticated client for the platform API.
///
/// List fetches paginate by offset, retry transient failures, and checkpoint
/// accumulated pages through a `ProgressStore` so an interrupted run resumes
/// instead of starting over.
pub struct PlatformClient {
    http: Client,
    base_url: String,
    token: String,
    page_limit: u32,
    retry: RetryConfig,
    progress: Option<ProgressStore>,
}

impl PlatformClient {
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
        page_limit: u32,
        retry: RetryConfig,
    ) -> Result<Self, EngineError> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("scanreport/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            page_limit,
            retry,
            progress: None,
        })
    }

    /// Build a client against `https://{domain}/api`
    pub fn for_domain(
        domain: &str,
        token: impl Into<String>,
        timeout: Duration,
        page_limit: u32,
        retry: RetryConfig,
    ) -> Result<Self, EngineError> {
        Self::new(
            format!("https://{}/api", domain),
            token,
            timeout,
            page_limit,
            retry,
        )
    }

    /// Enable fetch checkpointing through the given store
    pub fn with_progress(mut self, progress: ProgressStore) -> Self {
        self.progress = Some(progress);
        self
    }

    /// One GET with retry on transient failures
    async fn fetch_page(
        &self,
        endpoint: &str,
        params: &QueryParams,
    ) -> Result<Vec<Value>, EngineError> {
        let pairs = query_pairs(params);
        retry_with_backoff(&self.retry, || self.fetch_page_once(endpoint, &pairs)).await
    }

    async fn fetch_page_once(
        &self,
        endpoint: &str,
        pairs: &[(&'static str, String)],
    ) -> Result<Vec<Value>, EngineError> {
        let url = format!("{}{}", self.base_url, endpoint);
        debug!(%url, "Requesting page");

        let response = self
            .http
            .get(&url)
            .header("X-Authorization", &self.token)
            .header(header::ACCEPT, "application/json")
            .query(pairs)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ApiError::Authentication {
                status: status.as_u16(),
            }
            .into());
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            return Err(ApiError::RateLimited { retry_after_secs }.into());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Http {
                status: status.as_u16(),
                message: excerpt(&body),
            }
            .into());
        }

        let body = response.text().await?;
        let value: Value = serde_json::from_str(&body).map_err(|source| EngineError::Parse {
            endpoint: endpoint.to_string(),
            source,
        })?;
        parse_records(endpoint, value)
    }

    /// Fetch every page of a list endpoint, checkpointing after each page.
    ///
    /// The vendor API returns short pages mid-stream, so a short page does not
    /// end the fetch. It ends on three consecutive empty pages, or when a page
    /// shares any record id with rows already accumulated (the API has wrapped
    /// around; that page is discarded).
    async fn fetch_all_pages(
        &self,
        endpoint: &str,
        params: &QueryParams,
    ) -> Result<Vec<Value>, EngineError> {
        let limit = params.limit.unwrap_or(self.page_limit);
        let key = query_key(endpoint, params);

        let mut offset: u64 = params.offset.unwrap_or(0);
        let mut results: Vec<Value> = Vec::new();

        if let Some(store) = &self.progress {
            if let Some(checkpoint) = store.load(&key)? {
                info!(
                    endpoint,
                    offset = checkpoint.offset,
                    rows = checkpoint.results.len(),
                    "Resuming interrupted fetch"
                );
                offset = checkpoint.offset;
                results = checkpoint.results;
            }
        }

        let mut seen: HashSet<String> = results.iter().filter_map(record_id).collect();
        let mut consecutive_empty = 0u32;

        loop {
            let page_params = QueryParams {
                limit: Some(limit),
                offset: Some(offset),
                ..params.clone()
            };
            let page = self.fetch_page(endpoint, &page_params).await?;
            debug!(endpoint, offset, rows = page.len(), "Fetched page");

            if page.is_empty() {
                consecutive_empty += 1;
                if consecutive_empty >= MAX_CONSECUTIVE_EMPTY_PAGES {
                    debug!(endpoint, "Stopping pagination after consecutive empty pages");
                    break;
                }
                offset += u64::from(limit);
                continue;
            }
            consecutive_empty = 0;

            if !results.is_empty() && page.iter().filter_map(record_id).any(|id| seen.contains(&id))
            {
                debug!(endpoint, offset, "Page repeats fetched records, stopping");
                break;
            }

            seen.extend(page.iter().filter_map(record_id));
            results.extend(page);
            offset += u64::from(limit);

            if let Some(store) = &self.progress {
                store.save(
                    &key,
                    &FetchProgress {
                        offset,
                        results: results.clone(),
                    },
                )?;
            }
        }

        if let Some(store) = &self.progress {
            store.clear(&key)?;
        }
        debug!(endpoint, total = results.len(), "Fetch complete");
        Ok(results)
    }
}

#[async_trait]
impl PlatformDataSource for PlatformClient {
    async fn fetch_all(
        &self,
        endpoint: &str,
        params: &QueryParams,
    ) -> Result<Vec<Value>, EngineError> {
        self.fetch_all_pages(endpoint, params).await
    }

    async fn list_projects(&self) -> Result<Vec<Value>, EngineError> {
        self.fetch_all_pages(PROJECTS_ENDPOINT, &QueryParams::default())
            .await
    }

    async fn list_versions(&self, project_id: &str) -> Result<Vec<Value>, EngineError> {
        // This endpoint returns the full list in one response
        let endpoint = format!("{}/{}/versions", PROJECTS_ENDPOINT, project_id);
        self.fetch_page(&endpoint, &QueryParams::default()).await
    }

    async fn test_connection(&self) -> Result<(), EngineError> {
        let params = QueryParams {
            limit: Some(1),
            ..QueryParams::default()
        };
        self.fetch_page(PROJECTS_ENDPOINT, &params).await.map(|_| ())
    }
}

fn query_pairs(params: &QueryParams) -> Vec<(&'static str, String)> {
    let mut pairs = Vec::new();
    if let Some(filter) = &params.filter {
        pairs.push(("filter", filter.clone()));
    }
    if let Some(sort) = &params.sort {
        pairs.push(("sort", sort.clone()));
    }
    if let Some(limit) = params.limit {
        pairs.push(("limit", limit.to_string()));
    }
    if let Some(offset) = params.offset {
        pairs.push(("offset", offset.to_string()));
    }
    if let Some(archived) = params.archived {
        pairs.push(("archived", archived.to_string()));
    }
    pairs
}

/// Normalize the API's response shapes to a list of records: a bare array, an
/// object wrapping the array under `items`/`scans`/`data`, or a single object
/// treated as a one-element list.
fn parse_records(endpoint: &str, body: Value) -> Result<Vec<Value>, EngineError> {
    match body {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => {
            for wrapper in ["items", "scans", "data"] {
                match map.remove(wrapper) {
                    Some(Value::Array(items)) => return Ok(items),
                    Some(other) => {
                        return Err(ApiError::UnexpectedShape {
                            endpoint: endpoint.to_string(),
                            detail: format!("field '{}' is {}, not an array", wrapper, kind(&other)),
                        }
                        .into());
                    }
                    None => {}
                }
            }
            if map.is_empty() {
                Ok(Vec::new())
            } else {
                Ok(vec![Value::Object(map)])
            }
        }
        other => Err(ApiError::UnexpectedShape {
            endpoint: endpoint.to_string(),
            detail: format!("got {}, expected an array or object", kind(&other)),
        }
        .into()),
    }
}

fn record_id(record: &Value) -> Option<String> {
    match record.get("id")? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn excerpt(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.len() <= ERROR_EXCERPT_LEN {
        return trimmed.to_string();
    }
    let mut end = ERROR_EXCERPT_LEN;
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &trimmed[..end])
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
