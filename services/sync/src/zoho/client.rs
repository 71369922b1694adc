use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;

use super::models::{FieldsResponse, RecordsResponse, ZohoFieldMeta};
use crate::remote::{PageQuery, Record};

#[derive(Debug, Clone)]
pub struct ZohoClientConfig {
    pub base_url: String,
    pub oauth_token: String,
    pub max_retries: u32,
    pub timeout_secs: u64,
}

impl ZohoClientConfig {
    pub fn from_env() -> Option<Self> {
        let base_url = std::env::var("ZOHO_API_BASE_URL").ok()?;
        let oauth_token = std::env::var("ZOHO_OAUTH_TOKEN").ok()?;
        let max_retries = std::env::var("ZOHO_MAX_RETRIES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(3);
        let timeout_secs = std::env::var("ZOHO_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30);

        Some(Self {
            base_url,
            oauth_token,
            max_retries,
            timeout_secs,
        })
    }
}

#[derive(Clone)]
pub struct ZohoClient {
    client: Client,
    config: ZohoClientConfig,
}

#[derive(Debug, thiserror::Error)]
pub enum ZohoClientError {
    #[error("HTTP {status}: {body}")]
    HttpError { status: StatusCode, body: String },

    #[error("request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("max retries exceeded after {attempts} attempts: {last_error}")]
    MaxRetriesExceeded { attempts: u32, last_error: String },
}

impl ZohoClient {
    pub fn new(config: ZohoClientConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    /// For testing: create a client pointing at a specific base URL (e.g., wiremock).
    #[cfg(test)]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.config.base_url = base_url.to_string();
        self
    }

    /// Fetch field metadata for one module (`GET /settings/fields?module=...`).
    pub async fn fetch_fields(&self, module: &str) -> Result<Vec<ZohoFieldMeta>, ZohoClientError> {
        let url = format!("{}/settings/fields?module={}", self.config.base_url, module);
        let response: Option<FieldsResponse> = self.get_with_retry(&url, None).await?;
        Ok(response.map(|r| r.fields).unwrap_or_default())
    }

    /// Fetch one record page, retrying transient errors. Zoho answers
    /// 204 past the last page and 304 when nothing changed since the
    /// `If-Modified-Since` bound; both read as an empty page.
    pub async fn fetch_records(
        &self,
        module: &str,
        query: &PageQuery,
    ) -> Result<Vec<Record>, ZohoClientError> {
        let per_page = query.page_size.max(1);
        let page = query.offset / per_page + 1;

        let mut url = format!(
            "{}/{}?page={}&per_page={}",
            self.config.base_url, module, page, per_page
        );
        if let Some(criteria) = &query.extra_criteria {
            url.push_str(&format!("&criteria={criteria}"));
        }
        if let Some(start) = &query.filter_start {
            url.push_str(&format!("&filter_start={start}"));
        }
        if let Some(end) = &query.filter_end {
            url.push_str(&format!("&filter_end={end}"));
        }

        let response: Option<RecordsResponse> =
            self.get_with_retry(&url, query.modified_since).await?;

        match response {
            Some(body) => {
                if let Some(info) = &body.info {
                    tracing::debug!(
                        page = info.page,
                        per_page = info.per_page,
                        count = info.count,
                        more_records = info.more_records,
                        "record page fetched"
                    );
                }
                Ok(body.data)
            }
            None => Ok(Vec::new()),
        }
    }

    async fn get_with_retry<T: DeserializeOwned>(
        &self,
        url: &str,
        modified_since: Option<DateTime<Utc>>,
    ) -> Result<Option<T>, ZohoClientError> {
        let mut last_error = String::new();

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let backoff_secs = std::cmp::min(1u64 << attempt, 30);
                tracing::warn!(attempt, backoff_secs, "retrying after backoff");
                tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
            }

            let mut request = self.client.get(url).header(
                "Authorization",
                format!("Zoho-oauthtoken {}", self.config.oauth_token),
            );
            if let Some(since) = modified_since {
                request = request.header("If-Modified-Since", since.to_rfc3339());
            }

            let response = match request.send().await {
                Ok(resp) => resp,
                Err(e) => {
                    last_error = e.to_string();
                    if e.is_timeout() || e.is_connect() {
                        continue;
                    }
                    return Err(ZohoClientError::RequestError(e));
                }
            };

            let status = response.status();

            if status == StatusCode::NO_CONTENT || status == StatusCode::NOT_MODIFIED {
                return Ok(None);
            }

            if status.is_success() {
                return response
                    .json::<T>()
                    .await
                    .map(Some)
                    .map_err(ZohoClientError::RequestError);
            }

            // Honor Retry-After header for 429
            if status == StatusCode::TOO_MANY_REQUESTS {
                if let Some(retry_after) = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                {
                    let wait = std::cmp::min(retry_after, 60);
                    tracing::warn!(wait, "rate-limited, waiting Retry-After");
                    tokio::time::sleep(Duration::from_secs(wait)).await;
                }
                last_error = "429 Too Many Requests".to_string();
                continue;
            }

            // Retry on 5xx
            if status.is_server_error() {
                let body = response.text().await.unwrap_or_default();
                last_error = format!("{status}: {body}");
                continue;
            }

            // Fail fast on 4xx (except 429 handled above)
            let body = response.text().await.unwrap_or_default();
            return Err(ZohoClientError::HttpError { status, body });
        }

        Err(ZohoClientError::MaxRetriesExceeded {
            attempts: self.config.max_retries + 1,
            last_error,
        })
    }
}
