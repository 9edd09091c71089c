use std::collections::HashMap;
use std::sync::Mutex;

use log::{debug, warn};
use reqwest::{Client, StatusCode};
use tokio::time::{sleep, Duration};

use crate::config::ApiConfig;
use crate::error::{AppError, Context};

use super::decode::parse_batch_response;
use super::request::{prepare_request, PreparedRequest};
use super::{BatchRequest, BatchResponse, BatchSource, FetchResult, ResponseCache, Throttle};

/// Batch source backed by the configured HTTP endpoint, with retry, throttle and cache.
///
/// Fetched bodies are held back and only written to the cache once the batch is confirmed.
pub struct HttpBatchSource {
    client: Client,
    api: ApiConfig,
    throttle: Throttle,
    cache: Option<ResponseCache>,
    pending: Mutex<HashMap<String, String>>,
}

impl HttpBatchSource {
    pub fn new(api: ApiConfig) -> FetchResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(api.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        let cache = match &api.cache_dir {
            Some(dir) => Some(ResponseCache::open(dir)?),
            None => None,
        };

        Ok(Self {
            client,
            throttle: Throttle::new(Duration::from_millis(api.min_interval_ms)),
            api,
            cache,
            pending: Mutex::new(HashMap::new()),
        })
    }

    fn pending(&self) -> FetchResult<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.pending
            .lock()
            .map_err(|_| AppError::message("Pending cache entries are poisoned"))
    }

    async fn fetch_body(&self, prepared: &PreparedRequest) -> FetchResult<String> {
        let max_retries = self.api.max_retries.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            self.throttle.wait().await;

            let failure = match self
                .client
                .get(&prepared.url)
                .headers(prepared.headers.clone())
                .send()
                .await
            {
                Ok(response) => {
                    let status = response.status();
                    if status.is_client_error() && status != StatusCode::TOO_MANY_REQUESTS {
                        return Err(AppError::message(format!(
                            "Batch request was rejected with status {}",
                            status
                        )));
                    }

                    if status.is_success() {
                        match response.text().await {
                            Ok(body) => return Ok(body),
                            Err(err) => format!("body read failed: {}", err),
                        }
                    } else {
                        format!("status {}", status)
                    }
                }
                Err(err) => err.to_string(),
            };

            if attempt >= max_retries {
                return Err(AppError::message(format!(
                    "Batch request failed after {} attempts: {}",
                    attempt, failure
                )));
            }

            let delay = backoff_delay(self.api.backoff_ms, attempt);
            warn!(
                "Batch request attempt {}/{} failed ({}); retrying in {:?}",
                attempt, max_retries, failure, delay
            );
            sleep(delay).await;
        }
    }
}

impl BatchSource for HttpBatchSource {
    async fn fetch_batch(
        &self,
        symbols: &[String],
        request: &BatchRequest,
    ) -> FetchResult<BatchResponse> {
        let prepared = prepare_request(&self.api, symbols, request)?;

        if let Some(cache) = &self.cache {
            if let Some(body) = cache.load(&prepared.url)? {
                match parse_batch_response(&body) {
                    Ok(response) => {
                        debug!("Serving {} symbols from cache", symbols.len());
                        return Ok(response);
                    }
                    Err(err) => warn!(
                        "Discarding unreadable cache entry {}: {}",
                        cache.path_for(&prepared.url).display(),
                        err
                    ),
                }
            }
        }

        debug!("Requesting batch of {} symbols", symbols.len());
        let body = self.fetch_body(&prepared).await?;
        let response = parse_batch_response(&body)?;

        if self.cache.is_some() {
            self.pending()?.insert(prepared.url, body);
        }

        Ok(response)
    }

    async fn confirm_batch(&self, symbols: &[String], request: &BatchRequest) -> FetchResult<()> {
        let Some(cache) = &self.cache else {
            return Ok(());
        };

        let prepared = prepare_request(&self.api, symbols, request)?;
        let body = self.pending()?.remove(&prepared.url);
        if let Some(body) = body {
            cache.store(&prepared.url, &body)?;
        }
        Ok(())
    }
}

/// Exponential delay before the attempt after `attempt`, saturating instead of overflowing.
fn backoff_delay(backoff_ms: u64, attempt: u32) -> Duration {
    let factor = 2_u64.saturating_pow(attempt.saturating_sub(1));
    Duration::from_millis(backoff_ms.saturating_mul(factor))
}
