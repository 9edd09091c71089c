use serde_json::{Map, Value};

use crate::config::FieldSpec;
use crate::error::Result;

pub mod cache;
pub mod client;
pub mod decode;
pub mod request;
pub mod throttle;

pub use cache::ResponseCache;
pub use client::HttpBatchSource;
pub use throttle::Throttle;

pub type FetchResult<T> = Result<T>;

/// Batch payload keyed by symbol, each entry keyed by group then field. Keeps wire order.
pub type BatchResponse = Map<String, Value>;

/// Groups and fields requested for every symbol in a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRequest {
    pub types: Vec<String>,
    pub fields: Vec<String>,
}

impl BatchRequest {
    pub fn from_spec(spec: &FieldSpec) -> Self {
        Self {
            types: spec.group_names().into_iter().map(str::to_string).collect(),
            fields: spec.field_names().into_iter().map(str::to_string).collect(),
        }
    }
}

/// Anything that can return field values for a set of symbols in one call.
#[allow(async_fn_in_trait)]
pub trait BatchSource {
    async fn fetch_batch(
        &self,
        symbols: &[String],
        request: &BatchRequest,
    ) -> FetchResult<BatchResponse>;

    /// Called once the batch fetched for `symbols` has merged without lookup errors.
    async fn confirm_batch(&self, _symbols: &[String], _request: &BatchRequest) -> FetchResult<()> {
        Ok(())
    }
}

#[inline]
pub fn ensure_at_least_one(value: usize) -> usize {
    value.max(1)
}
