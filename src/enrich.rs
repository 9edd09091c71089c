use futures::stream::{self, StreamExt, TryStreamExt};
use log::{debug, info, warn};
use serde_json::{Map, Value};

use crate::config::{
    Config, FieldSpec, MissingSymbolPolicy, FILINGS_TITLE, NAME_TITLE, SECTOR_TITLE, SYMBOL_TITLE,
};
use crate::constituents::ConstituentRecord;
use crate::error::{AppError, Context, LookupError, Result};
use crate::fetch::decode::{embedded_symbols, field, value_to_string};
use crate::fetch::{ensure_at_least_one, BatchRequest, BatchResponse, BatchSource};

/// A constituent merged with its fetched values, in output column order.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedRecord {
    pub constituent: ConstituentRecord,
    pub fields: Vec<(String, Value)>,
    pub filings_url: String,
}

impl EnrichedRecord {
    pub fn symbol(&self) -> &str {
        &self.constituent.symbol
    }

    pub fn value(&self, title: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(field_title, _)| field_title == title)
            .map(|(_, value)| value)
    }

    /// CSV cells matching `FieldSpec::header`.
    pub fn to_row(&self) -> Vec<String> {
        let mut row = Vec::with_capacity(self.fields.len() + 4);
        row.push(self.constituent.symbol.clone());
        row.push(self.constituent.name.clone());
        row.push(self.constituent.sector.clone());
        row.extend(self.fields.iter().map(|(_, value)| value_to_string(value)));
        row.push(self.filings_url.clone());
        row
    }

    /// Ordered JSON object keyed by output title.
    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        map.insert(SYMBOL_TITLE.to_string(), self.constituent.symbol.clone().into());
        map.insert(NAME_TITLE.to_string(), self.constituent.name.clone().into());
        map.insert(SECTOR_TITLE.to_string(), self.constituent.sector.clone().into());
        for (title, value) in &self.fields {
            map.insert(title.clone(), value.clone());
        }
        map.insert(FILINGS_TITLE.to_string(), self.filings_url.clone().into());
        Value::Object(map)
    }
}

#[derive(Debug, Clone)]
pub struct EnrichOptions {
    pub batch_size: usize,
    pub concurrency: usize,
    pub on_missing: MissingSymbolPolicy,
    pub filings_base_url: String,
}

impl EnrichOptions {
    pub fn new<S: Into<String>>(batch_size: usize, filings_base_url: S) -> Self {
        Self {
            batch_size,
            concurrency: 1,
            on_missing: MissingSymbolPolicy::Abort,
            filings_base_url: filings_base_url.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            batch_size: config.api.batch_size,
            concurrency: config.api.concurrency,
            on_missing: config.on_missing,
            filings_base_url: config.output.filings_base_url.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnrichOutcome {
    pub records: Vec<EnrichedRecord>,
    /// Symbols dropped under `MissingSymbolPolicy::Skip`, in input order.
    pub skipped: Vec<String>,
}

/// Fetch every record's fields in batches and merge them back in input order.
///
/// Batches may be fetched concurrently; results are reordered by batch index before they
/// are emitted. The first transport or lookup failure aborts the whole run.
pub async fn enrich<S: BatchSource>(
    source: &S,
    records: &[ConstituentRecord],
    spec: &FieldSpec,
    options: &EnrichOptions,
) -> Result<EnrichOutcome> {
    let batch_size = ensure_at_least_one(options.batch_size);
    let concurrency = ensure_at_least_one(options.concurrency);
    let request = BatchRequest::from_spec(spec);
    let chunks: Vec<&[ConstituentRecord]> = records.chunks(batch_size).collect();
    let total_batches = chunks.len();

    info!(
        "Enriching {} symbols in {} batches of up to {}",
        records.len(),
        total_batches,
        batch_size
    );

    let mut merged: Vec<(usize, EnrichOutcome)> = stream::iter(chunks.into_iter().enumerate())
        .map(|(index, chunk)| {
            let request = &request;
            async move {
                let symbols: Vec<String> = chunk.iter().map(|r| r.symbol.clone()).collect();
                debug!("Fetching batch {}/{}", index + 1, total_batches);

                let response = source
                    .fetch_batch(&symbols, request)
                    .await
                    .with_context(|| format!("Batch {}/{} failed", index + 1, total_batches))?;

                let outcome = merge_batch(chunk, &response, spec, options)?;
                source.confirm_batch(&symbols, request).await?;
                Ok::<_, AppError>((index, outcome))
            }
        })
        .buffer_unordered(concurrency)
        .try_collect()
        .await?;

    merged.sort_by_key(|(index, _)| *index);

    let mut outcome = EnrichOutcome {
        records: Vec::with_capacity(records.len()),
        skipped: Vec::new(),
    };
    for (_, batch) in merged {
        outcome.records.extend(batch.records);
        outcome.skipped.extend(batch.skipped);
    }

    if !outcome.skipped.is_empty() {
        warn!(
            "Skipped {} symbols missing from responses: {}",
            outcome.skipped.len(),
            outcome.skipped.join(", ")
        );
    }

    Ok(outcome)
}

/// Align one batch response with the symbols of `chunk`.
pub fn merge_batch(
    chunk: &[ConstituentRecord],
    response: &BatchResponse,
    spec: &FieldSpec,
    options: &EnrichOptions,
) -> std::result::Result<EnrichOutcome, LookupError> {
    let keys: Vec<&String> = response.keys().collect();
    let mut cursor = 0;
    let mut outcome = EnrichOutcome::default();

    for record in chunk {
        let symbol = record.symbol.as_str();

        let Some(entry) = response.get(symbol) else {
            match options.on_missing {
                MissingSymbolPolicy::Abort => {
                    return Err(LookupError::MissingSymbol {
                        symbol: symbol.to_string(),
                    })
                }
                MissingSymbolPolicy::Skip => {
                    warn!("Response has no entry for {symbol}; skipping");
                    outcome.skipped.push(symbol.to_string());
                    continue;
                }
            }
        };

        // Entries must come back in request order.
        if let Some(found) = keys.get(cursor) {
            if found.as_str() != symbol {
                return Err(LookupError::IdentityMismatch {
                    expected: symbol.to_string(),
                    found: (*found).clone(),
                });
            }
        }
        cursor += 1;

        if let Some(found) = embedded_symbols(entry).find(|found| *found != symbol) {
            return Err(LookupError::IdentityMismatch {
                expected: symbol.to_string(),
                found: found.to_string(),
            });
        }

        let fields = spec
            .columns()
            .iter()
            .map(|column| {
                field(entry, &column.group, &column.field)
                    .map(|value| (column.title.clone(), value.clone()))
                    .ok_or_else(|| LookupError::MissingField {
                        symbol: symbol.to_string(),
                        group: column.group.clone(),
                        field: column.field.clone(),
                    })
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        outcome.records.push(EnrichedRecord {
            constituent: record.clone(),
            fields,
            filings_url: format!("{}{}", options.filings_base_url, symbol),
        });
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FieldGroup;
    use crate::fetch::FetchResult;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;

    const BASE: &str = "https://filings.test/?CIK=";

    /// Replies from a table keyed by the comma-joined symbols of each batch.
    struct FakeSource {
        replies: HashMap<String, Value>,
        calls: Mutex<Vec<Vec<String>>>,
        confirmed: Mutex<Vec<Vec<String>>>,
    }

    impl FakeSource {
        fn new(replies: &[(&str, Value)]) -> Self {
            Self {
                replies: replies
                    .iter()
                    .map(|(key, value)| (key.to_string(), value.clone()))
                    .collect(),
                calls: Mutex::new(Vec::new()),
                confirmed: Mutex::new(Vec::new()),
            }
        }
    }

    impl BatchSource for FakeSource {
        async fn fetch_batch(
            &self,
            symbols: &[String],
            _request: &BatchRequest,
        ) -> FetchResult<BatchResponse> {
            self.calls.lock().unwrap().push(symbols.to_vec());
            match self.replies.get(&symbols.join(",")) {
                Some(Value::Object(map)) => Ok(map.clone()),
                _ => Err(AppError::message(format!("no reply for {symbols:?}"))),
            }
        }

        async fn confirm_batch(
            &self,
            symbols: &[String],
            _request: &BatchRequest,
        ) -> FetchResult<()> {
            self.confirmed.lock().unwrap().push(symbols.to_vec());
            Ok(())
        }
    }

    /// One price per symbol, served for whatever batches are requested.
    struct PricedSource {
        prices: HashMap<String, f64>,
    }

    impl PricedSource {
        fn new(records: &[ConstituentRecord]) -> Self {
            Self {
                prices: records
                    .iter()
                    .enumerate()
                    .map(|(i, r)| (r.symbol.clone(), i as f64 + 0.5))
                    .collect(),
            }
        }
    }

    impl BatchSource for PricedSource {
        async fn fetch_batch(
            &self,
            symbols: &[String],
            _request: &BatchRequest,
        ) -> FetchResult<BatchResponse> {
            // Earlier batches answer later, so concurrent runs complete out of order.
            let first = self.prices[&symbols[0]] as u64;
            let delay = 40u64.saturating_sub(first * 2);
            tokio::time::sleep(std::time::Duration::from_millis(delay)).await;

            let mut map = BatchResponse::new();
            for symbol in symbols {
                map.insert(
                    symbol.clone(),
                    json!({"quote": {"close": self.prices[symbol]}}),
                );
            }
            Ok(map)
        }
    }

    fn price_spec() -> FieldSpec {
        FieldSpec::new(vec![FieldGroup::new("quote", &[("close", "Price")])])
    }

    fn two_records() -> Vec<ConstituentRecord> {
        vec![
            ConstituentRecord::new("AAA", "Alpha Co", "Tech"),
            ConstituentRecord::new("BBB", "Beta Co", "Tech"),
        ]
    }

    fn many_records(count: usize) -> Vec<ConstituentRecord> {
        (0..count)
            .map(|i| ConstituentRecord::new(format!("S{i:03}"), format!("Name {i}"), "Sector"))
            .collect()
    }

    #[tokio::test]
    async fn end_to_end_two_batches_of_one() {
        let source = FakeSource::new(&[
            ("AAA", json!({"AAA": {"quote": {"close": 10.5}}})),
            ("BBB", json!({"BBB": {"quote": {"close": 20.25}}})),
        ]);

        let outcome = enrich(
            &source,
            &two_records(),
            &price_spec(),
            &EnrichOptions::new(1, BASE),
        )
        .await
        .expect("enrich succeeds");

        let rows: Vec<Value> = outcome.records.iter().map(EnrichedRecord::to_json).collect();
        assert_eq!(
            rows,
            vec![
                json!({"Symbol": "AAA", "Name": "Alpha Co", "Sector": "Tech", "Price": 10.5,
                       "SEC Filings": format!("{BASE}AAA")}),
                json!({"Symbol": "BBB", "Name": "Beta Co", "Sector": "Tech", "Price": 20.25,
                       "SEC Filings": format!("{BASE}BBB")}),
            ]
        );
        assert_eq!(source.calls.lock().unwrap().len(), 2);
        assert_eq!(source.confirmed.lock().unwrap().len(), 2);
        assert!(outcome.skipped.is_empty());
    }

    #[tokio::test]
    async fn order_and_count_hold_for_any_batch_size() {
        let records = many_records(7);
        let source = PricedSource::new(&records);

        for batch_size in [1, 3, 7, 50] {
            let outcome = enrich(
                &source,
                &records,
                &price_spec(),
                &EnrichOptions::new(batch_size, BASE),
            )
            .await
            .unwrap();

            assert_eq!(outcome.records.len(), records.len(), "batch size {batch_size}");
            let symbols: Vec<&str> = outcome.records.iter().map(EnrichedRecord::symbol).collect();
            let expected: Vec<&str> = records.iter().map(|r| r.symbol.as_str()).collect();
            assert_eq!(symbols, expected, "batch size {batch_size}");
        }
    }

    #[tokio::test]
    async fn concurrent_batches_keep_input_order() {
        let records = many_records(20);
        let source = PricedSource::new(&records);
        let mut options = EnrichOptions::new(4, BASE);
        options.concurrency = 4;

        let outcome = enrich(&source, &records, &price_spec(), &options)
            .await
            .unwrap();

        for (i, record) in outcome.records.iter().enumerate() {
            assert_eq!(record.constituent, records[i]);
            assert_eq!(record.value("Price"), Some(&json!(i as f64 + 0.5)));
        }
    }

    #[tokio::test]
    async fn swapped_keys_are_an_identity_mismatch() {
        let source = FakeSource::new(&[(
            "AAA,BBB",
            json!({
                "BBB": {"quote": {"close": 10.5}},
                "AAA": {"quote": {"close": 20.25}}
            }),
        )]);

        let err = enrich(
            &source,
            &two_records(),
            &price_spec(),
            &EnrichOptions::new(2, BASE),
        )
        .await
        .unwrap_err();

        assert!(
            matches!(
                err,
                AppError::Lookup(LookupError::IdentityMismatch { ref expected, ref found })
                    if expected == "AAA" && found == "BBB"
            ),
            "{err}"
        );
    }

    #[tokio::test]
    async fn embedded_symbol_must_match_key() {
        let source = FakeSource::new(&[(
            "AAA",
            json!({"AAA": {"quote": {"symbol": "ZZZ", "close": 1.0}}}),
        )]);

        let err = enrich(
            &source,
            &two_records()[..1],
            &price_spec(),
            &EnrichOptions::new(1, BASE),
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            AppError::Lookup(LookupError::IdentityMismatch { .. })
        ));
    }

    #[test]
    fn every_embedded_symbol_is_checked() {
        let response: BatchResponse = serde_json::from_value(json!({
            "AAA": {"quote": {"symbol": "AAA", "close": 1.0}, "stats": {"symbol": "ZZZ"}}
        }))
        .unwrap();

        let err = merge_batch(
            &two_records()[..1],
            &response,
            &price_spec(),
            &EnrichOptions::new(1, BASE),
        )
        .unwrap_err();

        assert_eq!(
            err,
            LookupError::IdentityMismatch {
                expected: "AAA".to_string(),
                found: "ZZZ".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn missing_field_aborts_without_output() {
        let source = FakeSource::new(&[(
            "AAA,BBB",
            json!({
                "AAA": {"quote": {"close": 10.5}},
                "BBB": {"quote": {"open": 20.0}}
            }),
        )]);

        let result = enrich(
            &source,
            &two_records(),
            &price_spec(),
            &EnrichOptions::new(2, BASE),
        )
        .await;

        match result {
            Err(AppError::Lookup(LookupError::MissingField {
                symbol,
                group,
                field,
            })) => {
                assert_eq!(
                    (symbol.as_str(), group.as_str(), field.as_str()),
                    ("BBB", "quote", "close")
                );
            }
            other => panic!("expected missing field error, got {other:?}"),
        }
        assert!(source.confirmed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn null_values_are_kept() {
        let source = FakeSource::new(&[("AAA", json!({"AAA": {"quote": {"close": null}}}))]);

        let outcome = enrich(
            &source,
            &two_records()[..1],
            &price_spec(),
            &EnrichOptions::new(1, BASE),
        )
        .await
        .unwrap();

        assert_eq!(outcome.records[0].value("Price"), Some(&Value::Null));
        assert_eq!(outcome.records[0].to_row()[3], "");
    }

    #[tokio::test]
    async fn missing_symbol_aborts_by_default() {
        let source = FakeSource::new(&[("AAA,BBB", json!({"AAA": {"quote": {"close": 1.0}}}))]);

        let err = enrich(
            &source,
            &two_records(),
            &price_spec(),
            &EnrichOptions::new(2, BASE),
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            AppError::Lookup(LookupError::MissingSymbol { ref symbol }) if symbol == "BBB"
        ));
    }

    #[tokio::test]
    async fn skip_policy_drops_only_missing_symbols() {
        let records = vec![
            ConstituentRecord::new("AAA", "Alpha Co", "Tech"),
            ConstituentRecord::new("BBB", "Beta Co", "Tech"),
            ConstituentRecord::new("CCC", "Gamma Co", "Tech"),
        ];
        let source = FakeSource::new(&[(
            "AAA,BBB,CCC",
            json!({
                "AAA": {"quote": {"close": 1.0}},
                "CCC": {"quote": {"close": 3.0}}
            }),
        )]);
        let mut options = EnrichOptions::new(3, BASE);
        options.on_missing = MissingSymbolPolicy::Skip;

        let outcome = enrich(&source, &records, &price_spec(), &options)
            .await
            .unwrap();

        let symbols: Vec<&str> = outcome.records.iter().map(EnrichedRecord::symbol).collect();
        assert_eq!(symbols, vec!["AAA", "CCC"]);
        assert_eq!(outcome.skipped, vec!["BBB".to_string()]);
    }

    #[tokio::test]
    async fn transport_failure_is_fatal() {
        let source = FakeSource::new(&[("AAA", json!({"AAA": {"quote": {"close": 1.0}}}))]);

        let err = enrich(
            &source,
            &two_records(),
            &price_spec(),
            &EnrichOptions::new(1, BASE),
        )
        .await
        .unwrap_err();

        assert!(err.to_string().contains("Batch 2/2 failed"), "{err}");
    }

    #[test]
    fn row_follows_header_order() {
        let spec = FieldSpec::new(vec![
            FieldGroup::new("quote", &[("close", "Price")]),
            FieldGroup::new("stats", &[("marketcap", "Market Cap")]),
        ]);
        let response: BatchResponse = serde_json::from_value(json!({
            "AAA": {"stats": {"marketcap": 1000}, "quote": {"close": 10.5}}
        }))
        .unwrap();

        let outcome = merge_batch(
            &two_records()[..1],
            &response,
            &spec,
            &EnrichOptions::new(1, BASE),
        )
        .unwrap();

        assert_eq!(spec.header().len(), outcome.records[0].to_row().len());
        assert_eq!(
            outcome.records[0].to_row(),
            vec![
                "AAA".to_string(),
                "Alpha Co".to_string(),
                "Tech".to_string(),
                "10.5".to_string(),
                "1000".to_string(),
                format!("{BASE}AAA"),
            ]
        );
    }
}
