use serde_json::Value;

use crate::error::{AppError, Context};

use super::{BatchResponse, FetchResult};

/// Parse a batch body, which must be a JSON object keyed by symbol.
pub fn parse_batch_response(body: &str) -> FetchResult<BatchResponse> {
    let value: Value = serde_json::from_str(body).context("Failed to parse batch response JSON")?;

    match value {
        Value::Object(map) => Ok(map),
        other => Err(AppError::message(format!(
            "Batch response must be a JSON object keyed by symbol, got {}",
            json_kind(&other)
        ))),
    }
}

/// Look up `entry[group][field]`; `None` only when a key is absent.
pub fn field<'a>(entry: &'a Value, group: &str, field: &str) -> Option<&'a Value> {
    entry.get(group)?.get(field)
}

/// Every `symbol` string carried by the group objects of a response entry.
pub fn embedded_symbols(entry: &Value) -> impl Iterator<Item = &str> {
    entry
        .as_object()
        .into_iter()
        .flat_map(|groups| groups.values())
        .filter_map(|group| group.get("symbol").and_then(Value::as_str))
}

pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keeps_wire_order_of_symbols() {
        let response = parse_batch_response(r#"{"ZTS": {}, "AAPL": {}, "MMM": {}}"#).unwrap();
        let keys: Vec<&str> = response.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["ZTS", "AAPL", "MMM"]);
    }

    #[test]
    fn rejects_non_object_body() {
        let err = parse_batch_response("[1, 2]").unwrap_err();
        assert!(err.to_string().contains("an array"), "{err}");
    }

    #[test]
    fn distinguishes_null_from_missing() {
        let entry = json!({"quote": {"close": null}});
        assert_eq!(field(&entry, "quote", "close"), Some(&Value::Null));
        assert_eq!(field(&entry, "quote", "open"), None);
        assert_eq!(field(&entry, "stats", "close"), None);
    }

    #[test]
    fn finds_every_embedded_symbol() {
        let entry = json!({
            "stats": {"beta": 1.1},
            "quote": {"symbol": "AAPL"},
            "company": {"symbol": "MSFT"}
        });
        let symbols: Vec<&str> = embedded_symbols(&entry).collect();
        assert_eq!(symbols, vec!["AAPL", "MSFT"]);
        assert_eq!(embedded_symbols(&json!({"quote": {}})).count(), 0);
        assert_eq!(embedded_symbols(&json!([1, 2])).count(), 0);
    }

    #[test]
    fn renders_values_for_csv() {
        assert_eq!(value_to_string(&json!(20.25)), "20.25");
        assert_eq!(value_to_string(&json!("n/a")), "n/a");
        assert_eq!(value_to_string(&Value::Null), "");
        assert_eq!(value_to_string(&json!(true)), "true");
        assert_eq!(value_to_string(&json!([1, 2])), "[1,2]");
    }
}
