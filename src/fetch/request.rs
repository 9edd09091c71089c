use std::collections::HashMap;
use std::iter::Peekable;
use std::str::Chars;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use crate::config::ApiConfig;
use crate::error::{AppError, Context};

use super::{BatchRequest, FetchResult};

#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub url: String,
    pub headers: HeaderMap,
}

/// Render the batch URL and headers for one chunk of symbols.
pub fn prepare_request(
    api: &ApiConfig,
    symbols: &[String],
    request: &BatchRequest,
) -> FetchResult<PreparedRequest> {
    let replacements = HashMap::from([
        ("base", api.base_url.clone()),
        ("types", request.types.join(",")),
        ("fields", request.fields.join(",")),
        ("symbols", symbols.join(",")),
    ]);

    let url = render_template(&api.url_template, &replacements)?;
    let headers = build_headers(&api.headers)?;

    Ok(PreparedRequest { url, headers })
}

/// Replace `${NAME}` sequences with values from the environment.
pub fn expand_env_vars(value: &str) -> FetchResult<String> {
    let mut result = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            result.push_str(&env_placeholder(&mut chars)?);
        } else {
            result.push(ch);
        }
    }

    Ok(result)
}

/// Fill `{key}` placeholders from `replacements` and `${NAME}` from the environment.
pub fn render_template(
    template: &str,
    replacements: &HashMap<&str, String>,
) -> FetchResult<String> {
    let mut result = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '$' if matches!(chars.peek(), Some('{')) => {
                chars.next();
                result.push_str(&env_placeholder(&mut chars)?);
            }
            '{' => {
                let key = read_placeholder(&mut chars)?;
                let value = replacements.get(key.as_str()).ok_or_else(|| {
                    AppError::message(format!(
                        "No replacement provided for placeholder `{}` in template",
                        key
                    ))
                })?;
                result.push_str(value);
            }
            _ => result.push(ch),
        }
    }

    Ok(result)
}

fn env_placeholder(chars: &mut Peekable<Chars<'_>>) -> FetchResult<String> {
    let name = read_placeholder(chars)?;
    let value = std::env::var(&name).with_context(|| {
        format!("Environment variable {} required by request is not set", name)
    })?;
    Ok(value)
}

/// Consume characters up to the closing brace; the opening brace is already consumed.
fn read_placeholder(chars: &mut Peekable<Chars<'_>>) -> FetchResult<String> {
    let mut key = String::new();
    for next in chars.by_ref() {
        if next == '}' {
            if key.is_empty() {
                return Err(AppError::message(
                    "Encountered empty placeholder `{}` in template",
                ));
            }
            return Ok(key);
        }
        key.push(next);
    }

    Err(AppError::message(format!(
        "Unterminated placeholder in template: {{{key}"
    )))
}

fn build_headers(headers: &HashMap<String, String>) -> FetchResult<HeaderMap> {
    let mut map = HeaderMap::new();
    for (key, value) in headers {
        let name = HeaderName::from_bytes(key.as_bytes())
            .with_context(|| format!("Invalid header name: {}", key))?;
        let expanded = expand_env_vars(value)?;
        let header_value = HeaderValue::from_str(&expanded)
            .with_context(|| format!("Invalid header value for {}", key))?;
        map.insert(name, header_value);
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, FieldGroup, FieldSpec};

    fn symbols(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn renders_iex_style_batch_url() {
        let api = Config::builtin().api;
        let spec = FieldSpec::new(vec![
            FieldGroup::new("quote", &[("close", "Price"), ("peRatio", "P/E")]),
            FieldGroup::new("stats", &[("marketcap", "Market Cap")]),
        ]);
        let request = BatchRequest::from_spec(&spec);

        let prepared = prepare_request(&api, &symbols(&["AAPL", "MMM"]), &request).unwrap();

        assert_eq!(
            prepared.url,
            "https://api.iextrading.com/1.0/stock/market/batch?types=quote,stats&filter=close,peRatio,marketcap&symbols=AAPL,MMM"
        );
        assert!(prepared.headers.contains_key("user-agent"));
    }

    #[test]
    fn expands_environment_tokens() {
        std::env::set_var("INDEX_FINANCIALS_TEST_TOKEN", "sk_123");
        let replacements = HashMap::from([("symbols", "AAPL".to_string())]);

        let url = render_template(
            "https://cloud.example/batch?symbols={symbols}&token=${INDEX_FINANCIALS_TEST_TOKEN}",
            &replacements,
        )
        .unwrap();

        assert_eq!(url, "https://cloud.example/batch?symbols=AAPL&token=sk_123");
    }

    #[test]
    fn rejects_unknown_placeholder() {
        let err = render_template("{base}/{nope}", &HashMap::from([("base", "x".to_string())]))
            .unwrap_err();
        assert!(err.to_string().contains("`nope`"), "{err}");
    }

    #[test]
    fn rejects_malformed_placeholders() {
        let empty = HashMap::new();
        assert!(render_template("a{}b", &empty)
            .unwrap_err()
            .to_string()
            .contains("empty placeholder"));
        assert!(render_template("a{open", &empty)
            .unwrap_err()
            .to_string()
            .contains("Unterminated"));
        assert!(expand_env_vars("${INDEX_FINANCIALS_SURELY_UNSET}")
            .unwrap_err()
            .to_string()
            .contains("INDEX_FINANCIALS_SURELY_UNSET"));
    }
}
