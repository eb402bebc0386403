use crate::error::{PipelineError, Result};
use serde_json::value::RawValue;
use serde_json::Value;

/// Split an input's content into its records, keeping each element's
/// original text. Anything other than a JSON array is rejected as a whole.
pub fn parse_records(content: &str) -> std::result::Result<Vec<Box<RawValue>>, serde_json::Error> {
    serde_json::from_str::<Vec<Box<RawValue>>>(content)
}

/// Decode one record for inspection. The raw text stays the routed content.
pub fn decode_record(raw: &RawValue) -> std::result::Result<Value, serde_json::Error> {
    serde_json::from_str(raw.get())
}

/// Extract the correlation id at `pointer` (RFC 6901).
///
/// A missing or null value yields an empty id. Strings are taken as-is,
/// numbers and booleans use their JSON text. Objects, arrays, or a scalar
/// standing where an object is expected are extraction failures.
pub fn extract_correlation_id(record: &Value, pointer: &str) -> Result<String> {
    let tokens = pointer
        .strip_prefix('/')
        .ok_or_else(|| PipelineError::CorrelationExtraction(format!("invalid pointer '{}'", pointer)))?
        .split('/')
        .map(|t| t.replace("~1", "/").replace("~0", "~"));

    let mut current = record;
    for token in tokens {
        current = match current {
            Value::Object(map) => match map.get(&token) {
                Some(next) => next,
                None => return Ok(String::new()),
            },
            Value::Null => return Ok(String::new()),
            other => {
                return Err(PipelineError::CorrelationExtraction(format!(
                    "expected an object at '{}' but found {}",
                    token,
                    kind(other)
                )))
            }
        };
    }

    match current {
        Value::Null => Ok(String::new()),
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(PipelineError::CorrelationExtraction(format!(
            "correlation id is {}, not a scalar",
            kind(other)
        ))),
    }
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

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const POINTER: &str = "/customerTechnicalHeader/correlationId";

    #[test]
    fn reads_nested_string_id() {
        let record = json!({ "customerTechnicalHeader": { "correlationId": "C1" } });
        assert_eq!(extract_correlation_id(&record, POINTER).unwrap(), "C1");
    }

    #[test]
    fn missing_or_null_id_is_empty() {
        assert_eq!(extract_correlation_id(&json!({}), POINTER).unwrap(), "");
        assert_eq!(
            extract_correlation_id(&json!({ "customerTechnicalHeader": null }), POINTER).unwrap(),
            ""
        );
        assert_eq!(
            extract_correlation_id(&json!({ "customerTechnicalHeader": { "correlationId": null } }), POINTER)
                .unwrap(),
            ""
        );
    }

    #[test]
    fn numeric_id_uses_json_text() {
        let record = json!({ "customerTechnicalHeader": { "correlationId": 42 } });
        assert_eq!(extract_correlation_id(&record, POINTER).unwrap(), "42");
    }

    #[test]
    fn structured_values_fail_extraction() {
        let record = json!({ "customerTechnicalHeader": { "correlationId": { "id": 1 } } });
        assert!(matches!(
            extract_correlation_id(&record, POINTER),
            Err(PipelineError::CorrelationExtraction(_))
        ));
        let record = json!({ "customerTechnicalHeader": "C1" });
        assert!(extract_correlation_id(&record, POINTER).is_err());
    }

    #[test]
    fn top_level_pointer_and_escapes() {
        let record = json!({ "correlationId": "T1" });
        assert_eq!(extract_correlation_id(&record, "/correlationId").unwrap(), "T1");
        let record = json!({ "a/b": { "c~d": "E1" } });
        assert_eq!(extract_correlation_id(&record, "/a~1b/c~0d").unwrap(), "E1");
    }

    #[test]
    fn records_keep_their_original_text() {
        let records =
            parse_records(r#"[ {"id": 12345678901234567890123, "n": 1e2} , {"b":  2} ]"#).unwrap();
        assert_eq!(records[0].get(), r#"{"id": 12345678901234567890123, "n": 1e2}"#);
        assert_eq!(records[1].get(), r#"{"b":  2}"#);
        assert!(decode_record(&records[1]).unwrap().is_object());
    }

    #[test]
    fn only_arrays_parse_as_records() {
        assert_eq!(parse_records(r#"[{"a":1},{"b":2}]"#).unwrap().len(), 2);
        assert!(parse_records("[]").unwrap().is_empty());
        assert!(parse_records("{not an array}").is_err());
        assert!(parse_records(r#"{"a":1}"#).is_err());
    }
}
