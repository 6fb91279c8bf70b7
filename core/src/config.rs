use crate::error::{Error, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use jsonschema::Validator;
use serde_json::Value;
use std::path::Path;

/// Reads a JSON document (config, catalog or state) from disk.
pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Value> {
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

pub fn require_str<'a>(config: &'a Value, key: &str) -> Result<&'a str> {
    match config.get(key) {
        None | Some(Value::Null) => Err(Error::MissingConfiguration(key.to_string())),
        Some(Value::String(s)) => Ok(s),
        Some(other) => Err(Error::InvalidConfiguration(format!(
            "{} must be a string, got {}",
            key, other
        ))),
    }
}

pub fn optional_str<'a>(config: &'a Value, key: &str) -> Option<&'a str> {
    config.get(key).and_then(Value::as_str)
}

/// Parses an ISO 8601 date or date-time. Values without an offset are taken as UTC.
pub fn parse_datetime(value: &str) -> Result<DateTime<Utc>> {
    let rfc3339 = match DateTime::parse_from_rfc3339(value) {
        Ok(dt) => return Ok(dt.with_timezone(&Utc)),
        Err(e) => e,
    };
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(naive.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Ok(naive.and_utc());
        }
    }
    Err(Error::InvalidConfiguration(format!(
        "unable to parse '{}' as an ISO 8601 date: {}",
        value, rfc3339
    )))
}

/// Validates a config against a connector's `connectionSpecification`.
pub fn validate_against_spec(config: &Value, connection_specification: &Value) -> Result<()> {
    let validator = Validator::new(connection_specification)
        .map_err(|e| Error::Protocol(format!("Invalid connection specification: {}", e)))?;

    let errors: Vec<String> = validator.iter_errors(config).map(|e| e.to_string()).collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(Error::InvalidConfiguration(format!(
            "Config validation failed: {}",
            errors.join("; ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_require_str() {
        let config = json!({"api_key": "abc", "port": 1, "empty": null});
        assert_eq!(require_str(&config, "api_key").unwrap(), "abc");
        assert!(matches!(
            require_str(&config, "missing"),
            Err(Error::MissingConfiguration(key)) if key == "missing"
        ));
        assert!(matches!(
            require_str(&config, "empty"),
            Err(Error::MissingConfiguration(_))
        ));
        assert!(matches!(
            require_str(&config, "port"),
            Err(Error::InvalidConfiguration(_))
        ));
        assert_eq!(optional_str(&config, "api_key"), Some("abc"));
        assert_eq!(optional_str(&config, "port"), None);
    }

    #[test]
    fn test_parse_datetime_formats() {
        let expected = Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(parse_datetime("2021-01-01T00:00:00Z").unwrap(), expected);
        assert_eq!(parse_datetime("2021-01-01T00:00:00").unwrap(), expected);
        assert_eq!(parse_datetime("2021-01-01").unwrap(), expected);
        assert_eq!(
            parse_datetime("2021-01-01T02:00:00+02:00").unwrap(),
            expected
        );
    }

    #[test]
    fn test_parse_datetime_rejects_garbage() {
        let err = parse_datetime("not-a-date").unwrap_err();
        assert!(matches!(err, Error::InvalidConfiguration(_)));
        assert!(err.to_string().contains("not-a-date"));
    }

    #[test]
    fn test_validate_against_spec() {
        let spec = json!({
            "type": "object",
            "required": ["api_key"],
            "properties": {"api_key": {"type": "string"}}
        });

        assert!(validate_against_spec(&json!({"api_key": "abc"}), &spec).is_ok());

        let err = validate_against_spec(&json!({}), &spec).unwrap_err();
        assert!(err.to_string().contains("api_key"));

        let err = validate_against_spec(&json!({"api_key": 5}), &spec).unwrap_err();
        assert!(matches!(err, Error::InvalidConfiguration(_)));
    }

    #[test]
    fn test_load_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"api_key": "abc"}"#).unwrap();

        let value = load_json(&path).unwrap();
        assert_eq!(value["api_key"], "abc");

        assert!(matches!(
            load_json(dir.path().join("missing.json")),
            Err(Error::Io(_))
        ));
    }
}
