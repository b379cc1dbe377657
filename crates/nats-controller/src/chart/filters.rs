//! Filters and functions available to chart templates
//!
//! - `toyaml`: serialize a value as YAML
//! - `b64enc`: base64 encode a string
//! - `quote`: wrap a value in double quotes
//! - `random_alphanumeric(n)`: random string of `n` letters and digits

use base64::{engine::general_purpose::STANDARD, Engine};
use minijinja::{Error, ErrorKind, Value};
use rand::distributions::Alphanumeric;
use rand::Rng;

/// YAML filter
///
/// Usage: `{{ Values.commonLabels | toyaml | indent(4) }}`
pub fn toyaml(value: Value) -> Result<String, Error> {
    if value.is_undefined() || value.is_none() {
        return Ok(String::new());
    }
    serde_yaml::to_string(&value)
        .map(|yaml| yaml.trim_end().to_string())
        .map_err(|e| {
            Error::new(
                ErrorKind::InvalidOperation,
                format!("toyaml failed: {}", e),
            )
        })
}

/// Base64 encode filter
///
/// Usage: `{{ Values.auth.password | b64enc }}`
pub fn b64enc(value: &str) -> String {
    STANDARD.encode(value.as_bytes())
}

/// Quote filter; undefined values become `""`
///
/// Usage: `{{ Values.cluster.name | quote }}`
pub fn quote(value: Value) -> String {
    let raw = if value.is_undefined() || value.is_none() {
        String::new()
    } else {
        value.to_string()
    };
    format!("\"{}\"", raw.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Random alphanumeric string of length `n`
///
/// Usage: `{{ random_alphanumeric(32) }}`
pub fn random_alphanumeric(n: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(n)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn b64enc_encodes() {
        assert_eq!(b64enc("nats"), "bmF0cw==");
        assert_eq!(b64enc(""), "");
    }

    #[test]
    fn quote_wraps_and_escapes() {
        assert_eq!(quote(Value::from("4222")), "\"4222\"");
        assert_eq!(quote(Value::from(3)), "\"3\"");
        assert_eq!(quote(Value::from("a\"b")), "\"a\\\"b\"");
        assert_eq!(quote(Value::UNDEFINED), "\"\"");
    }

    #[test]
    fn toyaml_renders_mappings() {
        let value = Value::from_serialize(serde_json::json!({"team": "eventing"}));
        assert_eq!(
            toyaml(value).expect("mapping should serialize"),
            "team: eventing"
        );
        assert_eq!(toyaml(Value::UNDEFINED).expect("undefined is empty"), "");
    }

    #[test]
    fn random_alphanumeric_has_requested_length() {
        let a = random_alphanumeric(32);
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, random_alphanumeric(32));
    }
}
