//! Kubernetes-specific template filters
//!
//! These filters extend MiniJinja with the Helm functions most often found
//! in vcluster manifest templates.

use base64::Engine as _;
use minijinja::{Error, ErrorKind, Value};

fn invalid(e: impl std::fmt::Display) -> Error {
    Error::new(ErrorKind::InvalidOperation, e.to_string())
}

/// Convert a value to YAML format
///
/// Usage: {{ values.config | toyaml }}
pub fn toyaml(value: Value) -> Result<String, Error> {
    let json_value: serde_json::Value = serde_json::to_value(&value).map_err(invalid)?;
    let yaml = serde_yaml::to_string(&json_value).map_err(invalid)?;
    Ok(yaml.trim_start_matches("---\n").trim_end().to_string())
}

/// Convert a value to JSON format
///
/// Usage: {{ values.config | tojson }}
pub fn tojson(value: Value) -> Result<String, Error> {
    let json_value: serde_json::Value = serde_json::to_value(&value).map_err(invalid)?;
    serde_json::to_string(&json_value).map_err(invalid)
}

/// Usage: {{ secret | b64encode }}
pub fn b64encode(value: String) -> String {
    base64::engine::general_purpose::STANDARD.encode(value.as_bytes())
}

/// Usage: {{ encoded | b64decode }}
pub fn b64decode(value: String) -> Result<String, Error> {
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(value.as_bytes())
        .map_err(|e| invalid(format!("base64 decode error: {}", e)))?;
    String::from_utf8(decoded).map_err(|e| invalid(format!("UTF-8 decode error: {}", e)))
}

/// Quote a string with double quotes
///
/// Usage: {{ name | quote }}
pub fn quote(value: Value) -> String {
    let s = match value.as_str() {
        Some(s) => s.to_string(),
        None => value.to_string(),
    };
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Indent text with a newline prefix (like Helm's nindent)
///
/// Usage: {{ content | nindent(4) }}
pub fn nindent(value: String, spaces: usize) -> String {
    format!("\n{}", indent(value, spaces))
}

/// Indent every non-empty line
///
/// Usage: {{ content | indent(4) }}
pub fn indent(value: String, spaces: usize) -> String {
    let prefix = " ".repeat(spaces);
    value
        .lines()
        .map(|line| {
            if line.is_empty() {
                String::new()
            } else {
                format!("{}{}", prefix, line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Fail rendering when a value is undefined, none or an empty string
///
/// Usage: {{ values.host | required("host is required") }}
pub fn required(value: Value, message: Option<String>) -> Result<Value, Error> {
    let missing = value.is_undefined()
        || value.is_none()
        || value.as_str().is_some_and(str::is_empty);
    if missing {
        Err(invalid(
            message.unwrap_or_else(|| "required value is missing".to_string()),
        ))
    } else {
        Ok(value)
    }
}

/// SHA256 hash of a string
///
/// Usage: {{ value | sha256 }}
pub fn sha256sum(value: String) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Truncate a string to a maximum number of characters
///
/// Usage: {{ name | trunc(63) }}
pub fn trunc(value: String, length: usize) -> String {
    value.chars().take(length).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toyaml() {
        let value = Value::from_serialize(serde_json::json!({
            "name": "test",
            "port": 8080
        }));
        let yaml = toyaml(value).unwrap();
        assert!(yaml.contains("name: test"));
        assert!(yaml.contains("port: 8080"));
        assert!(!yaml.ends_with('\n'));
    }

    #[test]
    fn test_tojson() {
        let value = Value::from_serialize(serde_json::json!({"a": 1}));
        assert_eq!(tojson(value).unwrap(), r#"{"a":1}"#);
    }

    #[test]
    fn test_b64encode_decode() {
        let encoded = b64encode("hello world".to_string());
        assert_eq!(encoded, "aGVsbG8gd29ybGQ=");
        assert_eq!(b64decode(encoded).unwrap(), "hello world");
        assert!(b64decode("%%%".to_string()).is_err());
    }

    #[test]
    fn test_quote() {
        assert_eq!(quote(Value::from("test")), "\"test\"");
        assert_eq!(quote(Value::from("a\"b")), "\"a\\\"b\"");
        assert_eq!(quote(Value::from(3)), "\"3\"");
    }

    #[test]
    fn test_indent() {
        assert_eq!(indent("a\n\nb".to_string(), 2), "  a\n\n  b");
        assert_eq!(nindent("line1\nline2".to_string(), 4), "\n    line1\n    line2");
    }

    #[test]
    fn test_required() {
        assert!(required(Value::from("x"), None).is_ok());
        assert!(required(Value::UNDEFINED, None).is_err());
        assert!(required(Value::from(""), Some("need it".to_string())).is_err());
    }

    #[test]
    fn test_trunc() {
        assert_eq!(trunc("abcdef".to_string(), 3), "abc");
        assert_eq!(trunc("ab".to_string(), 3), "ab");
    }

    #[test]
    fn test_sha256() {
        assert_eq!(
            sha256sum("hello".to_string()),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }
}
