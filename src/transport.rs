//! Transport abstraction for reaching execution resources.
//!
//! A transport knows how to run a shell command on a computer and returns the
//! usual (return code, stdout, stderr) triple. Concrete implementations
//! exist for local execution and for SSH via the system client.

pub mod local;
pub mod ssh;

use anyhow::Result;
use serde_json::Value;
use std::collections::BTreeMap;

pub use local::LocalTransport;
pub use ssh::SshTransport;

/// Value type of an auth-params field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFieldKind {
    Text,
    Integer,
    Bool,
    Float,
}

/// One field of a transport's auth-params schema.
#[derive(Debug, Clone)]
pub struct AuthField {
    /// Key under which the value is stored
    pub name: &'static str,
    /// Prompt shown during interactive configuration
    pub prompt: &'static str,
    pub kind: AuthFieldKind,
    /// Built-in default, lowest layer of the reconciliation
    pub default: Value,
}

impl AuthField {
    /// Parse a raw string (CLI or prompt input) into the field's value type.
    pub fn parse(&self, raw: &str) -> Result<Value, String> {
        let raw = raw.trim();
        match self.kind {
            AuthFieldKind::Text => Ok(Value::String(raw.to_string())),
            AuthFieldKind::Integer => raw
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| format!("'{raw}' is not a valid integer")),
            AuthFieldKind::Float => raw
                .parse::<f64>()
                .map(Value::from)
                .map_err(|_| format!("'{raw}' is not a valid number")),
            AuthFieldKind::Bool => match raw.to_ascii_lowercase().as_str() {
                "true" | "yes" | "y" | "1" => Ok(Value::Bool(true)),
                "false" | "no" | "n" | "0" => Ok(Value::Bool(false)),
                _ => Err(format!("'{raw}' is not a valid boolean (yes/no)")),
            },
        }
    }

    /// Render a stored value the way it is shown in prompts and option
    /// strings.
    pub fn display(value: &Value) -> String {
        match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// Connectivity mechanism for one computer.
///
/// Implementations are synchronous; each call runs one command to completion.
pub trait Transport {
    /// Registry identifier of this transport kind.
    fn kind(&self) -> &'static str;

    /// Verify the transport can be opened at all (e.g. the remote host
    /// accepts a connection).
    fn open(&self) -> Result<()>;

    /// Run a shell command, honoring the configured login-shell setting.
    fn exec_command(&self, command: &str) -> Result<(i32, String, String)>;

    /// Run a shell command with an explicit login-shell choice, used by the
    /// login-shell timing comparison.
    fn exec_with_login_shell(&self, command: &str, login_shell: bool)
        -> Result<(i32, String, String)>;
}

/// Read a bool out of auth params, falling back when absent or mistyped.
pub fn param_bool(params: &BTreeMap<String, Value>, key: &str, default: bool) -> bool {
    params.get(key).and_then(Value::as_bool).unwrap_or(default)
}

/// Read a string out of auth params.
pub fn param_str<'a>(params: &'a BTreeMap<String, Value>, key: &str) -> Option<&'a str> {
    params.get(key).and_then(Value::as_str)
}

/// Read an integer out of auth params.
pub fn param_i64(params: &BTreeMap<String, Value>, key: &str) -> Option<i64> {
    params.get(key).and_then(Value::as_i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(kind: AuthFieldKind) -> AuthField {
        AuthField {
            name: "field",
            prompt: "Field",
            kind,
            default: Value::Null,
        }
    }

    #[test]
    fn test_parse_integer() {
        let f = field(AuthFieldKind::Integer);
        assert_eq!(f.parse("345").unwrap(), Value::from(345));
        assert!(f.parse("n").is_err());
    }

    #[test]
    fn test_parse_bool_accepts_yes_no() {
        let f = field(AuthFieldKind::Bool);
        assert_eq!(f.parse("yes").unwrap(), Value::Bool(true));
        assert_eq!(f.parse("no").unwrap(), Value::Bool(false));
        assert_eq!(f.parse("True").unwrap(), Value::Bool(true));
        assert!(f.parse("maybe").is_err());
    }

    #[test]
    fn test_parse_float_rejects_garbage() {
        let f = field(AuthFieldKind::Float);
        assert_eq!(f.parse("1.0").unwrap(), Value::from(1.0));
        assert!(f.parse("n").is_err());
    }
}
