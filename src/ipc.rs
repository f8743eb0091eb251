//! Wire-level request/response shapes for the command transport
//! (spec.md §6).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A flag value as it arrives over the wire: booleans for presence-only
/// flags (`-h`, `-P`, `-d`, `-g`, `-u`, `-s`, `-a`), strings for `-t`/`-n`/
/// `-c`/`-F`, integers for `-x`/`-y` (spec.md §6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlagValue {
    Bool(bool),
    Str(String),
    Int(i64),
}

impl FlagValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FlagValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> bool {
        matches!(self, FlagValue::Bool(true))
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            FlagValue::Int(n) => Some(*n),
            FlagValue::Str(s) => s.parse().ok(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Request {
    #[serde(rename = "Command")]
    pub command: String,
    #[serde(rename = "Flags", default)]
    pub flags: HashMap<String, FlagValue>,
    #[serde(rename = "Args", default)]
    pub args: Vec<String>,
    #[serde(rename = "Env", default)]
    pub env: HashMap<String, String>,
    #[serde(rename = "CallerPane", default)]
    pub caller_pane: String,
}

impl Request {
    pub fn flag_str(&self, name: &str) -> Option<&str> {
        self.flags.get(name).and_then(FlagValue::as_str)
    }

    pub fn flag_bool(&self, name: &str) -> bool {
        self.flags.get(name).map(FlagValue::as_bool).unwrap_or(false)
    }

    pub fn flag_int(&self, name: &str) -> Option<i64> {
        self.flags.get(name).and_then(FlagValue::as_int)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Response {
    #[serde(rename = "ExitCode")]
    pub exit_code: i32,
    #[serde(rename = "Stdout")]
    pub stdout: String,
    #[serde(rename = "Stderr")]
    pub stderr: String,
}

impl Response {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Response { exit_code: 0, stdout: stdout.into(), stderr: String::new() }
    }

    pub fn ok_empty() -> Self {
        Response::ok(String::new())
    }

    pub fn err(message: impl Into<String>) -> Self {
        let mut msg = message.into();
        if !msg.ends_with('\n') {
            msg.push('\n');
        }
        Response { exit_code: 1, stdout: String::new(), stderr: msg }
    }

    pub fn from_result<T: Into<String>>(result: Result<T, crate::error::CoreError>) -> Self {
        match result {
            Ok(s) => Response::ok(s),
            Err(e) => Response::err(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_get_trailing_newline() {
        let r = Response::err("pane not found: %7");
        assert_eq!(r.stderr, "pane not found: %7\n");
        assert_eq!(r.exit_code, 1);
    }

    #[test]
    fn flag_int_accepts_string_encoded_numbers() {
        let mut flags = HashMap::new();
        flags.insert("-x".to_string(), FlagValue::Str("120".to_string()));
        let req = Request { flags, ..Default::default() };
        assert_eq!(req.flag_int("-x"), Some(120));
    }
}
