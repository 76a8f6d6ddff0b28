use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

use crate::error::{BridgeError, Result};

/// Longest accepted terminal identifier
pub const MAX_TERMINAL_ID_LEN: usize = 128;

/// Opaque identity of one trading terminal (account number or EA id).
///
/// All status and command state is scoped by this key; two terminals never
/// share a snapshot or a queue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TerminalId(String);

impl TerminalId {
    /// Parse a raw identifier, trimming surrounding whitespace
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(BridgeError::Validation(
                "terminal_id must not be empty".to_string(),
            ));
        }
        if trimmed.chars().count() > MAX_TERMINAL_ID_LEN {
            return Err(BridgeError::Validation(format!(
                "terminal_id exceeds {MAX_TERMINAL_ID_LEN} characters"
            )));
        }
        if trimmed.chars().any(char::is_control) {
            return Err(BridgeError::Validation(
                "terminal_id must not contain control characters".to_string(),
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for TerminalId {
    type Error = BridgeError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<TerminalId> for String {
    fn from(id: TerminalId) -> Self {
        id.0
    }
}

impl Borrow<str> for TerminalId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for TerminalId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TerminalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
