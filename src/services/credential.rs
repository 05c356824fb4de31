use crate::errors::AdapterError;
use std::fmt;

/// Caller-supplied bearer token. Opaque to the adapter; its `Debug` output is
/// masked so it never reaches a log line by accident.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn authorization_value(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Gate run before any network resource is acquired. Absent, empty and
/// whitespace-only tokens are all missing.
pub fn require(raw: Option<&str>) -> Result<Credential, AdapterError> {
    match raw.map(str::trim) {
        Some(token) if !token.is_empty() => Ok(Credential(token.to_string())),
        _ => Err(AdapterError::MissingCredential),
    }
}

/// Accepts both `Bearer <token>` and a bare token.
pub fn strip_bearer_prefix(raw: &str) -> &str {
    let trimmed = raw.trim();
    match trimmed.get(..7) {
        Some(prefix) if prefix.eq_ignore_ascii_case("bearer ") => trimmed[7..].trim_start(),
        _ => trimmed,
    }
}
