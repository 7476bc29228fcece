//! Consumer name validation.
//!
//! A consumer id is chosen by the calling application and outlives any cursor
//! it opens, so it has to survive being written to disk, embedded in a URL
//! path, and printed in logs. Valid ids:
//! - Must be non-empty and at most [`MAX_CONSUMER_ID_LEN`] bytes
//! - Must not contain whitespace or control characters
//! - Must not contain `/`

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Upper bound on the length of a consumer id, in bytes.
pub const MAX_CONSUMER_ID_LEN: usize = 256;

/// Stable identifier under which acknowledged progress is recorded.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ConsumerId(String);

impl ConsumerId {
    /// Validate and wrap a consumer name.
    ///
    /// ```
    /// use clog_types::ConsumerId;
    ///
    /// assert!(ConsumerId::new("billing-projector").is_ok());
    /// assert!(ConsumerId::new("").is_err());
    /// assert!(ConsumerId::new("two words").is_err());
    /// ```
    pub fn new(id: impl Into<String>) -> Result<Self, TypeError> {
        let id = id.into();
        validate(&id)?;
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn validate(id: &str) -> Result<(), TypeError> {
    let reject = |reason: &str| {
        Err(TypeError::InvalidConsumerId {
            id: id.to_string(),
            reason: reason.to_string(),
        })
    };

    if id.is_empty() {
        return reject("must not be empty");
    }
    if id.len() > MAX_CONSUMER_ID_LEN {
        return reject("longer than 256 bytes");
    }
    if id.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return reject("contains whitespace or control characters");
    }
    if id.contains('/') {
        return reject("must not contain '/'");
    }
    Ok(())
}

impl fmt::Debug for ConsumerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConsumerId({})", self.0)
    }
}

impl fmt::Display for ConsumerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ConsumerId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ConsumerId {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ConsumerId> for String {
    fn from(id: ConsumerId) -> Self {
        id.0
    }
}

impl AsRef<str> for ConsumerId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_common_names() {
        for name in ["consumerX", "billing.projector", "search_indexer-2", "örders"] {
            assert!(ConsumerId::new(name).is_ok(), "{name} should be valid");
        }
    }

    #[test]
    fn rejects_invalid_names() {
        for name in ["", " ", "a b", "tab\there", "new\nline", "a/b"] {
            assert!(ConsumerId::new(name).is_err(), "{name:?} should be invalid");
        }
    }

    #[test]
    fn rejects_overlong_names() {
        let long = "x".repeat(MAX_CONSUMER_ID_LEN + 1);
        assert!(ConsumerId::new(long).is_err());
        let max = "x".repeat(MAX_CONSUMER_ID_LEN);
        assert!(ConsumerId::new(max).is_ok());
    }

    #[test]
    fn serde_validates_on_deserialize() {
        let ok: ConsumerId = serde_json::from_str("\"consumerX\"").unwrap();
        assert_eq!(ok.as_str(), "consumerX");
        assert!(serde_json::from_str::<ConsumerId>("\"bad id\"").is_err());
    }

    #[test]
    fn serializes_as_plain_string() {
        let id = ConsumerId::new("consumerX").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"consumerX\"");
    }
}
