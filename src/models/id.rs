use serde::{Deserialize, Serialize};
use std::fmt;

/// Parent value that marks a top-level account.
pub const ROOT_SENTINEL: &str = "root";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("Invalid account id {value:?}: ids must be non-empty and not the reserved \"root\"")]
pub struct IdError {
    value: String,
}

/// Opaque account identifier assigned by the bookkeeping store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id(String);

impl Id {
    /// Create an ID from an arbitrary string.
    pub fn from_string(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Create an ID, rejecting values that cannot name an account.
    pub fn from_string_checked(value: impl Into<String>) -> Result<Self, IdError> {
        let value = value.into();
        if Self::is_valid(&value) {
            Ok(Self(value))
        } else {
            Err(IdError { value })
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_valid(value: &str) -> bool {
        let trimmed = value.trim();
        !trimmed.is_empty() && !trimmed.eq_ignore_ascii_case(ROOT_SENTINEL)
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for Id {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Id {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl AsRef<str> for Id {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_string_keeps_value() {
        let id = Id::from_string("account-id-123");
        assert_eq!(id.as_str(), "account-id-123");
    }

    #[test]
    fn test_from_string_checked_rejects_reserved_values() {
        assert!(Id::from_string_checked("").is_err());
        assert!(Id::from_string_checked("   ").is_err());
        assert!(Id::from_string_checked("root").is_err());
        assert!(Id::from_string_checked("ROOT").is_err());
        assert!(Id::from_string_checked("42").is_ok());
    }
}
