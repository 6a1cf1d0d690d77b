//! ドメイン識別子（型付き ID）
//!
//! `AppId` はプラットフォームが採番し、全クラスタオブジェクト名の語幹にもなるため
//! 小文字 ASCII 英字と数字に限定します。`OwnerId` と `DatabaseId` は外部の協調者が
//! 発行する不透明な文字列として扱います。

use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

/// Longest id that still leaves room for `app-{id}-code` inside a 63-char
/// DNS label.
pub const MAX_APP_ID_LEN: usize = 40;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    #[error("app id must not be empty")]
    Empty,

    #[error("app id is longer than {MAX_APP_ID_LEN} characters")]
    TooLong,

    #[error("app id may only contain lowercase letters and digits: {0:?}")]
    InvalidCharacter(String),
}

/// Identifier of an App. Immutable, never reissued.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AppId(String);

impl AppId {
    /// Parse an externally supplied id, enforcing the cluster naming rules.
    pub fn parse(value: impl Into<String>) -> Result<Self, IdError> {
        let value = value.into();
        if value.is_empty() {
            return Err(IdError::Empty);
        }
        if value.len() > MAX_APP_ID_LEN {
            return Err(IdError::TooLong);
        }
        if !value
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        {
            return Err(IdError::InvalidCharacter(value));
        }
        Ok(Self(value))
    }

    /// ULIDs are Crockford base32, so lowercasing yields a valid id.
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid.to_string().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for AppId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<AppId> for String {
    fn from(id: AppId) -> Self {
        id.0
    }
}

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Tenant reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OwnerId(String);

impl OwnerId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Opaque reference to a tenant database, resolved by the credential provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DatabaseId(String);

impl DatabaseId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DatabaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn ulid_ids_are_cluster_safe() {
        let id = AppId::from_ulid(Ulid::new());
        assert_eq!(id.as_str().len(), 26);
        assert!(AppId::parse(id.as_str()).is_ok());
    }

    #[rstest]
    #[case::empty("", IdError::Empty)]
    #[case::upper("MyApp", IdError::InvalidCharacter("MyApp".to_string()))]
    #[case::dash("my-app", IdError::InvalidCharacter("my-app".to_string()))]
    #[case::too_long(&"a".repeat(41), IdError::TooLong)]
    fn rejects_invalid_ids(#[case] raw: &str, #[case] expected: IdError) {
        assert_eq!(AppId::parse(raw).unwrap_err(), expected);
    }

    #[test]
    fn app_id_deserialization_is_validated() {
        let ok: AppId = serde_json::from_str("\"abc123\"").unwrap();
        assert_eq!(ok.as_str(), "abc123");

        let bad: Result<AppId, _> = serde_json::from_str("\"ABC\"");
        assert!(bad.is_err());
    }

    #[test]
    fn ulid_ids_are_sortable() {
        let id1 = AppId::from_ulid(Ulid::new());
        std::thread::sleep(std::time::Duration::from_millis(2));
        let id2 = AppId::from_ulid(Ulid::new());
        assert!(id1 < id2);
    }
}
