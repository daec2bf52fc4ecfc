use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use std::fmt;

use crate::error::ValidationError;

/// Opaque client-chosen user identifier.
///
/// Validated on construction: trimmed and at least [`UserId::MIN_LEN`] characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Minimum accepted length of a user id.
    pub const MIN_LEN: usize = 6;

    /// Parse and validate a raw user id.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::MissingField("userId"));
        }
        if trimmed.chars().count() < Self::MIN_LEN {
            return Err(ValidationError::UserIdTooShort {
                min: Self::MIN_LEN,
            });
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who the user is, as far as the assistant knows.
///
/// One record per user, created on first contact and never deleted.
/// Only the memory manager mutates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    /// Name the user asked to be called by, once learned.
    #[serde(default)]
    pub name: Option<String>,
    /// Last time any activity was recorded for this user.
    pub last_seen_at: DateTime<Utc>,
    /// Short excerpt of what the user last talked about.
    #[serde(default)]
    pub last_topic: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Identity {
    /// Longest topic excerpt kept in `last_topic`.
    pub const TOPIC_MAX_CHARS: usize = 80;

    /// Create a fresh identity for a first-time visitor.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            name: None,
            last_seen_at: now,
            last_topic: None,
            created_at: now,
        }
    }

    /// The known name, if any, ignoring blank values.
    pub fn known_name(&self) -> Option<&str> {
        self.name.as_deref().map(str::trim).filter(|n| !n.is_empty())
    }

    /// Record a topic excerpt, cut to [`Identity::TOPIC_MAX_CHARS`].
    pub fn set_topic(&mut self, text: &str) {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return;
        }
        let excerpt: String = trimmed.chars().take(Self::TOPIC_MAX_CHARS).collect();
        self.last_topic = Some(excerpt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_id_rejects_short() {
        let err = UserId::parse("abc").unwrap_err();
        assert!(matches!(err, ValidationError::UserIdTooShort { min: 6 }));
    }

    #[test]
    fn test_user_id_rejects_blank() {
        let err = UserId::parse("   ").unwrap_err();
        assert!(matches!(err, ValidationError::MissingField("userId")));
    }

    #[test]
    fn test_user_id_trims() {
        let id = UserId::parse("  user-1234 ").unwrap();
        assert_eq!(id.as_str(), "user-1234");
        assert_eq!(id.to_string(), "user-1234");
    }

    #[test]
    fn test_known_name_ignores_blank() {
        let mut identity = Identity::new(Utc::now());
        assert!(identity.known_name().is_none());
        identity.name = Some("  ".to_string());
        assert!(identity.known_name().is_none());
        identity.name = Some("Ava".to_string());
        assert_eq!(identity.known_name(), Some("Ava"));
    }

    #[test]
    fn test_set_topic_truncates() {
        let mut identity = Identity::new(Utc::now());
        identity.set_topic(&"x".repeat(200));
        assert_eq!(
            identity.last_topic.as_deref().map(|t| t.chars().count()),
            Some(Identity::TOPIC_MAX_CHARS)
        );
        identity.set_topic("   ");
        assert!(identity.last_topic.is_some());
    }
}
