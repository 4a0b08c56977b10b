//! Event types: what kind of thing an entry records.
//!
//! An event type is a dotted name such as `security.login.failed`. The first
//! segment is a known [`EventCategory`] (or [`EventCategory::Other`]); the
//! remainder is a free-form action. The canonical text form is what gets
//! hashed, so parsing and display must round-trip exactly.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Top-level category of an audited event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventCategory {
    Mint,
    Education,
    Forge,
    Health,
    Security,
    User,
    System,
    /// Events the ledger emits about itself.
    Ledger,
    /// Any category not known to this build.
    Other(String),
}

impl EventCategory {
    /// Canonical lowercase name.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Mint => "mint",
            Self::Education => "education",
            Self::Forge => "forge",
            Self::Health => "health",
            Self::Security => "security",
            Self::User => "user",
            Self::System => "system",
            Self::Ledger => "ledger",
            Self::Other(name) => name,
        }
    }

    fn from_name(name: &str) -> Self {
        match name {
            "mint" => Self::Mint,
            "education" => Self::Education,
            "forge" => Self::Forge,
            "health" => Self::Health,
            "security" => Self::Security,
            "user" => Self::User,
            "system" => Self::System,
            "ledger" => Self::Ledger,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed event type: category plus optional dotted action.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EventType {
    category: EventCategory,
    action: Option<String>,
}

impl EventType {
    /// Build from a known category and action.
    pub fn new(category: EventCategory, action: impl Into<String>) -> Result<Self, CoreError> {
        let action = action.into();
        Self::parse(&format!("{}.{}", category, action))
    }

    /// Parse a dotted event type name.
    pub fn parse(input: &str) -> Result<Self, CoreError> {
        let invalid = |reason| CoreError::InvalidEventType {
            input: input.to_string(),
            reason,
        };

        if input.is_empty() {
            return Err(invalid("empty"));
        }
        if input.chars().any(char::is_whitespace) {
            return Err(invalid("contains whitespace"));
        }
        if input.split('.').any(str::is_empty) {
            return Err(invalid("empty segment"));
        }

        let (category, action) = match input.split_once('.') {
            Some((category, action)) => (category, Some(action.to_string())),
            None => (input, None),
        };

        Ok(Self {
            category: EventCategory::from_name(category),
            action,
        })
    }

    pub fn category(&self) -> &EventCategory {
        &self.category
    }

    pub fn action(&self) -> Option<&str> {
        self.action.as_deref()
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.action {
            Some(action) => write!(f, "{}.{}", self.category, action),
            None => write!(f, "{}", self.category),
        }
    }
}

impl FromStr for EventType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for EventType {
    type Error = CoreError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<EventType> for String {
    fn from(t: EventType) -> Self {
        t.to_string()
    }
}

/// Event name patterns deciding which incoming events get recorded.
///
/// A pattern is either an exact name, a prefix wildcard (`security.*`,
/// matching anything below `security.`), or `*`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFilter {
    patterns: Vec<String>,
}

impl EventFilter {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            patterns: patterns.into_iter().map(Into::into).collect(),
        }
    }

    /// Filter accepting every event.
    pub fn all() -> Self {
        Self::new(["*"])
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn matches(&self, event_type: &EventType) -> bool {
        let name = event_type.to_string();
        self.patterns.iter().any(|pattern| match pattern.strip_suffix('*') {
            Some("") => true,
            Some(prefix) => name.starts_with(prefix) && name.len() > prefix.len(),
            None => *pattern == name,
        })
    }
}

impl Default for EventFilter {
    fn default() -> Self {
        Self::new([
            "mint.transaction.*",
            "education.enrollment.*",
            "forge.service.*",
            "health.check.*",
            "security.*",
            "user.*",
            "system.*",
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_category() {
        let t = EventType::parse("security.login.failed").unwrap();
        assert_eq!(t.category(), &EventCategory::Security);
        assert_eq!(t.action(), Some("login.failed"));
        assert_eq!(t.to_string(), "security.login.failed");
    }

    #[test]
    fn test_parse_unknown_category_roundtrips() {
        let t = EventType::parse("billing.invoice.paid").unwrap();
        assert_eq!(t.category(), &EventCategory::Other("billing".into()));
        assert_eq!(t.to_string(), "billing.invoice.paid");
    }

    #[test]
    fn test_parse_bare_category() {
        let t = EventType::parse("heartbeat").unwrap();
        assert_eq!(t.action(), None);
        assert_eq!(t.to_string(), "heartbeat");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in ["", ".login", "user.", "user..x", "user login"] {
            assert!(EventType::parse(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn test_new_from_category() {
        let t = EventType::new(EventCategory::Mint, "transaction.created").unwrap();
        assert_eq!(t.to_string(), "mint.transaction.created");
    }

    #[test]
    fn test_default_filter() {
        let filter = EventFilter::default();
        let accept = |s: &str| filter.matches(&EventType::parse(s).unwrap());

        assert!(accept("security.login.failed"));
        assert!(accept("mint.transaction.created"));
        assert!(accept("user.signup"));
        assert!(!accept("mint.balance.checked"));
        assert!(!accept("user"));
        assert!(!accept("billing.invoice.paid"));
    }

    #[test]
    fn test_exact_and_wildcard_patterns() {
        let filter = EventFilter::new(["ledger.validation.request"]);
        assert!(filter.matches(&EventType::parse("ledger.validation.request").unwrap()));
        assert!(!filter.matches(&EventType::parse("ledger.validation").unwrap()));

        assert!(EventFilter::all().matches(&EventType::parse("anything").unwrap()));
    }

    #[test]
    fn test_serde_as_string() {
        let t = EventType::parse("health.check.ok").unwrap();
        let json = serde_json::to_string(&t).unwrap();
        assert_eq!(json, "\"health.check.ok\"");
        let back: EventType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, t);
        assert!(serde_json::from_str::<EventType>("\"\"").is_err());
    }
}
