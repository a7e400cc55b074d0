use std::fmt;

use regex::Regex;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::browser::StorageSnapshot;

const TOKEN_FIELD: &str = "access_token";

/// An opaque session token. Never printed in full.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Option<Self> {
        let token = token.into();
        if token.is_empty() {
            None
        } else {
            Some(Self(token))
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    /// First 12 hex chars of the token's SHA-256, safe for logs.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.0.as_bytes());
        let mut hex = hex::encode(digest);
        hex.truncate(12);
        hex
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Credential")
            .field(&format_args!("sha256:{}", self.fingerprint()))
            .finish()
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sha256:{}", self.fingerprint())
    }
}

/// Finds the storage entry holding the session token.
///
/// A key matches when it contains the pattern or matches it as a regular
/// expression. When several keys match, the one enumerated last wins; the
/// page tends to append the freshest login record.
#[derive(Debug, Clone)]
pub struct TokenExtractor {
    pattern: String,
    regex: Option<Regex>,
}

impl TokenExtractor {
    pub fn new(pattern: impl Into<String>) -> Self {
        let pattern = pattern.into();
        let regex = match Regex::new(&pattern) {
            Ok(regex) => Some(regex),
            Err(err) => {
                warn!(%pattern, error = %err, "token key pattern is not a valid regex; using substring match only");
                None
            }
        };
        Self { pattern, regex }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn matches(&self, key: &str) -> bool {
        key.contains(&self.pattern)
            || self
                .regex
                .as_ref()
                .map(|regex| regex.is_match(key))
                .unwrap_or(false)
    }

    pub fn extract(&self, snapshot: &StorageSnapshot) -> Option<Credential> {
        let (key, value) = snapshot.iter().rev().find(|(key, _)| self.matches(key))?;
        let credential = parse_token(value);
        match &credential {
            Some(found) => debug!(key, fingerprint = %found.fingerprint(), "token entry parsed"),
            None => debug!(key, "matching storage entry carries no usable token"),
        }
        credential
    }
}

pub fn extract(snapshot: &StorageSnapshot, pattern: &str) -> Option<Credential> {
    TokenExtractor::new(pattern).extract(snapshot)
}

fn parse_token(raw: &str) -> Option<Credential> {
    let value: Value = serde_json::from_str(raw).ok()?;
    let token = value.as_object()?.get(TOKEN_FIELD)?.as_str()?;
    Credential::new(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage(entries: &[(&str, &str)]) -> StorageSnapshot {
        entries.iter().copied().collect()
    }

    #[test]
    fn later_matching_key_wins() {
        let snapshot = storage(&[
            ("6172:web_token:login:auth", r#"{"access_token":"old"}"#),
            ("theme", "dark"),
            ("9001:web_token:login:auth", r#"{"access_token":"new"}"#),
        ]);
        let credential = extract(&snapshot, "auth").unwrap();
        assert_eq!(credential.expose(), "new");
    }

    #[test]
    fn invalid_json_is_not_found() {
        let snapshot = storage(&[("x:web_token:login:auth", "{not json")]);
        assert!(extract(&snapshot, ":web_token:login:auth").is_none());
    }

    #[test]
    fn last_match_is_not_skipped_when_unusable() {
        let snapshot = storage(&[
            ("a:auth", r#"{"access_token":"good"}"#),
            ("b:auth", r#"{"access_token":""}"#),
        ]);
        assert!(extract(&snapshot, "auth").is_none());
    }

    #[test]
    fn rejects_non_object_and_non_string_tokens() {
        assert!(parse_token(r#"["access_token"]"#).is_none());
        assert!(parse_token(r#"{"access_token":42}"#).is_none());
        assert!(parse_token(r#"{"token":"abc"}"#).is_none());
        assert_eq!(
            parse_token(r#"{"access_token":"abc","expires":0}"#)
                .unwrap()
                .expose(),
            "abc"
        );
    }

    #[test]
    fn regex_and_substring_both_match() {
        let extractor = TokenExtractor::new(r"^\d+:web_token");
        assert!(extractor.matches("123:web_token:login:auth"));
        assert!(!extractor.matches("web_token:123"));

        let broken = TokenExtractor::new("web_token(");
        assert!(broken.matches("x:web_token(:y"));
        assert!(!broken.matches("web_token"));
    }

    #[test]
    fn no_match_is_not_found() {
        let snapshot = storage(&[("theme", "dark")]);
        assert!(extract(&snapshot, "auth").is_none());
        assert!(extract(&StorageSnapshot::new(), "auth").is_none());
    }

    #[test]
    fn credential_formatting_hides_token() {
        let credential = Credential::new("super-secret-token").unwrap();
        let shown = format!("{credential} {credential:?}");
        assert!(!shown.contains("super-secret-token"));
        assert_eq!(credential.fingerprint().len(), 12);
        assert!(Credential::new("").is_none());
    }
}
