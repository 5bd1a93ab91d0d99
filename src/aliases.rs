//! Aliases

use chrono::naive::NaiveDateTime;
use unicode_normalization::UnicodeNormalization;

use crate::errors::CoreError;

/// Shortest accepted custom alias
pub const MIN_ALIAS_LENGTH: usize = 3;

/// Longest accepted alias
pub const MAX_ALIAS_LENGTH: usize = 50;

/// Words an alias may never be
///
/// Covers the active route names plus a handful of paths crawlers and
/// browsers request on their own.
pub const RESERVED_ALIASES: &[&str] = &[
    "api",
    "app",
    "admin",
    "assets",
    "favicon.ico",
    "health",
    "login",
    "logout",
    "metrics",
    "robots.txt",
    "static",
];

/// Alias for a link
#[derive(Clone, Debug)]
pub struct Alias {
    /// The short name, canonicalized to lower-case
    pub alias: String,

    /// Free-form description
    pub description: String,

    /// Soft-deleted at
    pub deleted_at: Option<NaiveDateTime>,
}

impl Alias {
    /// Is the alias soft-deleted?
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Canonicalize an alias for storage and comparison
///
/// Aliases are matched case-insensitively; everything past the HTTP surface
/// only ever sees this lower-cased, NFKC-normalized form.
pub fn canonicalize(alias: &str) -> String {
    alias.nfkc().collect::<String>().to_lowercase()
}

/// Validate a custom alias, returning its canonical form
///
/// Checks length bounds, the restricted charset and the reserved words.
/// Collisions with existing aliases are not checked here; the storage
/// unique-constraint signal is the canonical source for those.
pub fn validate(alias: &str) -> Result<String, CoreError> {
    let alias = canonicalize(alias);

    if alias.len() < MIN_ALIAS_LENGTH {
        return Err(CoreError::BadAlias(format!(
            "must be at least {MIN_ALIAS_LENGTH} characters"
        )));
    }

    if alias.len() > MAX_ALIAS_LENGTH {
        return Err(CoreError::BadAlias(format!(
            "must be at most {MAX_ALIAS_LENGTH} characters"
        )));
    }

    if !alias
        .chars()
        .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || matches!(ch, '-' | '_' | '.'))
    {
        return Err(CoreError::BadAlias(
            "only letters, digits, '-', '_' and '.' are allowed".to_string(),
        ));
    }

    if is_reserved(&alias) {
        return Err(CoreError::BadAlias(format!(r#""{alias}" is reserved"#)));
    }

    Ok(alias)
}

/// Is this (canonical) alias a reserved word or an active route name?
pub fn is_reserved(alias: &str) -> bool {
    RESERVED_ALIASES.contains(&alias)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonicalize_lowercases() {
        assert_eq!(canonicalize("MyAlias"), "myalias");
        assert_eq!(canonicalize("already-lower"), "already-lower");
    }

    #[test]
    fn test_validate_accepts_simple_aliases() {
        assert_eq!(validate("docs").unwrap(), "docs");
        assert_eq!(validate("My-Link_2.0").unwrap(), "my-link_2.0");
    }

    #[test]
    fn test_validate_rejects_bad_charset() {
        assert!(validate("with space").is_err());
        assert!(validate("with/slash").is_err());
        assert!(validate("with?query").is_err());
    }

    #[test]
    fn test_validate_rejects_length_bounds() {
        assert!(validate("ab").is_err());
        assert!(validate(&"a".repeat(MAX_ALIAS_LENGTH + 1)).is_err());
    }

    #[test]
    fn test_validate_rejects_reserved_words() {
        assert!(validate("api").is_err());
        assert!(validate("ADMIN").is_err());
    }
}
