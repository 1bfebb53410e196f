//! Identifier validation
//!
//! Collection/table names and filter field names end up inside generated SQL
//! and document field paths. Every name coming from outside passes through
//! these types before a provider interpolates it anywhere.

use std::fmt;

use thiserror::Error;

/// Validation errors for store identifiers
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// Only alphanumeric characters and underscores are allowed
    #[error("invalid characters in name '{0}': only alphanumeric characters and underscores are allowed")]
    InvalidCharacters(String),
    /// PostgreSQL limits identifiers to 63 bytes
    #[error("name '{name}' is too long: {length} characters (max {max_length})")]
    TooLong {
        name: String,
        length: usize,
        max_length: usize,
    },
    #[error("name cannot be empty")]
    Empty,
    /// Must start with a letter or underscore
    #[error("name '{0}' must start with a letter or underscore")]
    InvalidStartCharacter(String),
    #[error("name '{0}' is a reserved SQL keyword")]
    ReservedKeyword(String),
}

/// PostgreSQL identifier length limit
const MAX_IDENTIFIER_LENGTH: usize = 63;

const RESERVED_KEYWORDS: &[&str] = &[
    "all", "and", "any", "as", "asc", "between", "by", "case", "cast", "check", "column",
    "constraint", "create", "cross", "current", "default", "delete", "desc", "distinct", "drop",
    "else", "end", "exists", "false", "from", "full", "grant", "group", "having", "in", "inner",
    "insert", "into", "is", "join", "left", "like", "limit", "not", "null", "offset", "on", "or",
    "order", "outer", "primary", "references", "right", "select", "set", "table", "then", "to",
    "true", "union", "unique", "update", "user", "using", "values", "when", "where", "with",
];

fn validate_identifier(name: &str) -> Result<(), ValidationError> {
    let Some(first) = name.chars().next() else {
        return Err(ValidationError::Empty);
    };
    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(ValidationError::TooLong {
            name: name.to_string(),
            length: name.len(),
            max_length: MAX_IDENTIFIER_LENGTH,
        });
    }
    if !first.is_ascii_alphabetic() && first != '_' {
        return Err(ValidationError::InvalidStartCharacter(name.to_string()));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ValidationError::InvalidCharacters(name.to_string()));
    }
    if RESERVED_KEYWORDS.contains(&name.to_ascii_lowercase().as_str()) {
        return Err(ValidationError::ReservedKeyword(name.to_string()));
    }
    Ok(())
}

/// A validated table/collection name that is safe to use in SQL
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ValidatedTableName(String);

impl ValidatedTableName {
    pub fn new(name: &str) -> Result<Self, ValidationError> {
        validate_identifier(name)?;
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ValidatedTableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A validated field name that is safe to use in SQL and document paths
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ValidatedFieldName(String);

impl ValidatedFieldName {
    pub fn new(name: &str) -> Result<Self, ValidationError> {
        validate_identifier(name)?;
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ValidatedFieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_identifiers() {
        assert!(ValidatedTableName::new("articles").is_ok());
        assert!(ValidatedFieldName::new("published_at").is_ok());
        assert!(ValidatedFieldName::new("_hidden").is_ok());
        assert!(ValidatedFieldName::new("tag2").is_ok());
    }

    #[test]
    fn rejects_empty_and_oversized() {
        assert_eq!(ValidatedFieldName::new(""), Err(ValidationError::Empty));
        let long = "a".repeat(64);
        assert!(matches!(
            ValidatedFieldName::new(&long),
            Err(ValidationError::TooLong { .. })
        ));
    }

    #[test]
    fn rejects_injection_shapes() {
        assert!(ValidatedFieldName::new("name; drop table users").is_err());
        assert!(ValidatedFieldName::new("doc->>'x'").is_err());
        assert!(ValidatedFieldName::new("a b").is_err());
        assert!(ValidatedFieldName::new("1st").is_err());
    }

    #[test]
    fn rejects_reserved_keywords() {
        assert_eq!(
            ValidatedFieldName::new("select"),
            Err(ValidationError::ReservedKeyword("select".to_string()))
        );
        assert_eq!(
            ValidatedTableName::new("WHERE"),
            Err(ValidationError::ReservedKeyword("WHERE".to_string()))
        );
    }
}
