//! Collection/table naming policy
//!
//! One policy shared by every provider: a case transform, an optional
//! pluralization step and optional prefix/suffix. All providers derive the
//! physical name of an entity's collection or table from the same policy so
//! the same data layout is reproducible across storage technologies.

use serde::{Deserialize, Serialize};

/// Case transform applied to the entity type name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameCase {
    /// Keep the type name as written
    Preserve,
    /// Lowercase the whole name
    Lower,
    /// `BlogPost` -> `blog_post`
    Snake,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NamingPolicy {
    pub pluralize: bool,
    pub case: NameCase,
    pub prefix: Option<String>,
    pub suffix: Option<String>,
}

impl Default for NamingPolicy {
    fn default() -> Self {
        Self {
            pluralize: true,
            case: NameCase::Snake,
            prefix: None,
            suffix: None,
        }
    }
}

impl NamingPolicy {
    /// Derive the collection/table name for an entity type name.
    pub fn collection_name(&self, type_name: &str) -> String {
        let cased = match self.case {
            NameCase::Preserve => type_name.to_string(),
            NameCase::Lower => type_name.to_lowercase(),
            NameCase::Snake => to_snake_case(type_name),
        };
        let base = if self.pluralize {
            pluralize_word(&cased)
        } else {
            cased
        };
        let mut name = String::with_capacity(
            base.len()
                + self.prefix.as_deref().map_or(0, str::len)
                + self.suffix.as_deref().map_or(0, str::len),
        );
        if let Some(prefix) = &self.prefix {
            name.push_str(prefix);
        }
        name.push_str(&base);
        if let Some(suffix) = &self.suffix {
            name.push_str(suffix);
        }
        name
    }
}

fn to_snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, c) in name.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Regular English pluralization: sibilant endings take `es`, consonant + `y`
/// becomes `ies`, everything else takes `s`. Irregular nouns are out of scope.
fn pluralize_word(word: &str) -> String {
    let lower = word.to_lowercase();
    if lower.ends_with('s')
        || lower.ends_with('x')
        || lower.ends_with('z')
        || lower.ends_with("ch")
        || lower.ends_with("sh")
    {
        return format!("{word}es");
    }
    if let Some(stem) = word.strip_suffix('y') {
        let before = stem.chars().last();
        if before.is_some_and(|c| !matches!(c.to_ascii_lowercase(), 'a' | 'e' | 'i' | 'o' | 'u')) {
            return format!("{stem}ies");
        }
    }
    format!("{word}s")
}
