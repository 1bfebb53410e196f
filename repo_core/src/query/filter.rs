//! Filter predicate tree
//!
//! Filters are a small tagged-variant AST over serialized entity fields, so
//! every provider can pattern-match and translate them without reflection.
//! The null-handling contract lives in [`Filter::matches`]: a comparison
//! against a missing or null field never matches (only `IsNull` does), and
//! `Ne`/`NotIn` therefore exclude null fields too. Translators must preserve
//! exactly this behavior.

use serde_json::Value;

/// Comparison operators over a single field
#[derive(Debug, Clone, PartialEq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    /// Substring match on string fields
    Contains,
    In,
    NotIn,
    IsNull,
    IsNotNull,
}

/// Logical combinators for condition groups
#[derive(Debug, Clone, PartialEq)]
pub enum BoolOp {
    And,
    Or,
}

/// Filter tree that can be nested
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Condition {
        field: String,
        op: CompareOp,
        value: Option<Value>,
    },
    Group {
        op: BoolOp,
        filters: Vec<Filter>,
    },
}

impl Filter {
    pub fn condition(field: &str, op: CompareOp, value: Option<Value>) -> Self {
        Self::Condition {
            field: field.to_string(),
            op,
            value,
        }
    }

    pub fn and(filters: Vec<Filter>) -> Self {
        Self::Group {
            op: BoolOp::And,
            filters,
        }
    }

    pub fn or(filters: Vec<Filter>) -> Self {
        Self::Group {
            op: BoolOp::Or,
            filters,
        }
    }

    pub fn eq(field: &str, value: Value) -> Self {
        Self::condition(field, CompareOp::Eq, Some(value))
    }

    pub fn ne(field: &str, value: Value) -> Self {
        Self::condition(field, CompareOp::Ne, Some(value))
    }

    pub fn gt(field: &str, value: Value) -> Self {
        Self::condition(field, CompareOp::Gt, Some(value))
    }

    pub fn gte(field: &str, value: Value) -> Self {
        Self::condition(field, CompareOp::Gte, Some(value))
    }

    pub fn lt(field: &str, value: Value) -> Self {
        Self::condition(field, CompareOp::Lt, Some(value))
    }

    pub fn lte(field: &str, value: Value) -> Self {
        Self::condition(field, CompareOp::Lte, Some(value))
    }

    pub fn contains(field: &str, needle: &str) -> Self {
        Self::condition(
            field,
            CompareOp::Contains,
            Some(Value::String(needle.to_string())),
        )
    }

    pub fn in_values(field: &str, values: Vec<Value>) -> Self {
        Self::condition(field, CompareOp::In, Some(Value::Array(values)))
    }

    pub fn not_in_values(field: &str, values: Vec<Value>) -> Self {
        Self::condition(field, CompareOp::NotIn, Some(Value::Array(values)))
    }

    pub fn is_null(field: &str) -> Self {
        Self::condition(field, CompareOp::IsNull, None)
    }

    pub fn is_not_null(field: &str) -> Self {
        Self::condition(field, CompareOp::IsNotNull, None)
    }

    /// Reference in-memory evaluation against a serialized entity.
    pub fn matches(&self, doc: &Value) -> bool {
        match self {
            Filter::Group { op, filters } => match op {
                BoolOp::And => filters.iter().all(|f| f.matches(doc)),
                BoolOp::Or => filters.iter().any(|f| f.matches(doc)),
            },
            Filter::Condition { field, op, value } => {
                let present = doc.get(field).filter(|v| !v.is_null());
                match op {
                    CompareOp::IsNull => present.is_none(),
                    CompareOp::IsNotNull => present.is_some(),
                    CompareOp::Eq => match (present, value) {
                        (Some(actual), Some(expected)) if !expected.is_null() => {
                            json_eq(actual, expected)
                        }
                        _ => false,
                    },
                    CompareOp::Ne => match (present, value) {
                        (Some(actual), Some(expected)) if !expected.is_null() => {
                            !json_eq(actual, expected)
                        }
                        _ => false,
                    },
                    CompareOp::Gt | CompareOp::Gte | CompareOp::Lt | CompareOp::Lte => {
                        let (Some(actual), Some(expected)) = (present, value.as_ref()) else {
                            return false;
                        };
                        let Some(ord) = same_type_cmp(actual, expected) else {
                            return false;
                        };
                        match op {
                            CompareOp::Gt => ord.is_gt(),
                            CompareOp::Gte => ord.is_ge(),
                            CompareOp::Lt => ord.is_lt(),
                            CompareOp::Lte => ord.is_le(),
                            _ => unreachable!(),
                        }
                    }
                    CompareOp::Contains => match (present, value) {
                        (Some(Value::String(haystack)), Some(Value::String(needle))) => {
                            haystack.contains(needle.as_str())
                        }
                        _ => false,
                    },
                    CompareOp::In => match (present, value) {
                        (Some(actual), Some(Value::Array(candidates))) => {
                            candidates.iter().any(|c| json_eq(actual, c))
                        }
                        _ => false,
                    },
                    CompareOp::NotIn => match (present, value) {
                        (Some(actual), Some(Value::Array(candidates))) => {
                            !candidates.iter().any(|c| json_eq(actual, c))
                        }
                        _ => false,
                    },
                }
            }
        }
    }
}

/// JSON equality with numeric normalization (`1` equals `1.0`).
pub(crate) fn json_eq(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

/// Compare two values of the same JSON type; `None` for mixed types, which
/// comparison conditions treat as "does not match".
fn same_type_cmp(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc() -> Value {
        json!({
            "title": "Getting Started",
            "views": 42,
            "rating": 4.5,
            "draft": false,
            "summary": null
        })
    }

    #[test]
    fn eq_and_ne() {
        assert!(Filter::eq("title", json!("Getting Started")).matches(&doc()));
        assert!(!Filter::eq("title", json!("Other")).matches(&doc()));
        assert!(Filter::ne("views", json!(7)).matches(&doc()));
        assert!(!Filter::ne("views", json!(42)).matches(&doc()));
    }

    #[test]
    fn numeric_normalization() {
        assert!(Filter::eq("views", json!(42.0)).matches(&doc()));
        assert!(Filter::gte("rating", json!(4)).matches(&doc()));
    }

    #[test]
    fn null_and_missing_fields_never_compare() {
        // summary is null, missing_field is absent: comparisons do not match
        for field in ["summary", "missing_field"] {
            assert!(!Filter::eq(field, json!("x")).matches(&doc()));
            assert!(!Filter::ne(field, json!("x")).matches(&doc()));
            assert!(!Filter::gt(field, json!(1)).matches(&doc()));
            assert!(!Filter::not_in_values(field, vec![json!("x")]).matches(&doc()));
            assert!(Filter::is_null(field).matches(&doc()));
            assert!(!Filter::is_not_null(field).matches(&doc()));
        }
    }

    #[test]
    fn mixed_type_comparisons_do_not_match() {
        assert!(!Filter::gt("title", json!(1)).matches(&doc()));
        assert!(!Filter::lt("views", json!("zzz")).matches(&doc()));
        assert!(!Filter::contains("views", "4").matches(&doc()));
    }

    #[test]
    fn contains_is_substring() {
        assert!(Filter::contains("title", "Start").matches(&doc()));
        assert!(!Filter::contains("title", "start").matches(&doc()));
    }

    #[test]
    fn in_and_not_in() {
        assert!(Filter::in_values("views", vec![json!(1), json!(42)]).matches(&doc()));
        assert!(!Filter::in_values("views", vec![]).matches(&doc()));
        assert!(Filter::not_in_values("views", vec![json!(1)]).matches(&doc()));
        assert!(Filter::not_in_values("views", vec![]).matches(&doc()));
    }

    #[test]
    fn group_combinators_short_circuit_semantics() {
        let both = Filter::and(vec![
            Filter::eq("draft", json!(false)),
            Filter::gt("views", json!(10)),
        ]);
        assert!(both.matches(&doc()));

        let either = Filter::or(vec![
            Filter::eq("draft", json!(true)),
            Filter::gt("views", json!(10)),
        ]);
        assert!(either.matches(&doc()));

        // empty groups: AND is vacuously true, OR matches nothing
        assert!(Filter::and(vec![]).matches(&doc()));
        assert!(!Filter::or(vec![]).matches(&doc()));
    }

    #[test]
    fn nested_groups() {
        let filter = Filter::and(vec![
            Filter::or(vec![
                Filter::eq("title", json!("Getting Started")),
                Filter::eq("title", json!("Other")),
            ]),
            Filter::is_null("summary"),
        ]);
        assert!(filter.matches(&doc()));
    }
}
