//! Sort clauses and the shared value ordering
//!
//! Clauses apply in list order. Ascending places nulls first, descending
//! places them last; every provider reproduces this placement. Ties beyond
//! the clause list fall to the provider's natural order, with the identifier
//! as the final tie-break so the same input data orders identically across
//! providers.

use std::cmp::Ordering;

use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn to_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Single (key, direction) sort clause
#[derive(Debug, Clone, PartialEq)]
pub struct SortClause {
    pub field: String,
    pub order: SortOrder,
}

impl SortClause {
    pub fn asc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            order: SortOrder::Asc,
        }
    }

    pub fn desc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            order: SortOrder::Desc,
        }
    }
}

/// Total order over serialized field values used by the in-memory providers.
///
/// Within a type: numbers compare numerically, strings lexicographically,
/// booleans false before true. Across types a fixed rank applies
/// (null < number < string < bool < array < object), mirroring the type
/// bracketing of the remote stores closely enough that single-typed columns
/// order identically everywhere.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Number(_) => 1,
            Value::String(_) => 2,
            Value::Bool(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }

    match (a, b) {
        (Value::Number(_), Value::Number(_)) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

/// Apply sort clauses to serialized documents (stable, clause order).
pub fn sort_documents(docs: &mut [Value], clauses: &[SortClause]) {
    docs.sort_by(|a, b| {
        for clause in clauses {
            let av = a.get(&clause.field).unwrap_or(&Value::Null);
            let bv = b.get(&clause.field).unwrap_or(&Value::Null);
            let ord = compare_values(av, bv);
            let ord = match clause.order {
                SortOrder::Asc => ord,
                SortOrder::Desc => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn single_ascending_key_is_non_decreasing() {
        let mut docs = vec![json!({"n": 3}), json!({"n": 1}), json!({"n": 10})];
        sort_documents(&mut docs, &[SortClause::asc("n")]);
        let keys: Vec<i64> = docs.iter().map(|d| d["n"].as_i64().unwrap()).collect();
        assert_eq!(keys, vec![1, 3, 10]);
    }

    #[test]
    fn nulls_first_ascending_last_descending() {
        let mut docs = vec![json!({"n": 2}), json!({}), json!({"n": 1})];
        sort_documents(&mut docs, &[SortClause::asc("n")]);
        assert!(docs[0].get("n").is_none());

        sort_documents(&mut docs, &[SortClause::desc("n")]);
        assert!(docs[2].get("n").is_none());
        assert_eq!(docs[0]["n"], json!(2));
    }

    #[test]
    fn clauses_apply_in_list_order() {
        let mut docs = vec![
            json!({"group": "b", "n": 1}),
            json!({"group": "a", "n": 2}),
            json!({"group": "a", "n": 1}),
        ];
        sort_documents(
            &mut docs,
            &[SortClause::asc("group"), SortClause::desc("n")],
        );
        assert_eq!(docs[0], json!({"group": "a", "n": 2}));
        assert_eq!(docs[1], json!({"group": "a", "n": 1}));
        assert_eq!(docs[2], json!({"group": "b", "n": 1}));
    }
}
