//! Filter and sort translation to BSON
//!
//! MongoDB's comparison operators already type-bracket (a `$gt` against a
//! number never matches a string) and treat missing fields as null, so most
//! of the reference semantics of [`Filter::matches`] hold natively. The
//! exceptions are `Ne`/`NotIn`, which in MongoDB would match documents
//! missing the field entirely; an explicit not-null conjunct restores the
//! reference behavior.

use mongodb::bson::{doc, Bson, Document};
use repo_core::{BoolOp, CompareOp, Filter, SortClause, SortOrder, StoreError, ValidatedFieldName};
use serde_json::Value;

/// A filter document matching every record
pub fn match_all() -> Document {
    doc! {}
}

/// A filter document matching no record
pub fn match_none() -> Document {
    doc! { "$nor": [ {} ] }
}

/// Render a filter tree into a BSON filter document.
pub fn render_filter(filter: &Filter) -> Result<Document, StoreError> {
    match filter {
        Filter::Group { op, filters } => {
            if filters.is_empty() {
                return Ok(match op {
                    BoolOp::And => match_all(),
                    BoolOp::Or => match_none(),
                });
            }
            let parts = filters
                .iter()
                .map(render_filter)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(match op {
                BoolOp::And => doc! { "$and": parts },
                BoolOp::Or => doc! { "$or": parts },
            })
        }
        Filter::Condition { field, op, value } => render_condition(field, op, value),
    }
}

fn render_condition(
    field: &str,
    op: &CompareOp,
    value: &Option<Value>,
) -> Result<Document, StoreError> {
    let field = ValidatedFieldName::new(field)?;
    let field = field.as_str();
    let not_null = doc! { field: { "$ne": Bson::Null } };

    match op {
        CompareOp::IsNull => Ok(doc! { field: Bson::Null }),
        CompareOp::IsNotNull => Ok(not_null),
        CompareOp::Eq => match value {
            Some(v) if !v.is_null() => Ok(doc! { field: { "$eq": to_bson(v)? } }),
            _ => Ok(match_none()),
        },
        CompareOp::Ne => match value {
            Some(v) if !v.is_null() => Ok(doc! {
                "$and": [ not_null, doc! { field: { "$ne": to_bson(v)? } } ]
            }),
            _ => Ok(match_none()),
        },
        CompareOp::Gt | CompareOp::Gte | CompareOp::Lt | CompareOp::Lte => match value {
            Some(v) if !v.is_null() => {
                let cmp = match op {
                    CompareOp::Gt => "$gt",
                    CompareOp::Gte => "$gte",
                    CompareOp::Lt => "$lt",
                    CompareOp::Lte => "$lte",
                    _ => unreachable!(),
                };
                Ok(doc! { field: { cmp: to_bson(v)? } })
            }
            _ => Ok(match_none()),
        },
        CompareOp::Contains => match value {
            Some(Value::String(needle)) => Ok(doc! {
                field: { "$regex": regex_escape(needle) }
            }),
            _ => Ok(match_none()),
        },
        CompareOp::In => match value {
            Some(Value::Array(candidates)) if !candidates.is_empty() => {
                let values = candidates.iter().map(to_bson).collect::<Result<Vec<_>, _>>()?;
                Ok(doc! { field: { "$in": values } })
            }
            _ => Ok(match_none()),
        },
        CompareOp::NotIn => match value {
            Some(Value::Array(candidates)) => {
                if candidates.is_empty() {
                    return Ok(not_null);
                }
                let values = candidates.iter().map(to_bson).collect::<Result<Vec<_>, _>>()?;
                Ok(doc! {
                    "$and": [ not_null, doc! { field: { "$nin": values } } ]
                })
            }
            _ => Ok(match_none()),
        },
    }
}

/// Render sort clauses into the driver's sort document, identifier tie-break
/// appended. Document field order carries the clause order.
pub fn render_sort(clauses: &[SortClause]) -> Result<Document, StoreError> {
    let mut sort = Document::new();
    for clause in clauses {
        let field = ValidatedFieldName::new(&clause.field)?;
        let direction = match clause.order {
            SortOrder::Asc => 1_i32,
            SortOrder::Desc => -1_i32,
        };
        sort.insert(field.as_str(), direction);
    }
    sort.insert("_id", 1_i32);
    Ok(sort)
}

fn to_bson(value: &Value) -> Result<Bson, StoreError> {
    mongodb::bson::to_bson(value).map_err(|e| StoreError::serialization("filter", e))
}

/// Escape regex metacharacters so `Contains` is a literal substring match.
fn regex_escape(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len() + 4);
    for c in needle.chars() {
        if !c.is_ascii_alphanumeric() {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
