//! Filter and sort translation to PostgreSQL
//!
//! The generated SQL reproduces the reference semantics of
//! [`Filter::matches`]: comparisons against missing or null fields never
//! match, mixed-type comparisons never match (guarded with `jsonb_typeof`),
//! and ascending sorts place nulls first. Field names are validated before
//! they reach the SQL text; values travel as `$n` parameters.

use repo_core::{BoolOp, CompareOp, Filter, SortClause, SortOrder, StoreError, ValidatedFieldName};
use serde_json::Value;

/// A bound parameter for the generated SQL
#[derive(Debug, Clone)]
pub enum SqlParam {
    /// Bound as JSONB
    Json(Value),
    /// Bound as text (substring probes)
    Text(String),
}

/// WHERE fragment plus its parameters, placeholders numbered from the
/// requested start index.
#[derive(Debug, Clone)]
pub struct SqlFilter {
    pub clause: String,
    pub params: Vec<SqlParam>,
}

/// Render a filter tree into a parenthesized SQL boolean expression.
pub fn render_filter(filter: &Filter, start_index: usize) -> Result<SqlFilter, StoreError> {
    let mut params = Vec::new();
    let mut next = start_index;
    let clause = render_node(filter, &mut params, &mut next)?;
    Ok(SqlFilter { clause, params })
}

fn render_node(
    filter: &Filter,
    params: &mut Vec<SqlParam>,
    next: &mut usize,
) -> Result<String, StoreError> {
    match filter {
        Filter::Group { op, filters } => {
            if filters.is_empty() {
                // empty AND is vacuously true, empty OR matches nothing
                return Ok(match op {
                    BoolOp::And => "TRUE".to_string(),
                    BoolOp::Or => "FALSE".to_string(),
                });
            }
            let joiner = match op {
                BoolOp::And => " AND ",
                BoolOp::Or => " OR ",
            };
            let parts = filters
                .iter()
                .map(|f| render_node(f, params, next))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(format!("({})", parts.join(joiner)))
        }
        Filter::Condition { field, op, value } => render_condition(field, op, value, params, next),
    }
}

fn render_condition(
    field: &str,
    op: &CompareOp,
    value: &Option<Value>,
    params: &mut Vec<SqlParam>,
    next: &mut usize,
) -> Result<String, StoreError> {
    let field = ValidatedFieldName::new(field)?;
    let accessor = format!("doc->'{field}'");
    let not_null = format!("({accessor} IS NOT NULL AND {accessor} <> 'null'::jsonb)");

    fn bind_json(value: &Value, params: &mut Vec<SqlParam>, next: &mut usize) -> String {
        params.push(SqlParam::Json(value.clone()));
        let placeholder = format!("${next}");
        *next += 1;
        placeholder
    }

    match op {
        CompareOp::IsNull => Ok(format!(
            "({accessor} IS NULL OR {accessor} = 'null'::jsonb)"
        )),
        CompareOp::IsNotNull => Ok(not_null),
        CompareOp::Eq => match value {
            Some(v) if !v.is_null() => {
                let p = bind_json(v, params, next);
                Ok(format!("{accessor} = {p}"))
            }
            _ => Ok("FALSE".to_string()),
        },
        CompareOp::Ne => match value {
            Some(v) if !v.is_null() => {
                let p = bind_json(v, params, next);
                Ok(format!("({not_null} AND {accessor} <> {p})"))
            }
            _ => Ok("FALSE".to_string()),
        },
        CompareOp::Gt | CompareOp::Gte | CompareOp::Lt | CompareOp::Lte => match value {
            Some(v) if !v.is_null() => {
                let p = bind_json(v, params, next);
                let cmp = match op {
                    CompareOp::Gt => ">",
                    CompareOp::Gte => ">=",
                    CompareOp::Lt => "<",
                    CompareOp::Lte => "<=",
                    _ => unreachable!(),
                };
                // same placeholder twice: the type guard rejects mixed-type
                // comparisons the way the in-memory evaluator does
                Ok(format!(
                    "(jsonb_typeof({accessor}) = jsonb_typeof({p}) AND {accessor} {cmp} {p})"
                ))
            }
            _ => Ok("FALSE".to_string()),
        },
        CompareOp::Contains => match value {
            Some(Value::String(needle)) => {
                params.push(SqlParam::Text(needle.clone()));
                let p = format!("${next}");
                *next += 1;
                Ok(format!(
                    "(jsonb_typeof({accessor}) = 'string' AND position({p} in doc->>'{field}') > 0)"
                ))
            }
            _ => Ok("FALSE".to_string()),
        },
        CompareOp::In => match value {
            Some(Value::Array(candidates)) if !candidates.is_empty() => {
                let placeholders = candidates
                    .iter()
                    .map(|c| bind_json(c, params, next))
                    .collect::<Vec<_>>()
                    .join(", ");
                Ok(format!("{accessor} IN ({placeholders})"))
            }
            _ => Ok("FALSE".to_string()),
        },
        CompareOp::NotIn => match value {
            Some(Value::Array(candidates)) => {
                if candidates.is_empty() {
                    return Ok(not_null);
                }
                let placeholders = candidates
                    .iter()
                    .map(|c| bind_json(c, params, next))
                    .collect::<Vec<_>>()
                    .join(", ");
                Ok(format!(
                    "({not_null} AND {accessor} NOT IN ({placeholders}))"
                ))
            }
            _ => Ok("FALSE".to_string()),
        },
    }
}

/// Render an ORDER BY clause: clauses in list order, nulls first ascending /
/// last descending, identifier as the final tie-break.
pub fn render_order_by(clauses: &[SortClause]) -> Result<String, StoreError> {
    let mut items = Vec::with_capacity(clauses.len() + 1);
    for clause in clauses {
        let field = ValidatedFieldName::new(&clause.field)?;
        let placement = match clause.order {
            SortOrder::Asc => "NULLS FIRST",
            SortOrder::Desc => "NULLS LAST",
        };
        items.push(format!(
            "doc->'{field}' {} {placement}",
            clause.order.to_sql()
        ));
    }
    items.push("id ASC".to_string());
    Ok(format!("ORDER BY {}", items.join(", ")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn renders_parameterized_comparison() {
        let rendered = render_filter(&Filter::eq("status", json!("published")), 1).unwrap();
        assert_eq!(rendered.clause, "doc->'status' = $1");
        assert_eq!(rendered.params.len(), 1);
    }

    #[test]
    fn placeholder_numbering_continues_across_conditions() {
        let filter = Filter::and(vec![
            Filter::gt("views", json!(10)),
            Filter::in_values("status", vec![json!("a"), json!("b")]),
        ]);
        let rendered = render_filter(&filter, 2).unwrap();
        assert!(rendered.clause.contains("$2"));
        assert!(rendered.clause.contains("IN ($3, $4)"));
        assert_eq!(rendered.params.len(), 3);
    }

    #[test]
    fn comparison_carries_type_guard() {
        let rendered = render_filter(&Filter::gt("views", json!(10)), 1).unwrap();
        assert_eq!(
            rendered.clause,
            "(jsonb_typeof(doc->'views') = jsonb_typeof($1) AND doc->'views' > $1)"
        );
        // the guard reuses the same placeholder, one bound value
        assert_eq!(rendered.params.len(), 1);
    }

    #[test]
    fn null_semantics_match_reference() {
        let rendered = render_filter(&Filter::is_null("summary"), 1).unwrap();
        assert_eq!(
            rendered.clause,
            "(doc->'summary' IS NULL OR doc->'summary' = 'null'::jsonb)"
        );

        let rendered = render_filter(&Filter::ne("summary", json!("x")), 1).unwrap();
        assert!(rendered.clause.contains("IS NOT NULL"));
        assert!(rendered.clause.contains("<> 'null'::jsonb"));

        // comparing to an explicit null never matches
        let rendered = render_filter(&Filter::eq("summary", json!(null)), 1).unwrap();
        assert_eq!(rendered.clause, "FALSE");
    }

    #[test]
    fn empty_groups_and_empty_in() {
        let rendered = render_filter(&Filter::and(vec![]), 1).unwrap();
        assert_eq!(rendered.clause, "TRUE");
        let rendered = render_filter(&Filter::or(vec![]), 1).unwrap();
        assert_eq!(rendered.clause, "FALSE");
        let rendered = render_filter(&Filter::in_values("status", vec![]), 1).unwrap();
        assert_eq!(rendered.clause, "FALSE");
        let rendered = render_filter(&Filter::not_in_values("status", vec![]), 1).unwrap();
        assert!(rendered.clause.contains("IS NOT NULL"));
    }

    #[test]
    fn rejects_unsafe_field_names() {
        let filter = Filter::eq("status'; drop table articles; --", json!("x"));
        assert!(render_filter(&filter, 1).is_err());
    }

    #[test]
    fn order_by_with_null_placement_and_tiebreak() {
        let clause = render_order_by(&[
            SortClause::asc("title"),
            SortClause::desc("views"),
        ])
        .unwrap();
        assert_eq!(
            clause,
            "ORDER BY doc->'title' ASC NULLS FIRST, doc->'views' DESC NULLS LAST, id ASC"
        );
    }
}
