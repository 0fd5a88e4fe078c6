//! Query — the declarative aggregation model and its constructors.
//!
//! One `QuerySpec` per labeled report section. Specs are fixed for the
//! lifetime of a run: the invocation mode picks the constructors once,
//! and the store derives its column schema from the union of fields the
//! specs reference.

use thiserror::Error;

use crate::record::filter::{Predicate, PredicateError};

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("empty query expression")]
    Empty,

    #[error("invalid query expression: {0}")]
    Parse(String),

    #[error("unknown order-by column '{column}' (expected one of: {available})")]
    UnknownOrderBy { column: String, available: String },

    #[error(transparent)]
    Having(#[from] PredicateError),
}

/// One output column of a query.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnExpr {
    /// A plain field, carried through per group (first row wins).
    Field(String),
    /// Row count of the group.
    Count,
    /// Numeric average over the group; non-numeric values are ignored.
    Avg(String),
    Sum(String),
    Min(String),
    Max(String),
    /// Count of rows whose integer field equals `value` (status-class
    /// buckets: `status_type == 2` labeled `2xx`, and so on).
    CountIfEq { field: String, value: i64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutputColumn {
    pub name: String,
    pub expr: ColumnExpr,
}

impl OutputColumn {
    fn new(name: impl Into<String>, expr: ColumnExpr) -> Self {
        Self {
            name: name.into(),
            expr,
        }
    }
}

/// A labeled, declarative aggregation over the store's row set.
#[derive(Debug, Clone)]
pub struct QuerySpec {
    pub label: String,
    pub group_by: Vec<String>,
    pub columns: Vec<OutputColumn>,
    pub having: Predicate,
    /// Output column to sort by; ties keep insertion order.
    pub order_by: Option<String>,
    pub ascending: bool,
    pub limit: Option<usize>,
}

impl QuerySpec {
    fn bare(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            group_by: Vec::new(),
            columns: Vec::new(),
            having: Predicate::True,
            order_by: None,
            ascending: false,
            limit: None,
        }
    }

    /// Every store field this query reads, in declaration order.
    pub fn fields(&self) -> Vec<&str> {
        let mut fields: Vec<&str> = Vec::new();
        for f in &self.group_by {
            if !fields.contains(&f.as_str()) {
                fields.push(f);
            }
        }
        for column in &self.columns {
            let field = match &column.expr {
                ColumnExpr::Field(f)
                | ColumnExpr::Avg(f)
                | ColumnExpr::Sum(f)
                | ColumnExpr::Min(f)
                | ColumnExpr::Max(f) => Some(f.as_str()),
                ColumnExpr::CountIfEq { field, .. } => Some(field.as_str()),
                ColumnExpr::Count => None,
            };
            if let Some(f) = field {
                if !fields.contains(&f) {
                    fields.push(f);
                }
            }
        }
        fields
    }

    /// Distinct rows of the given fields.
    pub fn print(fields: &[String]) -> Self {
        let mut spec = Self::bare(format!("{}:", fields.join(", ")));
        spec.group_by = fields.to_vec();
        spec.columns = fields
            .iter()
            .map(|f| OutputColumn::new(f.clone(), ColumnExpr::Field(f.clone())))
            .collect();
        spec
    }

    /// Top-N values of one field by row count, descending.
    pub fn top(field: &str, limit: usize) -> Self {
        let mut spec = Self::bare(format!("top {field}"));
        spec.group_by = vec![field.to_string()];
        spec.columns = vec![
            OutputColumn::new(field, ColumnExpr::Field(field.to_string())),
            OutputColumn::new("count", ColumnExpr::Count),
        ];
        spec.order_by = Some("count".to_string());
        spec.limit = Some(limit);
        spec
    }

    /// Single-row averages of the given fields.
    pub fn avg(fields: &[String]) -> Self {
        let mut spec = Self::bare(format!("average {}", fields.join(", ")));
        spec.columns = fields
            .iter()
            .map(|f| OutputColumn::new(format!("avg({f})"), ColumnExpr::Avg(f.clone())))
            .collect();
        spec
    }

    /// Single-row sums of the given fields.
    pub fn sum(fields: &[String]) -> Self {
        let mut spec = Self::bare(format!("sum {}", fields.join(", ")));
        spec.columns = fields
            .iter()
            .map(|f| OutputColumn::new(format!("sum({f})"), ColumnExpr::Sum(f.clone())))
            .collect();
        spec
    }

    /// Parse a raw aggregation expression:
    ///
    /// ```text
    /// sel[, sel...] [group by FIELD] [having PRED]
    ///               [order by COLUMN [asc|desc]] [limit N]
    /// ```
    ///
    /// where `sel` is `field`, `count(1)`, or
    /// `avg|sum|min|max(field) [as name]`.
    pub fn parse(label: &str, expr: &str) -> Result<Self, QueryError> {
        let expr = expr.trim();
        if expr.is_empty() {
            return Err(QueryError::Empty);
        }

        let clauses = split_clauses(expr)?;
        let mut spec = Self::bare(label);

        spec.columns = clauses
            .select
            .split(',')
            .map(parse_select_item)
            .collect::<Result<Vec<_>, _>>()?;
        if spec.columns.is_empty() {
            return Err(QueryError::Parse("no selected columns".to_string()));
        }

        if let Some(group) = clauses.group_by {
            let field = group.trim();
            if !is_identifier(field) {
                return Err(QueryError::Parse(format!(
                    "'{field}' is not a valid group-by field"
                )));
            }
            spec.group_by = vec![field.to_string()];
        }

        if let Some(having) = clauses.having {
            spec.having = Predicate::parse(having)?;
        }

        if let Some(order) = clauses.order_by {
            let mut tokens = order.split_whitespace();
            let column = tokens
                .next()
                .ok_or_else(|| QueryError::Parse("empty order-by clause".to_string()))?;
            spec.ascending = match tokens.next() {
                None => false,
                Some(t) if t.eq_ignore_ascii_case("asc") => true,
                Some(t) if t.eq_ignore_ascii_case("desc") => false,
                Some(t) => {
                    return Err(QueryError::Parse(format!(
                        "expected 'asc' or 'desc', found '{t}'"
                    )))
                }
            };
            spec.order_by = Some(column.to_string());
            spec.check_order_by()?;
        }

        if let Some(limit) = clauses.limit {
            let n = limit.trim().parse::<usize>().map_err(|_| {
                QueryError::Parse(format!("'{}' is not a valid limit", limit.trim()))
            })?;
            spec.limit = Some(n);
        }

        Ok(spec)
    }

    fn check_order_by(&self) -> Result<(), QueryError> {
        let Some(order_by) = &self.order_by else {
            return Ok(());
        };
        if self.columns.iter().any(|c| &c.name == order_by) {
            return Ok(());
        }
        Err(QueryError::UnknownOrderBy {
            column: order_by.clone(),
            available: self
                .columns
                .iter()
                .map(|c| c.name.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        })
    }
}

/// The default report pair: an ungrouped traffic summary, then the same
/// aggregates grouped by one field with having/order/limit applied.
pub fn default_queries(
    group_by: &str,
    having: Predicate,
    order_by: &str,
    limit: usize,
) -> Result<Vec<QuerySpec>, QueryError> {
    let summary_columns = vec![
        OutputColumn::new("count", ColumnExpr::Count),
        OutputColumn::new("avg_bytes_sent", ColumnExpr::Avg("bytes_sent".to_string())),
        OutputColumn::new(
            "2xx",
            ColumnExpr::CountIfEq {
                field: "status_type".to_string(),
                value: 2,
            },
        ),
        OutputColumn::new(
            "3xx",
            ColumnExpr::CountIfEq {
                field: "status_type".to_string(),
                value: 3,
            },
        ),
        OutputColumn::new(
            "4xx",
            ColumnExpr::CountIfEq {
                field: "status_type".to_string(),
                value: 4,
            },
        ),
        OutputColumn::new(
            "5xx",
            ColumnExpr::CountIfEq {
                field: "status_type".to_string(),
                value: 5,
            },
        ),
    ];

    let mut summary = QuerySpec::bare("Summary:");
    summary.columns = summary_columns.clone();

    let mut detailed = QuerySpec::bare("Detailed:");
    detailed.group_by = vec![group_by.to_string()];
    detailed.columns = Vec::with_capacity(summary_columns.len() + 1);
    detailed
        .columns
        .push(OutputColumn::new(group_by, ColumnExpr::Field(group_by.to_string())));
    detailed.columns.extend(summary_columns);
    detailed.having = having;
    detailed.order_by = Some(order_by.to_string());
    detailed.limit = Some(limit);
    detailed.check_order_by()?;

    Ok(vec![summary, detailed])
}

struct Clauses<'a> {
    select: &'a str,
    group_by: Option<&'a str>,
    having: Option<&'a str>,
    order_by: Option<&'a str>,
    limit: Option<&'a str>,
}

/// Split the expression on its clause keywords. Keywords must appear in
/// grammar order.
fn split_clauses(expr: &str) -> Result<Clauses<'_>, QueryError> {
    let lower = expr.to_ascii_lowercase();
    let markers = ["group by", "having", "order by", "limit"];
    let mut positions: Vec<Option<(usize, usize)>> = Vec::with_capacity(markers.len());

    let mut previous_end = 0;
    for marker in markers {
        match find_keyword(&lower, marker) {
            Some(start) => {
                if start < previous_end {
                    return Err(QueryError::Parse(format!(
                        "'{marker}' clause is out of order"
                    )));
                }
                positions.push(Some((start, start + marker.len())));
                previous_end = start + marker.len();
            }
            None => positions.push(None),
        }
    }

    let select_end = positions
        .iter()
        .flatten()
        .map(|(start, _)| *start)
        .min()
        .unwrap_or(expr.len());

    let clause_text = |idx: usize| -> Option<&str> {
        let (_, body_start) = positions[idx]?;
        let body_end = positions
            .iter()
            .skip(idx + 1)
            .flatten()
            .map(|(start, _)| *start)
            .min()
            .unwrap_or(expr.len());
        Some(expr[body_start..body_end].trim())
    };

    Ok(Clauses {
        select: expr[..select_end].trim(),
        group_by: clause_text(0),
        having: clause_text(1),
        order_by: clause_text(2),
        limit: clause_text(3),
    })
}

/// Find a keyword (possibly multi-word) bounded by whitespace.
fn find_keyword(lower: &str, keyword: &str) -> Option<usize> {
    let mut search = 0;
    while let Some(found) = lower[search..].find(keyword) {
        let pos = search + found;
        let before_ok = pos == 0 || lower.as_bytes()[pos - 1].is_ascii_whitespace();
        let end = pos + keyword.len();
        let after_ok = end >= lower.len() || lower.as_bytes()[end].is_ascii_whitespace();
        if before_ok && after_ok {
            return Some(pos);
        }
        search = end;
    }
    None
}

fn parse_select_item(item: &str) -> Result<OutputColumn, QueryError> {
    let item = item.trim();
    if item.is_empty() {
        return Err(QueryError::Parse("empty selected column".to_string()));
    }

    // Optional trailing alias: `expr as name`.
    let lower = item.to_ascii_lowercase();
    let (expr_text, alias) = match find_keyword(&lower, "as") {
        Some(pos) => {
            let alias = item[pos + 2..].trim();
            if !is_identifier(alias) {
                return Err(QueryError::Parse(format!("'{alias}' is not a valid alias")));
            }
            (item[..pos].trim(), Some(alias.to_string()))
        }
        None => (item, None),
    };

    if let Some(open) = expr_text.find('(') {
        if !expr_text.ends_with(')') {
            return Err(QueryError::Parse(format!(
                "unterminated function call in '{expr_text}'"
            )));
        }
        let func = expr_text[..open].trim().to_ascii_lowercase();
        let arg = expr_text[open + 1..expr_text.len() - 1].trim();

        if func == "count" {
            if arg != "1" && arg != "*" {
                return Err(QueryError::Parse(format!(
                    "count takes '1' or '*', found '{arg}'"
                )));
            }
            return Ok(OutputColumn::new(
                alias.unwrap_or_else(|| "count".to_string()),
                ColumnExpr::Count,
            ));
        }

        if !is_identifier(arg) {
            return Err(QueryError::Parse(format!(
                "'{arg}' is not a valid field name"
            )));
        }
        let expr = match func.as_str() {
            "avg" => ColumnExpr::Avg(arg.to_string()),
            "sum" => ColumnExpr::Sum(arg.to_string()),
            "min" => ColumnExpr::Min(arg.to_string()),
            "max" => ColumnExpr::Max(arg.to_string()),
            other => {
                return Err(QueryError::Parse(format!(
                    "unknown aggregate function '{other}'"
                )))
            }
        };
        return Ok(OutputColumn::new(
            alias.unwrap_or_else(|| format!("{func}({arg})")),
            expr,
        ));
    }

    if !is_identifier(expr_text) {
        return Err(QueryError::Parse(format!(
            "'{expr_text}' is not a valid field name"
        )));
    }
    Ok(OutputColumn::new(
        alias.unwrap_or_else(|| expr_text.to_string()),
        ColumnExpr::Field(expr_text.to_string()),
    ))
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_top_spec_shape() {
        let spec = QuerySpec::top("request_path", 10);
        assert_eq!(spec.label, "top request_path");
        assert_eq!(spec.group_by, vec!["request_path"]);
        assert_eq!(spec.order_by.as_deref(), Some("count"));
        assert_eq!(spec.limit, Some(10));
        assert!(!spec.ascending);
    }

    #[test]
    fn test_fields_union_in_order() {
        let queries =
            default_queries("request_path", Predicate::True, "count", 10).expect("valid defaults");
        assert_eq!(queries[0].fields(), vec!["bytes_sent", "status_type"]);
        assert_eq!(
            queries[1].fields(),
            vec!["request_path", "bytes_sent", "status_type"]
        );
    }

    #[test]
    fn test_default_queries_reject_unknown_order_by() {
        let err = default_queries("request_path", Predicate::True, "nope", 10)
            .expect_err("unknown order-by should fail");
        assert!(matches!(err, QueryError::UnknownOrderBy { .. }));
    }

    #[test]
    fn test_parse_full_expression() {
        let spec = QuerySpec::parse(
            "report:",
            "request_path, count(1), avg(bytes_sent) as avg_bytes \
             group by request_path having count > 10 order by count desc limit 5",
        )
        .expect("expression parses");
        assert_eq!(spec.group_by, vec!["request_path"]);
        assert_eq!(spec.columns.len(), 3);
        assert_eq!(spec.columns[1].name, "count");
        assert_eq!(spec.columns[2].name, "avg_bytes");
        assert_eq!(
            spec.columns[2].expr,
            ColumnExpr::Avg("bytes_sent".to_string())
        );
        assert_eq!(spec.order_by.as_deref(), Some("count"));
        assert_eq!(spec.limit, Some(5));
    }

    #[test]
    fn test_parse_ascending_order() {
        let spec = QuerySpec::parse("r", "remote_addr, count(1) order by count asc")
            .expect("expression parses");
        assert!(spec.ascending);
    }

    #[test]
    fn test_parse_default_aggregate_names() {
        let spec = QuerySpec::parse("r", "sum(bytes_sent), min(request_time)")
            .expect("expression parses");
        assert_eq!(spec.columns[0].name, "sum(bytes_sent)");
        assert_eq!(spec.columns[1].name, "min(request_time)");
    }

    #[test]
    fn test_parse_errors_are_descriptive() {
        let err = QuerySpec::parse("r", "frob(bytes_sent)").expect_err("unknown function");
        assert!(err.to_string().contains("frob"));

        let err = QuerySpec::parse("r", "count(1) order by nothing").expect_err("unknown column");
        assert!(err.to_string().contains("nothing"));

        let err = QuerySpec::parse("r", "").expect_err("empty expression");
        assert!(matches!(err, QueryError::Empty));

        let err =
            QuerySpec::parse("r", "count(1) limit many").expect_err("bad limit");
        assert!(err.to_string().contains("many"));
    }

    #[test]
    fn test_parse_clause_order_enforced() {
        let err = QuerySpec::parse("r", "count(1) limit 5 group by request_path")
            .expect_err("clauses out of order");
        assert!(err.to_string().contains("out of order"));
    }

    #[test]
    fn test_print_spec_groups_all_fields() {
        let spec = QuerySpec::print(&["status".to_string(), "request_path".to_string()]);
        assert_eq!(spec.label, "status, request_path:");
        assert_eq!(spec.group_by, vec!["status", "request_path"]);
        assert_eq!(spec.columns.len(), 2);
    }
}
