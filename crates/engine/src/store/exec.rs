//! Exec — hand-rolled columnar aggregation over the store's row set.
//!
//! Groups are kept in first-seen order so ordering ties resolve by
//! insertion order; the sort below is stable.

use std::collections::HashMap;

use crate::record::model::Value;
use crate::store::query::{ColumnExpr, OutputColumn, QuerySpec};

/// One executed query: ordered headers and computed rows.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl ResultTable {
    fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }
}

#[derive(Debug)]
enum Acc {
    Count(u64),
    Avg { sum: f64, n: u64 },
    Sum { total: f64, n: u64, all_int: bool },
    Min { best: Option<f64>, all_int: bool },
    Max { best: Option<f64>, all_int: bool },
    CountIf { hits: u64, value: i64 },
    First(Option<Value>),
}

impl Acc {
    fn new(expr: &ColumnExpr) -> Self {
        match expr {
            ColumnExpr::Count => Acc::Count(0),
            ColumnExpr::Avg(_) => Acc::Avg { sum: 0.0, n: 0 },
            ColumnExpr::Sum(_) => Acc::Sum {
                total: 0.0,
                n: 0,
                all_int: true,
            },
            ColumnExpr::Min(_) => Acc::Min {
                best: None,
                all_int: true,
            },
            ColumnExpr::Max(_) => Acc::Max {
                best: None,
                all_int: true,
            },
            ColumnExpr::CountIfEq { value, .. } => Acc::CountIf {
                hits: 0,
                value: *value,
            },
            ColumnExpr::Field(_) => Acc::First(None),
        }
    }

    fn feed(&mut self, value: Option<&Value>) {
        match self {
            Acc::Count(n) => *n += 1,
            Acc::Avg { sum, n } => {
                if let Some(v) = value.and_then(Value::as_f64) {
                    *sum += v;
                    *n += 1;
                }
            }
            Acc::Sum { total, n, all_int } => {
                if let Some(v) = value.and_then(Value::as_f64) {
                    *total += v;
                    *n += 1;
                    *all_int &= matches!(value, Some(Value::Int(_)));
                }
            }
            Acc::Min { best, all_int } => {
                if let Some(v) = value.and_then(Value::as_f64) {
                    *best = Some(best.map_or(v, |b: f64| b.min(v)));
                    *all_int &= matches!(value, Some(Value::Int(_)));
                }
            }
            Acc::Max { best, all_int } => {
                if let Some(v) = value.and_then(Value::as_f64) {
                    *best = Some(best.map_or(v, |b: f64| b.max(v)));
                    *all_int &= matches!(value, Some(Value::Int(_)));
                }
            }
            Acc::CountIf { hits, value: want } => {
                if value.and_then(Value::as_i64) == Some(*want) {
                    *hits += 1;
                }
            }
            Acc::First(slot) => {
                if slot.is_none() {
                    *slot = Some(value.cloned().unwrap_or(Value::Null));
                }
            }
        }
    }

    fn finish(self) -> Value {
        match self {
            Acc::Count(n) => Value::Int(n as i64),
            Acc::Avg { sum, n } => {
                if n > 0 {
                    Value::Float(sum / n as f64)
                } else {
                    Value::Null
                }
            }
            Acc::Sum { total, n, all_int } => numeric(total, n, all_int),
            Acc::Min { best, all_int } => match best {
                Some(v) => numeric(v, 1, all_int),
                None => Value::Null,
            },
            Acc::Max { best, all_int } => match best {
                Some(v) => numeric(v, 1, all_int),
                None => Value::Null,
            },
            Acc::CountIf { hits, .. } => Value::Int(hits as i64),
            Acc::First(slot) => slot.unwrap_or(Value::Null),
        }
    }
}

fn numeric(value: f64, n: u64, all_int: bool) -> Value {
    if n == 0 {
        Value::Null
    } else if all_int {
        Value::Int(value as i64)
    } else {
        Value::Float(value)
    }
}

struct Group {
    accs: Vec<Acc>,
}

/// Execute one query against the current rows.
pub fn execute(query: &QuerySpec, schema: &[String], rows: &[Vec<Value>]) -> ResultTable {
    let index_of = |name: &str| schema.iter().position(|c| c == name);

    let column_indices: Vec<Option<usize>> = query
        .columns
        .iter()
        .map(|c| source_field(c).and_then(index_of))
        .collect();
    let group_indices: Vec<Option<usize>> = query
        .group_by
        .iter()
        .map(|f| index_of(f))
        .collect();

    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Group> = HashMap::new();

    // An ungrouped query always yields exactly one row, even over an
    // empty window (count = 0, averages null).
    if query.group_by.is_empty() {
        order.push(String::new());
        groups.insert(String::new(), new_group(&query.columns));
    }

    for row in rows {
        let key = group_key(&group_indices, row);
        let group = groups.entry(key.clone()).or_insert_with(|| {
            order.push(key);
            new_group(&query.columns)
        });
        for (acc, idx) in group.accs.iter_mut().zip(&column_indices) {
            acc.feed(idx.and_then(|i| row.get(i)));
        }
    }

    let headers: Vec<String> = query.columns.iter().map(|c| c.name.clone()).collect();
    let mut result = ResultTable {
        headers,
        rows: Vec::with_capacity(order.len()),
    };

    for key in &order {
        let Some(group) = groups.remove(key) else {
            continue;
        };
        let computed: Vec<Value> = group.accs.into_iter().map(Acc::finish).collect();
        let passes = query.having.eval(|name| {
            result
                .column(name)
                .and_then(|i| computed.get(i))
                .cloned()
        });
        if passes {
            result.rows.push(computed);
        }
    }

    if let Some(order_by) = &query.order_by {
        if let Some(sort_col) = result.column(order_by) {
            // Stable: equal keys keep first-seen (insertion) order.
            result.rows.sort_by(|a, b| {
                let ord = a[sort_col].compare(&b[sort_col]);
                if query.ascending {
                    ord
                } else {
                    ord.reverse()
                }
            });
        }
    }

    if let Some(limit) = query.limit {
        result.rows.truncate(limit);
    }

    result
}

fn new_group(columns: &[OutputColumn]) -> Group {
    Group {
        accs: columns.iter().map(|c| Acc::new(&c.expr)).collect(),
    }
}

fn source_field(column: &OutputColumn) -> Option<&str> {
    match &column.expr {
        ColumnExpr::Field(f)
        | ColumnExpr::Avg(f)
        | ColumnExpr::Sum(f)
        | ColumnExpr::Min(f)
        | ColumnExpr::Max(f) => Some(f),
        ColumnExpr::CountIfEq { field, .. } => Some(field),
        ColumnExpr::Count => None,
    }
}

// Group keys join the rendered parts with an unlikely separator; the
// first row of a group supplies the displayed values.
fn group_key(group_indices: &[Option<usize>], row: &[Value]) -> String {
    let mut key = String::new();
    for idx in group_indices {
        match idx.and_then(|i| row.get(i)) {
            Some(v) => key.push_str(&v.to_string()),
            None => key.push('\u{0}'),
        }
        key.push('\u{1f}');
    }
    key
}
