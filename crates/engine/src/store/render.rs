//! Render — executed queries to text tables.

use comfy_table::{presets, Table};

use crate::store::exec::ResultTable;

/// Render one result as a markdown-style table, floats to three
/// decimals, nulls as `-`.
pub fn table(result: &ResultTable) -> String {
    let mut table = Table::new();
    table.load_preset(presets::ASCII_MARKDOWN);
    table.set_header(result.headers.clone());
    for row in &result.rows {
        table.add_row(row.iter().map(ToString::to_string));
    }
    table.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::model::Value;

    #[test]
    fn test_table_has_headers_and_rows() {
        let result = ResultTable {
            headers: vec!["request_path".to_string(), "count".to_string()],
            rows: vec![
                vec![Value::Str("/a".into()), Value::Int(3)],
                vec![Value::Str("/b".into()), Value::Int(1)],
            ],
        };
        let rendered = table(&result);
        assert!(rendered.contains("request_path"));
        assert!(rendered.contains("/a"));
        assert!(rendered.contains("3"));
    }

    #[test]
    fn test_floats_render_three_decimals_and_nulls_dash() {
        let result = ResultTable {
            headers: vec!["avg_bytes_sent".to_string(), "min(request_time)".to_string()],
            rows: vec![vec![Value::Float(12.5), Value::Null]],
        };
        let rendered = table(&result);
        assert!(rendered.contains("12.500"));
        assert!(rendered.contains('-'));
    }
}
