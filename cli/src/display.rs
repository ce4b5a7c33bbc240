//! 终端表格输出

use serde_json::Value;
use tablegate::Row;

const CELL_WIDTH: usize = 20;

/// 把结果渲染成定宽表格
///
/// 每列 20 个字符、列间一个空格，值截断到 19 个字符，NULL 显示为 `NULL`。
/// 列取自第一行。
pub fn render_table(title: &str, rows: &[Row]) -> String {
    let mut out = format!("\n=== Table: {} ===\n", title);
    let Some(first) = rows.first() else {
        out.push_str("No records found.\n\n");
        return out;
    };

    let columns: Vec<&String> = first.keys().collect();
    let rule = "─".repeat(columns.len() * (CELL_WIDTH + 1));

    let header: Vec<String> = columns.iter().map(|c| pad(c)).collect();
    out.push_str(&header.join(" "));
    out.push('\n');
    out.push_str(&rule);
    out.push('\n');

    for row in rows {
        let line: Vec<String> = columns
            .iter()
            .map(|column| {
                let text = row.get(*column).map(value_text).unwrap_or_else(|| "NULL".to_string());
                pad(&text.chars().take(CELL_WIDTH - 1).collect::<String>())
            })
            .collect();
        out.push_str(&line.join(" "));
        out.push('\n');
    }

    out.push_str(&rule);
    out.push('\n');
    out.push_str(&format!("Total records: {}\n\n", rows.len()));
    out
}

/// 单行记录的 `column = value` 列表
pub fn render_row(row: &Row) -> String {
    row.iter()
        .map(|(column, value)| format!("  {} = {}\n", column, value_text(value)))
        .collect()
}

fn value_text(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn pad(text: &str) -> String {
    format!("{:<width$}", text, width = CELL_WIDTH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_render_table() {
        let rows = vec![
            row(json!({"id": 1, "name": "John", "notes": null})),
            row(json!({"id": 2, "name": "a".repeat(30), "notes": "ok"})),
        ];
        let out = render_table("records", &rows);
        let lines: Vec<&str> = out.lines().collect();

        assert_eq!(lines[0], "");
        assert_eq!(lines[1], "=== Table: records ===");
        assert_eq!(lines[2], format!("{:<20} {:<20} {:<20}", "id", "name", "notes"));
        assert_eq!(lines[3], "─".repeat(63));
        assert_eq!(lines[4], format!("{:<20} {:<20} {:<20}", "1", "John", "NULL"));
        // 超长的值截断到 19 个字符，最后一列后面没有多余的空格
        assert_eq!(lines[5], format!("{:<20} {:<20} {:<20}", "2", "a".repeat(19), "ok"));
        assert_eq!(lines[6], "─".repeat(63));
        assert_eq!(lines[7], "Total records: 2");
        assert!(out.ends_with("Total records: 2\n\n"));
    }

    #[test]
    fn test_render_empty() {
        let out = render_table("records (Filtered)", &[]);
        assert_eq!(out, "\n=== Table: records (Filtered) ===\nNo records found.\n\n");
    }

    #[test]
    fn test_render_row() {
        let out = render_row(&row(json!({"id": 7, "name": "John"})));
        assert_eq!(out, "  id = 7\n  name = John\n");
    }
}
