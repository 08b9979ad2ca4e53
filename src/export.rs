//! Result presentation: display formatting, text tables and CSV export.

use crate::error::Result;
use serde_json::Value;
use std::path::Path;
use tracing::info;

const MONEY_COLUMNS: &[&str] = &["salary", "price", "total"];

/// Column names across all rows in first-seen order.
pub fn columns(rows: &[Value]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for row in rows {
        if let Value::Object(map) = row {
            for key in map.keys() {
                if !columns.iter().any(|c| c == key) {
                    columns.push(key.clone());
                }
            }
        }
    }
    columns
}

/// Unformatted cell text; null is empty.
pub fn raw_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Display text for a cell: `$1,234.50` for money columns, `87.3%` for similarity.
pub fn format_cell(column: &str, value: &Value) -> String {
    let column = column.to_lowercase();

    let formatted = if MONEY_COLUMNS.iter().any(|c| column.contains(c)) {
        as_number(value).map(format_currency)
    } else if column.contains("similarity") {
        as_number(value).map(|f| format!("{:.1}%", f * 100.0))
    } else {
        None
    };

    formatted.unwrap_or_else(|| raw_cell(value))
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn format_currency(amount: f64) -> String {
    let fixed = format!("{:.2}", amount.abs());
    let (whole, cents) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let sign = if amount < 0.0 && fixed != "0.00" { "-" } else { "" };
    format!("{}${}.{}", sign, grouped, cents)
}

/// Aligned plain-text table of formatted rows.
pub fn render_table(rows: &[Value]) -> String {
    let columns = columns(rows);
    if columns.is_empty() {
        return String::new();
    }

    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            columns
                .iter()
                .map(|c| format_cell(c, row.get(c).unwrap_or(&Value::Null)))
                .collect()
        })
        .collect();

    let widths: Vec<usize> = columns
        .iter()
        .enumerate()
        .map(|(i, c)| {
            cells
                .iter()
                .map(|row| row[i].chars().count())
                .chain(std::iter::once(c.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let line = |values: &[String]| -> String {
        values
            .iter()
            .zip(widths.iter())
            .map(|(v, w)| format!("{:<width$}", v, width = *w))
            .collect::<Vec<_>>()
            .join(" | ")
            .trim_end()
            .to_string()
    };

    let mut out = Vec::with_capacity(rows.len() + 2);
    out.push(line(&columns));
    out.push(widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>().join("-+-"));
    for row in &cells {
        out.push(line(row));
    }
    out.join("\n")
}

/// Write rows as CSV with a header of every column; values are written unformatted.
pub fn write_csv(rows: &[Value], path: &Path) -> Result<usize> {
    let columns = columns(rows);
    let mut writer = csv::Writer::from_path(path)?;

    if !columns.is_empty() {
        writer.write_record(&columns)?;
    }
    for row in rows {
        let record: Vec<String> = columns
            .iter()
            .map(|c| row.get(c).map(raw_cell).unwrap_or_default())
            .collect();
        writer.write_record(&record)?;
    }
    writer.flush()?;

    info!("Exported {} rows to {}", rows.len(), path.display());
    Ok(rows.len())
}

/// Default export file name, e.g. `search_results_20240101_120000.csv`.
pub fn default_csv_name() -> String {
    format!("search_results_{}.csv", chrono::Local::now().format("%Y%m%d_%H%M%S"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_format_currency() {
        assert_eq!(format_cell("salary", &json!(1234.5)), "$1,234.50");
        assert_eq!(format_cell("order_total", &json!(125000)), "$125,000.00");
        assert_eq!(format_cell("price", &json!(29.99)), "$29.99");
        assert_eq!(format_cell("price", &json!("449.00")), "$449.00");
        assert_eq!(format_cell("total", &json!(-1500)), "-$1,500.00");
    }

    #[test]
    fn test_format_similarity_and_plain() {
        assert_eq!(format_cell("similarity", &json!(0.8734)), "87.3%");
        assert_eq!(format_cell("name", &json!("Laptop")), "Laptop");
        assert_eq!(format_cell("id", &json!(7)), "7");
        assert_eq!(format_cell("salary", &Value::Null), "");
        assert_eq!(format_cell("price", &json!("n/a")), "n/a");
    }

    #[test]
    fn test_columns_union_in_first_seen_order() {
        let rows = vec![json!({"id": 1, "name": "a"}), json!({"id": 2, "email": "x"})];
        assert_eq!(columns(&rows), vec!["id", "name", "email"]);
    }

    #[test]
    fn test_render_table() {
        let rows = vec![json!({"name": "Wireless Mouse", "price": 29.99})];
        let table = render_table(&rows);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("name"));
        assert!(lines[2].contains("$29.99"));
        assert_eq!(render_table(&[]), "");
    }

    #[test]
    fn test_write_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let rows = vec![
            json!({"id": 1, "name": "Alice", "salary": 1234.5}),
            json!({"id": 2, "name": "Bob", "salary": null, "email": "b@x.com"}),
        ];

        assert_eq!(write_csv(&rows, &path).unwrap(), 2);
        let written = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(lines[0], "id,name,salary,email");
        assert_eq!(lines[1], "1,Alice,1234.5,");
        assert_eq!(lines[2], "2,Bob,,b@x.com");
    }

    #[test]
    fn test_default_csv_name() {
        let name = default_csv_name();
        assert!(name.starts_with("search_results_"));
        assert!(name.ends_with(".csv"));
    }
}
