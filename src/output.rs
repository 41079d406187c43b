use crate::error::{ReportError, Result};
use serde::Serialize;
use std::fs;
use std::path::Path;
use tabled::{settings::Style, Table, Tabled};

pub fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    for r in rows {
        wtr.serialize(r)?;
    }
    wtr.flush().map_err(|e| ReportError::io(path, e))?;
    Ok(())
}

/// Pretty-print `value` to `path`, creating the parent directory.
///
/// The document is written to a sibling `.tmp` file first and renamed into
/// place, so a crash mid-write leaves the previous file untouched.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(|e| ReportError::io(dir, e))?;
    }
    let s = serde_json::to_string_pretty(value).map_err(|e| ReportError::json(path, e))?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, s).map_err(|e| ReportError::io(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| ReportError::io(path, e))?;
    Ok(())
}

pub fn preview_table<T>(title: &str, note: Option<&str>, rows: &[T], max_rows: usize)
where
    T: Tabled + Clone,
{
    println!("{}", title);
    if let Some(n) = note {
        println!("({})", n);
    }
    println!();
    preview_table_rows(rows, max_rows);
}

pub fn preview_table_rows<T>(rows: &[T], max_rows: usize)
where
    T: Tabled + Clone,
{
    let slice: Vec<T> = rows.iter().take(max_rows).cloned().collect();
    if slice.is_empty() {
        println!("(no rows)\n");
        return;
    }
    let table_str = Table::new(slice).with(Style::markdown()).to_string();
    println!("{}\n", table_str);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GroupRankingRow;
    use serde_json::json;

    #[test]
    fn json_write_creates_directory_and_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.json");

        write_json(&path, &json!({"a": 1})).unwrap();
        write_json(&path, &json!({"b": 2})).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(serde_json::from_str::<serde_json::Value>(&text).unwrap(), json!({"b": 2}));
        assert!(text.contains('\n'), "artifact should be pretty-printed");
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn csv_has_renamed_headers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("groups.csv");
        let rows = vec![GroupRankingRow {
            rank: 1,
            name: "health".into(),
            title: "Health".into(),
            total: "£1,500".into(),
            benefit_count: 1,
        }];
        write_csv(&path, &rows).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("Rank,Group,Title,Total,Benefits\n"));
        assert!(text.contains("\"£1,500\""));
    }
}
