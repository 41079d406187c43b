use crate::config::{DataPaths, THEMES_FILE};
use crate::error::{ReportError, Result};
use crate::types::RawDisclosureFile;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

static DDMMYY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{2})(\d{2})(\d{2})$").expect("ddmmyy"));
static TRAILING_YEAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|\s)(\d{4})$").expect("trailing year"));

/// One parsed raw file together with the year it reports on.
#[derive(Debug, Clone)]
pub struct YearFile {
    pub path: PathBuf,
    pub year: i32,
    pub raw: RawDisclosureFile,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    pub files: usize,
    pub groups: usize,
    pub benefit_lines: usize,
}

/// Resolve a publication date to its report year.
///
/// Accepts a strict `DDMMYY` token (`"200520"` is 20 May 2020) or free text
/// ending in a four-digit year (`"4 May 2022"`). Everything else fails.
pub fn parse_publication_year(value: &str) -> Result<i32> {
    let trimmed = value.trim();
    let invalid = || ReportError::InvalidDate {
        value: value.to_string(),
    };

    if let Some(caps) = DDMMYY.captures(trimmed) {
        let day: u32 = caps[1].parse().map_err(|_| invalid())?;
        let month: u32 = caps[2].parse().map_err(|_| invalid())?;
        let yy: i32 = caps[3].parse().map_err(|_| invalid())?;
        let year = 2000 + yy;
        // A six-digit token that is not a real date is more likely a typo
        // than a report, so refuse it rather than guess the year.
        NaiveDate::from_ymd_opt(year, month, day).ok_or_else(invalid)?;
        return Ok(year);
    }

    let caps = TRAILING_YEAR.captures(trimmed).ok_or_else(invalid)?;
    caps[1].parse().map_err(|_| invalid())
}

/// All raw disclosure files in `raw_dir`, in lexical filename order.
pub fn list_raw_files(raw_dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(raw_dir).map_err(|e| ReportError::io(raw_dir, e))?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ReportError::io(raw_dir, e))?;
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name.ends_with(".json") && name != THEMES_FILE && path.is_file() {
            files.push(path);
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

pub fn load_year_file(path: &Path) -> Result<YearFile> {
    let content = fs::read_to_string(path).map_err(|e| ReportError::io(path, e))?;
    let raw: RawDisclosureFile =
        serde_json::from_str(&content).map_err(|e| ReportError::json(path, e))?;
    let year = parse_publication_year(&raw.publication_date)?;
    debug!(
        file = %path.display(),
        source = raw.source_file.as_deref().unwrap_or("-"),
        extracted = raw.extraction_date.as_deref().unwrap_or("-"),
        year,
        groups = raw.appg_groups.len(),
        "loaded raw file"
    );
    Ok(YearFile {
        path: path.to_path_buf(),
        year,
        raw,
    })
}

/// Load every raw file, ordered by year. Two files for the same year is an
/// error because the year is the grouping key for everything downstream.
pub fn load_all(paths: &DataPaths) -> Result<(Vec<YearFile>, LoadReport)> {
    let mut files = Vec::new();
    for path in list_raw_files(&paths.raw_dir)? {
        files.push(load_year_file(&path)?);
    }
    files.sort_by_key(|f| f.year);

    for pair in files.windows(2) {
        if pair[0].year == pair[1].year {
            return Err(ReportError::DuplicateYear {
                year: pair[0].year,
                first: pair[0].path.clone(),
                second: pair[1].path.clone(),
            });
        }
    }

    let report = LoadReport {
        files: files.len(),
        groups: files.iter().map(|f| f.raw.appg_groups.len()).sum(),
        benefit_lines: files
            .iter()
            .flat_map(|f| f.raw.appg_groups.iter())
            .map(|g| g.benefits_details.len())
            .sum(),
    };
    info!(
        files = report.files,
        groups = report.groups,
        benefit_lines = report.benefit_lines,
        "raw disclosures loaded"
    );
    Ok((files, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;

    fn write(dir: &Path, name: &str, body: &str) {
        fs::write(dir.join(name), body).unwrap();
    }

    fn minimal(date: &str) -> String {
        format!(
            r#"{{"publication_date": "{date}", "total_groups": 0, "total_benefits_value": 0, "appg_groups": []}}"#
        )
    }

    #[test]
    fn parses_ddmmyy() {
        assert_eq!(parse_publication_year("200520").unwrap(), 2020);
        assert_eq!(parse_publication_year("010124").unwrap(), 2024);
    }

    #[test]
    fn parses_free_text_date() {
        assert_eq!(parse_publication_year("4 May 2022").unwrap(), 2022);
        assert_eq!(parse_publication_year("May 2023").unwrap(), 2023);
        assert_eq!(parse_publication_year("2021").unwrap(), 2021);
    }

    #[test]
    fn rejects_malformed_dates() {
        for bad in ["20052", "12345", "", "May", "320520", "4 May 22", "4 May 20221"] {
            assert!(
                matches!(parse_publication_year(bad), Err(ReportError::InvalidDate { .. })),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn lists_json_in_lexical_order_without_themes() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "b_appg_data.json", &minimal("2021"));
        write(dir.path(), "a_appg_data.json", &minimal("2020"));
        write(dir.path(), "themes.json", r#"{"categories": []}"#);
        write(dir.path(), "notes.txt", "ignore me");

        let files = list_raw_files(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a_appg_data.json", "b_appg_data.json"]);
    }

    #[test]
    fn load_all_sorts_by_year() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.json", &minimal("1 June 2022"));
        write(dir.path(), "b.json", &minimal("200520"));
        let paths = DataPaths::new(dir.path(), dir.path().join("cache"));

        let (files, report) = load_all(&paths).unwrap();
        let years: Vec<_> = files.iter().map(|f| f.year).collect();
        assert_eq!(years, vec![2020, 2022]);
        assert_eq!(report.files, 2);
    }

    #[test]
    fn duplicate_years_fail() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.json", &minimal("200520"));
        write(dir.path(), "b.json", &minimal("1 June 2020"));
        let paths = DataPaths::new(dir.path(), dir.path().join("cache"));

        let err = load_all(&paths).unwrap_err();
        assert!(matches!(err, ReportError::DuplicateYear { year: 2020, .. }));
    }

    #[test]
    fn malformed_json_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "broken.json", "{ not json");
        let err = load_year_file(&dir.path().join("broken.json")).unwrap_err();
        match err {
            ReportError::Json { path, .. } => assert!(path.ends_with("broken.json")),
            other => panic!("unexpected error: {other}"),
        }
    }
}
