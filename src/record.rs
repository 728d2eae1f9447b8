//! CSV roster input and the row normalizer.
//!
//! Raw rows are header → value maps exactly as they appear in the file. The
//! normalizer turns each one into a [`Record`] with trimmed values, resolved
//! column fallbacks and a single display format for dates.

use crate::error::AppError;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

// ============================================================================
// Constants
// ============================================================================

pub const COL_DATE: &str = "Date";
pub const COL_PACK_NUMBER: &str = "Pack Number";
pub const COL_DEN_NUMBER: &str = "Den Number";
pub const COL_DEN_NUMBER_LEGACY: &str = "Den No.";
pub const COL_SCOUT_NAME: &str = "Scout Name";
pub const COL_AWARD_NAME: &str = "Award Name";
pub const COL_RANK: &str = "Rank";
pub const COL_DEN_LEADER: &str = "Den Leader";
pub const COL_CUBMASTER: &str = "Cubmaster";

const AWARD_REQUIRED_HEADERS: [&str; 6] = [
    COL_DATE,
    COL_PACK_NUMBER,
    COL_SCOUT_NAME,
    COL_AWARD_NAME,
    COL_DEN_LEADER,
    COL_CUBMASTER,
];

const RANK_REQUIRED_HEADERS: [&str; 6] = [
    COL_DATE,
    COL_PACK_NUMBER,
    COL_DEN_NUMBER,
    COL_SCOUT_NAME,
    COL_DEN_LEADER,
    COL_CUBMASTER,
];

/// Display format for every date drawn on a certificate or card.
const DISPLAY_DATE_FORMAT: &str = "%m/%d/%Y";

// ============================================================================
// Data Structures
// ============================================================================

/// Which required-header set and template family apply to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Workflow {
    /// General adventure/award certificates
    #[default]
    Award,
    /// Rank cards and rank certificates
    Rank,
}

impl Workflow {
    pub fn required_headers(&self) -> &'static [&'static str] {
        match self {
            Workflow::Award => &AWARD_REQUIRED_HEADERS,
            Workflow::Rank => &RANK_REQUIRED_HEADERS,
        }
    }
}

/// One CSV row keyed by header name, values untrimmed.
pub type RawRow = BTreeMap<String, String>;

/// Parsed CSV: the header row plus every row with at least one non-blank value.
#[derive(Debug, Clone, Default)]
pub struct CsvTable {
    pub headers: Vec<String>,
    pub rows: Vec<RawRow>,
}

/// A normalized roster row. Empty strings mean "draw nothing here".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    pub date_raw: String,
    pub date: String,
    pub pack_number: String,
    pub den_number: String,
    pub scout_name: String,
    pub award: String,
    pub den_leader: String,
    pub cubmaster: String,
}

impl Record {
    pub fn from_row(row: &RawRow, workflow: Workflow) -> Self {
        let date_raw = column(row, COL_DATE);
        // Rank sheets name the rank in their own column; it wins over a stale award name.
        let award = match workflow {
            Workflow::Award => first_non_blank(row, &[COL_AWARD_NAME, COL_RANK]),
            Workflow::Rank => first_non_blank(row, &[COL_RANK, COL_AWARD_NAME]),
        };
        Record {
            date: format_display_date(&date_raw),
            date_raw,
            pack_number: column(row, COL_PACK_NUMBER),
            den_number: first_non_blank(row, &[COL_DEN_NUMBER, COL_DEN_NUMBER_LEGACY]),
            scout_name: column(row, COL_SCOUT_NAME),
            award,
            den_leader: column(row, COL_DEN_LEADER),
            cubmaster: column(row, COL_CUBMASTER),
        }
    }
}

/// Outcome of checking a roster before generation.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ValidationReport {
    pub header_count: usize,
    pub row_count: usize,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub ok: bool,
}

// ============================================================================
// CSV Input
// ============================================================================

/// Parse UTF-8 CSV text, tolerating a leading byte-order mark.
pub fn parse_csv(bytes: &[u8]) -> Result<CsvTable, AppError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|_| AppError::MalformedCsv("CSV must be UTF-8 encoded.".to_string()))?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    if headers.is_empty() {
        return Err(AppError::MalformedCsv("CSV has no header row.".to_string()));
    }

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result?;
        if record.iter().all(|v| v.trim().is_empty()) {
            continue;
        }
        let row: RawRow = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.clone(), record.get(i).unwrap_or("").to_string()))
            .collect();
        rows.push(row);
    }

    Ok(CsvTable { headers, rows })
}

/// Normalize every data row of a table.
pub fn normalize_rows(rows: &[RawRow], workflow: Workflow) -> Vec<Record> {
    rows.iter().map(|row| Record::from_row(row, workflow)).collect()
}

// ============================================================================
// Helper Functions
// ============================================================================

fn column(row: &RawRow, name: &str) -> String {
    row.get(name).map(|v| v.trim().to_string()).unwrap_or_default()
}

fn first_non_blank(row: &RawRow, names: &[&str]) -> String {
    names
        .iter()
        .map(|name| column(row, name))
        .find(|v| !v.is_empty())
        .unwrap_or_default()
}

/// Parse one of the accepted roster date shapes: `YYYY-MM-DD`, `MM/DD/YYYY`
/// or `MM/DD/YY`.
pub fn parse_display_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if let Some((year, _)) = value.split_once('-') {
        if year.len() != 4 {
            return None;
        }
        return NaiveDate::parse_from_str(value, "%Y-%m-%d").ok();
    }
    let year = value.rsplit('/').next()?;
    let format = match year.len() {
        4 => "%m/%d/%Y",
        2 => "%m/%d/%y",
        _ => return None,
    };
    NaiveDate::parse_from_str(value, format).ok()
}

/// Reformat a roster date for display. Unrecognized text passes through as-is.
pub fn format_display_date(value: &str) -> String {
    let value = value.trim();
    if value.is_empty() {
        return String::new();
    }
    match parse_display_date(value) {
        Some(date) => date.format(DISPLAY_DATE_FORMAT).to_string(),
        None => value.to_string(),
    }
}

// ============================================================================
// Validation
// ============================================================================

pub fn validate(table: &CsvTable, workflow: Workflow) -> ValidationReport {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let missing: Vec<&str> = workflow
        .required_headers()
        .iter()
        .copied()
        .filter(|h| !has_header(&table.headers, h))
        .collect();
    if !missing.is_empty() {
        errors.push(format!("Missing required headers: {}", missing.join(", ")));
    }
    if table.rows.is_empty() {
        errors.push("CSV has no data rows.".to_string());
    }

    for (idx, row) in table.rows.iter().enumerate() {
        let line = idx + 2;
        let record = Record::from_row(row, workflow);
        if record.scout_name.is_empty() {
            errors.push(format!("Row {}: Scout Name is required.", line));
        }
        if workflow == Workflow::Award && record.award.is_empty() {
            errors.push(format!("Row {}: Award Name is required.", line));
        }
        if record.pack_number.is_empty() {
            warnings.push(format!("Row {}: Pack Number is empty.", line));
        }
        if !record.date_raw.is_empty() && parse_display_date(&record.date_raw).is_none() {
            warnings.push(format!(
                "Row {}: Date '{}' is not in a recognized format.",
                line, record.date_raw
            ));
        }
    }

    ValidationReport {
        header_count: table.headers.len(),
        row_count: table.rows.len(),
        ok: errors.is_empty(),
        errors,
        warnings,
    }
}

fn has_header(headers: &[String], name: &str) -> bool {
    headers.iter().any(|h| h == name)
        || (name == COL_DEN_NUMBER && headers.iter().any(|h| h == COL_DEN_NUMBER_LEGACY))
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "Date,Pack Number,Scout Name,Award Name,Den Leader,Cubmaster\n";

    fn row(pairs: &[(&str, &str)]) -> RawRow {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_dates_are_reformatted_for_display() {
        assert_eq!(format_display_date("2024-05-01"), "05/01/2024");
        assert_eq!(format_display_date("5/1/2024"), "05/01/2024");
        assert_eq!(format_display_date("05/01/24"), "05/01/2024");
        assert_eq!(format_display_date("  "), "");
    }

    #[test]
    fn test_unrecognized_date_passes_through() {
        assert_eq!(format_display_date("Spring 2024"), "Spring 2024");
        assert_eq!(format_display_date("24-05-01"), "24-05-01");
        assert!(parse_display_date("05/01/024").is_none());
    }

    #[test]
    fn test_parse_strips_bom_and_blank_rows() {
        let csv = format!("\u{feff}{}2024-05-01,123,Alex Doe,Bobcat,Jane,John\n,,,,,\n", HEADER);
        let table = parse_csv(csv.as_bytes()).unwrap();
        assert_eq!(table.headers[0], "Date");
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0]["Scout Name"], "Alex Doe");
    }

    #[test]
    fn test_short_rows_fill_missing_columns_with_blanks() {
        let csv = format!("{}2024-05-01,123,Alex Doe\n", HEADER);
        let table = parse_csv(csv.as_bytes()).unwrap();
        assert_eq!(table.rows[0]["Cubmaster"], "");
    }

    #[test]
    fn test_empty_input_has_no_header() {
        let err = parse_csv(b"").unwrap_err();
        assert!(matches!(err, AppError::MalformedCsv(_)));
    }

    #[test]
    fn test_non_utf8_is_rejected() {
        let err = parse_csv(&[0xff, 0xfe, 0x00]).unwrap_err();
        assert!(matches!(err, AppError::MalformedCsv(_)));
    }

    #[test]
    fn test_record_fallbacks() {
        let raw = row(&[
            ("Scout Name", "  Alex Doe "),
            ("Award Name", ""),
            ("Rank", "Wolf"),
            ("Den No.", "4"),
            ("Date", "2024-05-01"),
        ]);
        let record = Record::from_row(&raw, Workflow::Award);
        assert_eq!(record.scout_name, "Alex Doe");
        assert_eq!(record.award, "Wolf");
        assert_eq!(record.den_number, "4");
        assert_eq!(record.date, "05/01/2024");
        assert_eq!(record.date_raw, "2024-05-01");
        assert_eq!(record.cubmaster, "");
    }

    #[test]
    fn test_rank_workflow_prefers_rank_column() {
        let raw = row(&[("Award Name", "Bobcat"), ("Rank", "Wolf")]);
        assert_eq!(Record::from_row(&raw, Workflow::Rank).award, "Wolf");
        assert_eq!(Record::from_row(&raw, Workflow::Award).award, "Bobcat");
    }

    #[test]
    fn test_validation_reports_missing_headers_and_rows() {
        let table = parse_csv(b"Scout Name\n").unwrap();
        let report = validate(&table, Workflow::Award);
        assert!(!report.ok);
        assert_eq!(report.row_count, 0);
        assert!(report.errors[0].starts_with("Missing required headers: Date, Pack Number"));
        assert!(report.errors.iter().any(|e| e == "CSV has no data rows."));
    }

    #[test]
    fn test_validation_row_messages() {
        let csv = format!("{},,,,Jane,John\n05/01/2024,,Sam,Bobcat,,\nbad-date,1,Lee,Lion,,\n", HEADER);
        let table = parse_csv(csv.as_bytes()).unwrap();
        let report = validate(&table, Workflow::Award);
        assert!(!report.ok);
        assert!(report.errors.contains(&"Row 2: Scout Name is required.".to_string()));
        assert!(report.errors.contains(&"Row 2: Award Name is required.".to_string()));
        assert!(report.warnings.contains(&"Row 3: Pack Number is empty.".to_string()));
        assert!(report
            .warnings
            .contains(&"Row 4: Date 'bad-date' is not in a recognized format.".to_string()));
    }

    #[test]
    fn test_rank_headers_accept_legacy_den_column() {
        let csv = "Date,Pack Number,Den No.,Scout Name,Den Leader,Cubmaster\n2024-05-01,9,4,Alex,,\n";
        let table = parse_csv(csv.as_bytes()).unwrap();
        let report = validate(&table, Workflow::Rank);
        assert!(report.ok, "{:?}", report.errors);
    }
}
