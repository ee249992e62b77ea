// 🧾 Table Parser - OCR table export → raw rows
//
// The OCR service exports each detected table as CSV where every cell looks like
// "'01/02 " : an outer CSV quote, an inner apostrophe marker, trailing padding.
// After the genuine rows it appends a "Confidence Scores" block that must not
// be read as data.

use csv::ReaderBuilder;
use serde::{Deserialize, Serialize};
use tracing::debug;

// ============================================================================
// CORE TYPES
// ============================================================================

/// Marker line that ends the data rows of one OCR table
pub const CONFIDENCE_SENTINEL: &str = "Confidence Scores";

/// Line that introduces a new table inside a multi-table export
pub const TABLE_MARKER: &str = "Table:";

/// date, check number, description, deposit, withdrawal, balance
pub const MIN_FIELDS: usize = 6;

/// RawTableRow - one physical data line, fields unquoted but otherwise untouched
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTableRow {
    pub date: String,
    pub check_number: String,
    pub description: String,
    pub deposit: String,
    pub withdrawal: String,
    pub balance: String,

    /// 1-based line number inside the table text (header is line 1)
    pub line_number: usize,
}

impl RawTableRow {
    fn from_fields(mut fields: Vec<String>, line_number: usize) -> Option<Self> {
        if fields.len() < MIN_FIELDS {
            return None;
        }
        fields.truncate(MIN_FIELDS);

        let mut it = fields.into_iter();
        Some(RawTableRow {
            date: it.next()?,
            check_number: it.next()?,
            description: it.next()?,
            deposit: it.next()?,
            withdrawal: it.next()?,
            balance: it.next()?,
            line_number,
        })
    }
}

// ============================================================================
// TABLE PARSER
// ============================================================================

pub struct TableParser {
    /// Lines starting with any of these end the table (case-insensitive)
    pub sentinel_prefixes: Vec<String>,

    /// Date-cell values that mark a non-data row, e.g. a repeated header
    pub non_data_markers: Vec<String>,
}

impl TableParser {
    pub fn new() -> Self {
        TableParser {
            sentinel_prefixes: vec![CONFIDENCE_SENTINEL.to_lowercase()],
            non_data_markers: vec![
                "date".to_string(),
                "confidence".to_string(),
                "fecha".to_string(),
                "confianza".to_string(),
            ],
        }
    }

    /// Parse the text of one table into raw rows.
    ///
    /// Line 0 is the header and is always skipped. Bad lines are dropped
    /// silently; this never fails.
    pub fn parse_table(&self, content: &str) -> Vec<RawTableRow> {
        let mut rows = Vec::new();

        for (idx, line) in content.lines().enumerate().skip(1) {
            if self.is_sentinel(line) {
                debug!(line = idx + 1, "Confidence block reached, table ends");
                break;
            }

            let Some(fields) = split_fields(line) else {
                debug!(line = idx + 1, "Dropped unreadable line");
                continue;
            };

            let Some(row) = RawTableRow::from_fields(fields, idx + 1) else {
                debug!(line = idx + 1, "Dropped short line");
                continue;
            };

            if self.is_non_data_date(&row.date) {
                debug!(line = idx + 1, date = %row.date, "Dropped non-data row");
                continue;
            }

            rows.push(row);
        }

        rows
    }

    /// Parse every table in an export (see [`split_tables`]), in file order
    pub fn parse_export(&self, content: &str) -> Vec<Vec<RawTableRow>> {
        split_tables(content)
            .iter()
            .map(|table| self.parse_table(table))
            .collect()
    }

    fn is_sentinel(&self, line: &str) -> bool {
        let bare = strip_cell_noise(line).to_lowercase();
        self.sentinel_prefixes
            .iter()
            .any(|prefix| bare.starts_with(prefix.as_str()))
    }

    fn is_non_data_date(&self, date: &str) -> bool {
        if date.is_empty() {
            return true;
        }
        let lower = date.to_lowercase();
        self.non_data_markers
            .iter()
            .any(|marker| lower.starts_with(marker.as_str()))
    }
}

impl Default for TableParser {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// FIELD HELPERS
// ============================================================================

/// Split one CSV line and strip both quote layers from every field.
/// Returns None when the line is not readable as CSV at all.
pub fn split_fields(line: &str) -> Option<Vec<String>> {
    if line.trim().is_empty() {
        return None;
    }

    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(line.as_bytes());

    let record = reader.records().next()?.ok()?;
    Some(record.iter().map(unquote_cell).collect())
}

/// `"'1/02 "` → `1/02`, `'Purchase authorized...'` → `Purchase authorized...`
pub fn unquote_cell(raw: &str) -> String {
    let mut cell = raw.trim();

    if cell.len() >= 2 && cell.starts_with('"') && cell.ends_with('"') {
        cell = cell[1..cell.len() - 1].trim();
    }
    if let Some(rest) = cell.strip_prefix('\'') {
        cell = rest;
    }
    if let Some(rest) = cell.strip_suffix('\'') {
        cell = rest;
    }

    cell.trim().to_string()
}

fn strip_cell_noise(line: &str) -> &str {
    line.trim_start_matches(|c: char| c == '"' || c == '\'' || c.is_whitespace())
}

/// Split a multi-table export into table bodies.
///
/// Tables are introduced by `Table: <name>` lines. Leading blank lines of a
/// body are dropped so the header sits on line 0. Text without any marker is
/// returned as a single table.
pub fn split_tables(content: &str) -> Vec<String> {
    let is_marker = |line: &str| strip_cell_noise(line).starts_with(TABLE_MARKER);

    if !content.lines().any(is_marker) {
        return vec![content.to_string()];
    }

    let mut tables: Vec<Vec<&str>> = Vec::new();
    for line in content.lines() {
        if is_marker(line) {
            tables.push(Vec::new());
            continue;
        }
        // Anything before the first marker is export preamble
        let Some(body) = tables.last_mut() else {
            continue;
        };
        if body.is_empty() && line.trim().is_empty() {
            continue;
        }
        body.push(line);
    }

    tables.into_iter().map(|body| body.join("\n")).collect()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "\"'Date \",\"'Check Number \",\"'Description \",\"'Deposits/Credits \",\"'Withdrawals/Debits \",\"'Ending daily balance \"";

    fn ocr_line(fields: [&str; 6]) -> String {
        fields
            .iter()
            .map(|f| format!("\"'{} \"", f))
            .collect::<Vec<_>>()
            .join(",")
    }

    #[test]
    fn test_unquote_cell_strips_both_layers() {
        assert_eq!(unquote_cell("\"'1/02 \""), "1/02");
        assert_eq!(unquote_cell("'1,250.00 "), "1,250.00");
        assert_eq!(unquote_cell("  plain  "), "plain");
        assert_eq!(unquote_cell("\"'\""), "");
    }

    #[test]
    fn test_parse_table_skips_header() {
        let text = format!(
            "{}\n{}",
            HEADER,
            ocr_line(["1/02", "", "eDeposit in Branch", "1,250.00", "", "3,400.10"])
        );
        let rows = TableParser::new().parse_table(&text);

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].date, "1/02");
        assert_eq!(rows[0].description, "eDeposit in Branch");
        assert_eq!(rows[0].deposit, "1,250.00");
        assert_eq!(rows[0].withdrawal, "");
        assert_eq!(rows[0].balance, "3,400.10");
        assert_eq!(rows[0].line_number, 2);
    }

    #[test]
    fn test_confidence_sentinel_ends_table() {
        let text = [
            HEADER.to_string(),
            ocr_line(["1/02", "", "Coffee", "", "4.50", ""]),
            "\"'Confidence Scores % (Table Cell) \"".to_string(),
            ocr_line(["1/03", "", "After sentinel", "", "9.00", ""]),
            ocr_line(["99.1", "98.7", "97.0", "96.5", "95.5", "94.0"]),
        ]
        .join("\n");

        let rows = TableParser::new().parse_table(&text);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].description, "Coffee");
    }

    #[test]
    fn test_short_and_marker_rows_rejected() {
        let text = [
            HEADER.to_string(),
            "\"'1/02 \",\"'Only three \",\"'fields \"".to_string(),
            HEADER.to_string(),
            ocr_line(["", "", "No date", "", "1.00", ""]),
            ocr_line(["1/05", "1042", "Check", "", "250.00", "1,000.00"]),
        ]
        .join("\n");

        let rows = TableParser::new().parse_table(&text);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].check_number, "1042");
    }

    #[test]
    fn test_extra_fields_are_ignored() {
        let text = format!("{}\n\"'1/02 \",\"\",\"'Desc \",\"'5.00 \",\"\",\"\",\"'extra \"", HEADER);
        let rows = TableParser::new().parse_table(&text);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].deposit, "5.00");
    }

    #[test]
    fn test_split_tables_with_markers() {
        let text = format!(
            "Table: Table_1\n\n{}\n{}\n\nTable: Table_2\n\n{}\n{}\n",
            HEADER,
            ocr_line(["1/02", "", "First", "1.00", "", ""]),
            HEADER,
            ocr_line(["1/03", "", "Second", "", "2.00", ""]),
        );

        let tables = split_tables(&text);
        assert_eq!(tables.len(), 2);

        let parsed = TableParser::new().parse_export(&text);
        assert_eq!(parsed[0][0].description, "First");
        assert_eq!(parsed[1][0].description, "Second");
    }

    #[test]
    fn test_split_tables_without_markers_is_single_table() {
        let text = format!("{}\n{}", HEADER, ocr_line(["1/02", "", "Only", "1.00", "", ""]));
        let tables = split_tables(&text);
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0], text);
    }
}
