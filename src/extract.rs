// 🔎 Table Extraction - stored upload → CSV text of each table it contains
//
// OCR of PDFs and scanned statements happens in an external service that
// produces CSV table exports. This module is the seam where such a service
// plugs in; the built-in extractor only passes CSV exports through.

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::parser::split_tables;
use crate::storage::StoredObject;
use crate::upload::{CSV_TYPES, PDF_TYPE, XLSX_TYPE};

#[async_trait]
pub trait TableExtractor: Send + Sync {
    /// Table bodies (header line first) in document order
    async fn extract(&self, object: &StoredObject) -> Result<Vec<String>>;
}

/// Reads uploads that already are CSV table exports
pub struct CsvTableExtractor;

impl CsvTableExtractor {
    pub fn new() -> Self {
        CsvTableExtractor
    }
}

impl Default for CsvTableExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TableExtractor for CsvTableExtractor {
    async fn extract(&self, object: &StoredObject) -> Result<Vec<String>> {
        let media_type = object.content_type.to_lowercase();

        if media_type == PDF_TYPE || object.bytes.starts_with(b"%PDF") {
            bail!("{} is a PDF; no OCR extraction service is configured", object.key);
        }
        if media_type == XLSX_TYPE || object.bytes.starts_with(b"PK\x03\x04") {
            bail!("{} is an Excel workbook; export it as CSV first", object.key);
        }
        if !CSV_TYPES.contains(&media_type.as_str()) && media_type != "application/octet-stream" {
            bail!("{} has unsupported content type {}", object.key, media_type);
        }
        if object.bytes.contains(&0) {
            bail!("{} is not a text file", object.key);
        }

        // OCR exports are not always valid UTF-8; keep what is readable
        let text = String::from_utf8_lossy(&object.bytes);
        let text = text.trim_start_matches('\u{feff}');

        Ok(split_tables(text))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn object(content_type: &str, bytes: &[u8]) -> StoredObject {
        StoredObject {
            key: "incoming/a/jan.csv".to_string(),
            content_type: content_type.to_string(),
            bytes: bytes.to_vec(),
        }
    }

    #[tokio::test]
    async fn test_passes_csv_through() {
        let csv = "Date,Check,Description,Deposits,Withdrawals,Balance\n\"'01/02 \",\"\",\"Payroll\",\"$10.00\",\"\",\"$10.00\"\n";
        let tables = CsvTableExtractor::new().extract(&object("text/csv", csv.as_bytes())).await.unwrap();
        assert_eq!(tables.len(), 1);
        assert!(tables[0].starts_with("Date,"));
    }

    #[tokio::test]
    async fn test_splits_multi_table_export() {
        let csv = "\u{feff}Table: 1\nDate,a,b,c,d,e\nTable: 2\nDate,a,b,c,d,e\n";
        let tables = CsvTableExtractor::new().extract(&object("text/csv", csv.as_bytes())).await.unwrap();
        assert_eq!(tables.len(), 2);
    }

    #[tokio::test]
    async fn test_pdf_needs_ocr() {
        let err = CsvTableExtractor::new()
            .extract(&object("application/pdf", b"%PDF-1.7"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("OCR"));
    }

    #[tokio::test]
    async fn test_rejects_binary() {
        let result = CsvTableExtractor::new().extract(&object("text/csv", b"a\0b")).await;
        assert!(result.is_err());
    }
}
