// 📥 Upload Validation - reject bad uploads before any job or object exists

use serde::{Deserialize, Serialize};

use crate::emit::OutputFormat;
use crate::error::{ConvertError, Result};
use crate::job::ProcessingType;

pub const MIB: usize = 1024 * 1024;

pub const PDF_TYPE: &str = "application/pdf";
pub const CSV_TYPES: [&str; 3] = ["text/csv", "application/csv", "application/vnd.ms-excel"];
pub const XLSX_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

#[derive(Debug, Clone, PartialEq)]
pub struct UploadFile {
    pub file_name: String,

    /// As sent by the client; may be empty
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn new(file_name: impl Into<String>, content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        UploadFile {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }

    /// Lowercased, parameters stripped, guessed from the extension when the
    /// client sent nothing useful
    pub fn media_type(&self) -> String {
        let declared = self
            .content_type
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_lowercase();

        if !declared.is_empty() && declared != "application/octet-stream" {
            return declared;
        }

        let extension = self
            .file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_lowercase())
            .unwrap_or_default();
        match extension.as_str() {
            "pdf" => PDF_TYPE.to_string(),
            "csv" => "text/csv".to_string(),
            "xls" => "application/vnd.ms-excel".to_string(),
            "xlsx" => XLSX_TYPE.to_string(),
            _ => declared,
        }
    }

    pub fn is_csv(&self) -> bool {
        CSV_TYPES.contains(&self.media_type().as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Upload {
    pub processing_type: ProcessingType,
    pub format: OutputFormat,
    pub files: Vec<UploadFile>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadLimits {
    pub statement_max_bytes: usize,
    pub csv_max_bytes: usize,
    pub max_csv_files: usize,
}

impl Default for UploadLimits {
    fn default() -> Self {
        UploadLimits {
            statement_max_bytes: 25 * MIB,
            csv_max_bytes: 10 * MIB,
            max_csv_files: 20,
        }
    }
}

fn is_statement_type(media_type: &str) -> bool {
    media_type == PDF_TYPE || media_type == XLSX_TYPE || CSV_TYPES.contains(&media_type)
}

/// Check type, size and count rules for the chosen processing path
pub fn validate_upload(upload: &Upload, limits: &UploadLimits) -> Result<()> {
    if upload.files.is_empty() {
        return Err(ConvertError::NoFiles);
    }

    match upload.processing_type {
        ProcessingType::Statement => {
            if upload.files.len() > 1 {
                return Err(ConvertError::TooManyFiles {
                    count: upload.files.len(),
                    limit: 1,
                });
            }
            let file = &upload.files[0];
            let media_type = file.media_type();
            if !is_statement_type(&media_type) {
                return Err(ConvertError::UnsupportedMediaType(media_type));
            }
            check_size(file, limits.statement_max_bytes)?;
        }
        ProcessingType::CombineCsv => {
            if upload.files.len() > limits.max_csv_files {
                return Err(ConvertError::TooManyFiles {
                    count: upload.files.len(),
                    limit: limits.max_csv_files,
                });
            }
            for file in &upload.files {
                if !file.is_csv() {
                    return Err(ConvertError::UnsupportedMediaType(file.media_type()));
                }
                check_size(file, limits.csv_max_bytes)?;
            }
        }
    }

    Ok(())
}

fn check_size(file: &UploadFile, limit: usize) -> Result<()> {
    if file.bytes.len() > limit {
        return Err(ConvertError::FileTooLarge {
            name: file.file_name.clone(),
            size: file.bytes.len(),
            limit,
        });
    }
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn upload(processing_type: ProcessingType, files: Vec<UploadFile>) -> Upload {
        Upload {
            processing_type,
            format: OutputFormat::Qbo,
            files,
        }
    }

    #[test]
    fn test_accepts_statement_types() {
        let limits = UploadLimits::default();
        for content_type in ["application/pdf", "text/csv; charset=utf-8", "application/vnd.ms-excel", XLSX_TYPE] {
            let files = vec![UploadFile::new("jan", content_type, vec![1, 2, 3])];
            assert!(validate_upload(&upload(ProcessingType::Statement, files), &limits).is_ok());
        }
    }

    #[test]
    fn test_rejects_zip() {
        let files = vec![UploadFile::new("jan.zip", "application/zip", vec![0])];
        let err = validate_upload(&upload(ProcessingType::Statement, files), &UploadLimits::default());
        assert!(matches!(err, Err(ConvertError::UnsupportedMediaType(t)) if t == "application/zip"));
    }

    #[test]
    fn test_guesses_type_from_extension() {
        let file = UploadFile::new("Jan.CSV", "application/octet-stream", vec![]);
        assert_eq!(file.media_type(), "text/csv");
        let file = UploadFile::new("jan.bin", "", vec![]);
        assert_eq!(file.media_type(), "");
    }

    #[test]
    fn test_statement_size_limit() {
        let limits = UploadLimits {
            statement_max_bytes: 4,
            ..UploadLimits::default()
        };
        let files = vec![UploadFile::new("jan.pdf", "application/pdf", vec![0; 5])];
        let err = validate_upload(&upload(ProcessingType::Statement, files), &limits);
        assert!(matches!(err, Err(ConvertError::FileTooLarge { size: 5, limit: 4, .. })));
    }

    #[test]
    fn test_statement_takes_one_file() {
        let files = vec![
            UploadFile::new("a.pdf", "application/pdf", vec![]),
            UploadFile::new("b.pdf", "application/pdf", vec![]),
        ];
        let err = validate_upload(&upload(ProcessingType::Statement, files), &UploadLimits::default());
        assert!(matches!(err, Err(ConvertError::TooManyFiles { count: 2, limit: 1 })));
    }

    #[test]
    fn test_combine_requires_csv() {
        let files = vec![
            UploadFile::new("a.csv", "text/csv", vec![]),
            UploadFile::new("b.pdf", "application/pdf", vec![]),
        ];
        let err = validate_upload(&upload(ProcessingType::CombineCsv, files), &UploadLimits::default());
        assert!(matches!(err, Err(ConvertError::UnsupportedMediaType(_))));
    }

    #[test]
    fn test_combine_limits() {
        let limits = UploadLimits {
            csv_max_bytes: 2,
            max_csv_files: 2,
            ..UploadLimits::default()
        };
        let too_many = vec![UploadFile::new("a.csv", "text/csv", vec![]); 3];
        assert!(matches!(
            validate_upload(&upload(ProcessingType::CombineCsv, too_many), &limits),
            Err(ConvertError::TooManyFiles { count: 3, limit: 2 })
        ));

        let too_big = vec![UploadFile::new("a.csv", "text/csv", vec![0; 3])];
        assert!(matches!(
            validate_upload(&upload(ProcessingType::CombineCsv, too_big), &limits),
            Err(ConvertError::FileTooLarge { .. })
        ));
    }

    #[test]
    fn test_empty_upload() {
        let err = validate_upload(&upload(ProcessingType::Statement, vec![]), &UploadLimits::default());
        assert!(matches!(err, Err(ConvertError::NoFiles)));
    }
}
