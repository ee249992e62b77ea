// ⏳ Conversion Job - one upload → parse → convert → deliver unit of work
//
// Stages only move forward. Completed and Failed are terminal: once reached
// the record is frozen and every further transition is rejected.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::emit::OutputFormat;
use crate::error::ConvertError;

// ============================================================================
// JOB STAGE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JobStage {
    Uploading,
    ProcessingStatement,
    ExtractingTransactions,
    ConvertingToQbo,
    Finalizing,
    Completed,
    Failed,
}

impl JobStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStage::Completed | JobStage::Failed)
    }

    /// Position in the forward pipeline (Failed sits outside it)
    fn ordinal(&self) -> u8 {
        match self {
            JobStage::Uploading => 0,
            JobStage::ProcessingStatement => 1,
            JobStage::ExtractingTransactions => 2,
            JobStage::ConvertingToQbo => 3,
            JobStage::Finalizing => 4,
            JobStage::Completed => 5,
            JobStage::Failed => u8::MAX,
        }
    }

    /// Forward moves between non-terminal stages, Finalizing → Completed,
    /// and any non-terminal stage → Failed
    pub fn can_advance_to(&self, next: JobStage) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            JobStage::Failed => true,
            JobStage::Completed => *self == JobStage::Finalizing,
            _ => next.ordinal() > self.ordinal(),
        }
    }

    /// Status line shown to users. These strings are also what older UIs
    /// match on, so their key phrases must not change.
    pub fn message(&self) -> &'static str {
        match self {
            JobStage::Uploading => "Uploading statement...",
            JobStage::ProcessingStatement => "Processing bank statement...",
            JobStage::ExtractingTransactions => "Extracting transaction data...",
            JobStage::ConvertingToQbo => "Converting to QBO format...",
            JobStage::Finalizing => "Finalizing...",
            JobStage::Completed => "Conversion complete",
            JobStage::Failed => "Conversion failed",
        }
    }

    /// Map a free-text status message back to a stage by its key phrase
    pub fn from_legacy_message(message: &str) -> Option<JobStage> {
        let lower = message.to_lowercase();
        [
            ("processing bank statement", JobStage::ProcessingStatement),
            ("extracting transaction", JobStage::ExtractingTransactions),
            ("converting to qbo", JobStage::ConvertingToQbo),
            ("finalizing", JobStage::Finalizing),
            ("uploading", JobStage::Uploading),
            ("complete", JobStage::Completed),
            ("fail", JobStage::Failed),
        ]
        .into_iter()
        .find(|(phrase, _)| lower.contains(phrase))
        .map(|(_, stage)| stage)
    }
}

impl fmt::Display for JobStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobStage::Uploading => "Uploading",
            JobStage::ProcessingStatement => "ProcessingStatement",
            JobStage::ExtractingTransactions => "ExtractingTransactions",
            JobStage::ConvertingToQbo => "ConvertingToQBO",
            JobStage::Finalizing => "Finalizing",
            JobStage::Completed => "Completed",
            JobStage::Failed => "Failed",
        };
        f.write_str(name)
    }
}

// ============================================================================
// PROCESSING TYPE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProcessingType {
    /// One statement file (PDF, CSV or Excel)
    #[default]
    Statement,

    /// Several CSV exports combined into one ledger, in upload order
    CombineCsv,
}

impl FromStr for ProcessingType {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "statement" | "bank-statement" => Ok(ProcessingType::Statement),
            "combine-csv" | "combine" | "csv-combine" => Ok(ProcessingType::CombineCsv),
            other => Err(ConvertError::UnknownProcessingType(other.to_string())),
        }
    }
}

// ============================================================================
// CONVERSION JOB
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionJob {
    pub id: Uuid,

    /// Storage keys of the uploaded files, in upload order
    pub source_keys: Vec<String>,
    pub processing_type: ProcessingType,
    pub format: OutputFormat,
    pub stage: JobStage,

    /// Where the artifact will be written; fixed at creation
    pub planned_output_key: String,

    /// Set only once the artifact exists (Completed)
    pub output_key: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,

    #[serde(default)]
    pub transaction_count: usize,
    #[serde(default)]
    pub review_count: usize,
    #[serde(default)]
    pub continuity_summary: Option<String>,
}

impl ConversionJob {
    pub fn new(
        id: Uuid,
        source_keys: Vec<String>,
        processing_type: ProcessingType,
        format: OutputFormat,
        planned_output_key: String,
        now: DateTime<Utc>,
    ) -> Self {
        ConversionJob {
            id,
            source_keys,
            processing_type,
            format,
            stage: JobStage::Uploading,
            planned_output_key,
            output_key: None,
            created_at: now,
            updated_at: now,
            finished_at: None,
            error: None,
            transaction_count: 0,
            review_count: 0,
            continuity_summary: None,
        }
    }

    /// The key clients poll with: the first uploaded file
    pub fn source_key(&self) -> &str {
        self.source_keys.first().map(String::as_str).unwrap_or("")
    }

    pub fn is_finished(&self) -> bool {
        self.stage.is_terminal()
    }

    pub fn advance(&mut self, next: JobStage, now: DateTime<Utc>) -> Result<(), ConvertError> {
        if next.is_terminal() || !self.stage.can_advance_to(next) {
            return Err(ConvertError::InvalidTransition {
                from: self.stage.to_string(),
                to: next.to_string(),
            });
        }
        self.stage = next;
        self.updated_at = now;
        Ok(())
    }

    pub fn complete(&mut self, now: DateTime<Utc>) -> Result<(), ConvertError> {
        if !self.stage.can_advance_to(JobStage::Completed) {
            return Err(ConvertError::InvalidTransition {
                from: self.stage.to_string(),
                to: JobStage::Completed.to_string(),
            });
        }
        self.stage = JobStage::Completed;
        self.output_key = Some(self.planned_output_key.clone());
        self.updated_at = now;
        self.finished_at = Some(now);
        Ok(())
    }

    pub fn fail(&mut self, error: impl Into<String>, now: DateTime<Utc>) -> Result<(), ConvertError> {
        if !self.stage.can_advance_to(JobStage::Failed) {
            return Err(ConvertError::InvalidTransition {
                from: self.stage.to_string(),
                to: JobStage::Failed.to_string(),
            });
        }
        self.stage = JobStage::Failed;
        self.error = Some(error.into());
        self.updated_at = now;
        self.finished_at = Some(now);
        Ok(())
    }

    /// Seconds since the job was accepted, frozen once it finishes
    pub fn elapsed_secs(&self, now: DateTime<Utc>) -> u64 {
        let end = self.finished_at.unwrap_or(now);
        (end - self.created_at).num_seconds().max(0) as u64
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn new_job() -> ConversionJob {
        ConversionJob::new(
            Uuid::new_v4(),
            vec!["incoming/a/statement.csv".to_string()],
            ProcessingType::Statement,
            OutputFormat::Qbo,
            "parsed/a/statement.qbo".to_string(),
            Utc::now(),
        )
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut job = new_job();
        let now = Utc::now();
        for stage in [
            JobStage::ProcessingStatement,
            JobStage::ExtractingTransactions,
            JobStage::ConvertingToQbo,
            JobStage::Finalizing,
        ] {
            job.advance(stage, now).unwrap();
        }
        assert_eq!(job.output_key, None);
        job.complete(now).unwrap();

        assert_eq!(job.stage, JobStage::Completed);
        assert_eq!(job.output_key.as_deref(), Some("parsed/a/statement.qbo"));
    }

    #[test]
    fn test_backward_transition_rejected() {
        let mut job = new_job();
        job.advance(JobStage::ExtractingTransactions, Utc::now()).unwrap();
        let err = job.advance(JobStage::ProcessingStatement, Utc::now());
        assert!(matches!(err, Err(ConvertError::InvalidTransition { .. })));
    }

    #[test]
    fn test_complete_requires_finalizing() {
        let mut job = new_job();
        assert!(job.complete(Utc::now()).is_err());
    }

    #[test]
    fn test_terminal_states_are_frozen() {
        let mut job = new_job();
        job.fail("boom", Utc::now()).unwrap();

        assert!(job.fail("again", Utc::now()).is_err());
        assert!(job.advance(JobStage::Finalizing, Utc::now()).is_err());
        assert_eq!(job.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_failed_reachable_from_any_non_terminal() {
        for stage in [
            JobStage::Uploading,
            JobStage::ProcessingStatement,
            JobStage::ExtractingTransactions,
            JobStage::ConvertingToQbo,
            JobStage::Finalizing,
        ] {
            assert!(stage.can_advance_to(JobStage::Failed));
        }
    }

    #[test]
    fn test_elapsed_freezes_on_finish() {
        let created = Utc::now() - Duration::seconds(40);
        let mut job = new_job();
        job.created_at = created;
        job.fail("boom", created + Duration::seconds(12)).unwrap();
        assert_eq!(job.elapsed_secs(Utc::now()), 12);
    }

    #[test]
    fn test_legacy_messages() {
        assert_eq!(
            JobStage::from_legacy_message("Converting to QBO format..."),
            Some(JobStage::ConvertingToQbo)
        );
        assert_eq!(
            JobStage::from_legacy_message("Extracting transactions from page 3"),
            Some(JobStage::ExtractingTransactions)
        );
        assert_eq!(JobStage::from_legacy_message("something else"), None);
        for stage in [
            JobStage::ProcessingStatement,
            JobStage::ExtractingTransactions,
            JobStage::ConvertingToQbo,
            JobStage::Finalizing,
        ] {
            assert_eq!(JobStage::from_legacy_message(stage.message()), Some(stage));
        }
    }

    #[test]
    fn test_processing_type_from_str() {
        assert_eq!("".parse::<ProcessingType>().unwrap(), ProcessingType::Statement);
        assert_eq!("combine-csv".parse::<ProcessingType>().unwrap(), ProcessingType::CombineCsv);
        assert!("zip".parse::<ProcessingType>().is_err());
    }

    #[test]
    fn test_stage_serializes_camel_case() {
        let json = serde_json::to_string(&JobStage::ConvertingToQbo).unwrap();
        assert_eq!(json, "\"convertingToQbo\"");
    }
}
