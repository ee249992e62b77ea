// 🔁 Conversion Pipeline - table text → rows → transactions → ledger → artifact
//
// Synchronous and side-effect free. The orchestrator runs it stage by stage
// between status updates; the CLI runs it in one go.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::config::StatementSettings;
use crate::continuity::{ContinuityEngine, ContinuityReport};
use crate::emit::{get_emitter, AccountConfig, Artifact, EmitRequest, OutputFormat};
use crate::ledger::Ledger;
use crate::normalizer::Normalizer;
use crate::parser::TableParser;

#[derive(Debug)]
pub struct Conversion {
    pub ledger: Ledger,
    pub continuity: Option<ContinuityReport>,
    pub artifact: Artifact,
}

pub struct Pipeline {
    parser: TableParser,
    normalizer: Normalizer,
    account: AccountConfig,
    continuity: Option<ContinuityEngine>,
}

impl Pipeline {
    pub fn new(year: i32, account: AccountConfig) -> Self {
        Pipeline {
            parser: TableParser::new(),
            normalizer: Normalizer::new(year),
            account,
            continuity: None,
        }
    }

    pub fn from_settings(settings: &StatementSettings) -> Self {
        Pipeline::new(settings.year(), settings.account.clone())
            .with_continuity_check(settings.check_balance_continuity)
    }

    pub fn with_continuity_check(mut self, enabled: bool) -> Self {
        self.continuity = enabled.then(ContinuityEngine::new);
        self
    }

    pub fn year(&self) -> i32 {
        self.normalizer.year
    }

    /// Parse and normalize each table independently, then concatenate in order
    pub fn build_ledger<S: AsRef<str>>(&self, tables: &[S]) -> Ledger {
        let per_table = tables.iter().enumerate().map(|(index, table)| {
            let rows = self.parser.parse_table(table.as_ref());
            debug!(table = index + 1, rows = rows.len(), "Parsed table");
            self.normalizer.normalize_table(&rows)
        });

        let ledger = Ledger::consolidate(per_table.collect::<Vec<_>>());
        info!(
            tables = tables.len(),
            transactions = ledger.transaction_count(),
            review = ledger.review_count(),
            "Ledger consolidated"
        );
        ledger
    }

    /// None unless the continuity check is enabled
    pub fn check_continuity(&self, ledger: &Ledger) -> Option<ContinuityReport> {
        let report = self.continuity.as_ref()?.check(ledger);
        if report.is_continuous() {
            debug!(checked = report.checked, "Running balance continuous");
        } else {
            warn!(breaks = report.breaks.len(), "{}", report.summary());
        }
        Some(report)
    }

    pub fn emit(
        &self,
        ledger: &Ledger,
        format: OutputFormat,
        file_stem: &str,
        generated_at: DateTime<Utc>,
    ) -> Result<Artifact> {
        let request = EmitRequest {
            account: &self.account,
            file_stem,
            generated_at,
        };
        get_emitter(format)
            .emit(ledger, &request)
            .with_context(|| format!("Failed to write {} output", format.name()))
    }

    pub fn convert<S: AsRef<str>>(
        &self,
        tables: &[S],
        format: OutputFormat,
        file_stem: &str,
        generated_at: DateTime<Utc>,
    ) -> Result<Conversion> {
        let ledger = self.build_ledger(tables);
        let continuity = self.check_continuity(&ledger);
        let artifact = self.emit(&ledger, format, file_stem, generated_at)?;
        Ok(Conversion {
            ledger,
            continuity,
            artifact,
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    const HEADER: &str = "Date,Check Number,Description,Deposits/Credits,Withdrawals/Debits,Ending daily balance";

    fn table(rows: &[&str]) -> String {
        let mut text = HEADER.to_string();
        for row in rows {
            text.push('\n');
            text.push_str(row);
        }
        text
    }

    #[test]
    fn test_build_ledger_keeps_table_order() {
        let tables = vec![
            table(&["\"'01/05 \",\"\",\"'Second \",\"\",\"'5.00 \",\"\""]),
            table(&["\"'01/02 \",\"\",\"'First \",\"'10.00 \",\"\",\"\""]),
        ];
        let ledger = Pipeline::new(2024, AccountConfig::default()).build_ledger(&tables);

        let descriptions: Vec<&str> = ledger
            .transactions()
            .iter()
            .map(|tx| tx.description.as_str())
            .collect();
        assert_eq!(descriptions, vec!["Second", "First"]);
        assert_eq!(ledger.net_change(), Decimal::new(500, 2));
    }

    #[test]
    fn test_continuity_off_by_default() {
        let pipeline = Pipeline::new(2024, AccountConfig::default());
        assert!(pipeline.check_continuity(&Ledger::empty()).is_none());

        let pipeline = pipeline.with_continuity_check(true);
        assert!(pipeline.check_continuity(&Ledger::empty()).is_some());
    }

    #[test]
    fn test_convert_empty_tables() {
        let conversion = Pipeline::new(2024, AccountConfig::default())
            .convert(&[HEADER], OutputFormat::Iif, "empty", Utc::now())
            .unwrap();
        assert!(conversion.ledger.is_empty());
        assert_eq!(conversion.artifact.file_name, "empty.iif");
        assert_eq!(conversion.artifact.body.lines().count(), 3);
    }
}
