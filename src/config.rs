// ⚙️ Settings - JSON file first, then CONVERT_* environment overrides

use anyhow::{Context, Result};
use chrono::{Datelike, Local};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::emit::AccountConfig;
use crate::upload::UploadLimits;

pub const SETTINGS_ENV: &str = "CONVERT_SETTINGS";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        ServerSettings {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Root directory of the local object store
    pub root: PathBuf,

    /// SQLite job database; None keeps jobs in memory
    pub job_db: Option<PathBuf>,
}

impl Default for StorageSettings {
    fn default() -> Self {
        StorageSettings {
            root: PathBuf::from("data"),
            job_db: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatementSettings {
    /// Year for `M/D` dates. Never inferred from the statement itself.
    pub year: Option<i32>,

    #[serde(flatten)]
    pub account: AccountConfig,

    pub check_balance_continuity: bool,
}

impl StatementSettings {
    /// Configured year, or the current calendar year
    pub fn year(&self) -> i32 {
        self.year.unwrap_or_else(|| Local::now().year())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub storage: StorageSettings,
    pub statement: StatementSettings,
    pub limits: UploadLimits,

    /// Hide raw pipeline errors from clients
    pub production: bool,
}

impl Settings {
    /// Settings file named by CONVERT_SETTINGS (if any), then env overrides
    pub fn from_env() -> Result<Settings> {
        let mut settings = match std::env::var(SETTINGS_ENV) {
            Ok(path) if !path.trim().is_empty() => load_settings(path.trim())?,
            _ => Settings::default(),
        };
        settings.apply_overrides(|name| std::env::var(name).ok())?;
        Ok(settings)
    }

    /// Apply CONVERT_* overrides from any variable source
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(host) = var("CONVERT_HOST") {
            self.server.host = host;
        }
        if let Some(port) = var("CONVERT_PORT") {
            self.server.port = port
                .parse()
                .with_context(|| format!("CONVERT_PORT is not a port number: {}", port))?;
        }
        if let Some(root) = var("CONVERT_STORAGE_DIR") {
            self.storage.root = PathBuf::from(root);
        }
        if let Some(db) = var("CONVERT_JOB_DB") {
            self.storage.job_db = Some(PathBuf::from(db));
        }
        if let Some(year) = var("CONVERT_STATEMENT_YEAR") {
            self.statement.year = Some(
                year.parse()
                    .with_context(|| format!("CONVERT_STATEMENT_YEAR is not a year: {}", year))?,
            );
        }
        if let Some(account_id) = var("CONVERT_ACCOUNT_ID") {
            self.statement.account.account_id = account_id;
        }
        if let Some(bank_id) = var("CONVERT_BANK_ID") {
            self.statement.account.bank_id = bank_id;
        }
        if let Some(bank_name) = var("CONVERT_BANK_NAME") {
            self.statement.account.bank_name = bank_name;
        }
        if let Some(iif_account) = var("CONVERT_IIF_ACCOUNT") {
            self.statement.account.iif_account = iif_account;
        }
        if let Some(production) = var("CONVERT_PRODUCTION") {
            self.production = matches!(production.to_lowercase().as_str(), "1" | "true" | "yes" | "on");
        }

        Ok(())
    }
}

/// Loads settings from a JSON file
pub fn load_settings<P: AsRef<Path>>(path: P) -> Result<Settings> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Reading settings file: {}", path.display()))?;
    let settings: Settings = serde_json::from_str(&raw)
        .with_context(|| format!("Parsing settings JSON in {}", path.display()))?;
    Ok(settings)
}

// ============================================================================
// TESTS
// ============================================================================
