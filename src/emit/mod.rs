// 📤 Format Emitters - Ledger → accounting-software interchange files
//
// All emitters read the same signed amounts (deposit > 0, withdrawal < 0).
// They differ only in wire shape. An empty ledger is a valid, empty document.

pub mod iif;
pub mod ofx;

use anyhow::Result;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ConvertError;
use crate::ledger::Ledger;

pub use iif::IifEmitter;
pub use ofx::{OfxDialect, OfxEmitter};

// ============================================================================
// OUTPUT FORMAT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Ofx,
    #[default]
    Qbo,
    Iif,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Ofx => "ofx",
            OutputFormat::Qbo => "qbo",
            OutputFormat::Iif => "iif",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            OutputFormat::Ofx => "application/x-ofx",
            OutputFormat::Qbo => "application/vnd.intu.qbo",
            OutputFormat::Iif => "application/x-iif",
        }
    }

    /// Human-readable name for status messages
    pub fn name(&self) -> &'static str {
        match self {
            OutputFormat::Ofx => "OFX",
            OutputFormat::Qbo => "QBO",
            OutputFormat::Iif => "IIF",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for OutputFormat {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().trim_start_matches('.') {
            "ofx" => Ok(OutputFormat::Ofx),
            "qbo" => Ok(OutputFormat::Qbo),
            "iif" => Ok(OutputFormat::Iif),
            other => Err(ConvertError::UnknownFormat(other.to_string())),
        }
    }
}

// ============================================================================
// ACCOUNT + REQUEST
// ============================================================================

/// Account metadata the statement itself does not carry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountConfig {
    pub account_id: String,

    /// Routing number, used as OFX BANKID / FID
    pub bank_id: String,
    pub bank_name: String,

    /// OFX ACCTTYPE (CHECKING, SAVINGS, ...)
    pub account_type: String,
    pub currency: String,

    /// QuickBooks Desktop account the TRNS lines post to
    pub iif_account: String,

    /// Intuit bank id QuickBooks Online expects in QBO signon
    pub intu_bid: String,
}

impl Default for AccountConfig {
    fn default() -> Self {
        AccountConfig {
            account_id: "0000000000".to_string(),
            bank_id: "000000000".to_string(),
            bank_name: "Bank".to_string(),
            account_type: "CHECKING".to_string(),
            currency: "USD".to_string(),
            iif_account: "Checking".to_string(),
            intu_bid: "3000".to_string(),
        }
    }
}

pub struct EmitRequest<'a> {
    pub account: &'a AccountConfig,

    /// Output file name without extension
    pub file_stem: &'a str,

    /// Only feeds OFX DTSERVER and date fallbacks for empty ledgers
    pub generated_at: DateTime<Utc>,
}

// ============================================================================
// ARTIFACT
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub format: OutputFormat,
    pub file_name: String,
    pub content_type: String,
    pub body: String,
}

impl Artifact {
    pub fn new(format: OutputFormat, file_stem: &str, body: String) -> Self {
        Artifact {
            format,
            file_name: format!("{}.{}", file_stem, format.extension()),
            content_type: format.content_type().to_string(),
            body,
        }
    }

    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.body.into_bytes()
    }
}

// ============================================================================
// EMITTER TRAIT + FACTORY
// ============================================================================

pub trait Emitter: Send + Sync {
    fn format(&self) -> OutputFormat;

    fn emit(&self, ledger: &Ledger, request: &EmitRequest<'_>) -> Result<Artifact>;
}

pub fn get_emitter(format: OutputFormat) -> Box<dyn Emitter> {
    match format {
        OutputFormat::Ofx => Box::new(OfxEmitter::new(OfxDialect::Ofx)),
        OutputFormat::Qbo => Box::new(OfxEmitter::new(OfxDialect::Qbo)),
        OutputFormat::Iif => Box::new(IifEmitter::new()),
    }
}

// ============================================================================
// SHARED TEXT HELPERS
// ============================================================================

/// Two decimals, never "-0.00"
pub fn format_amount(amount: Decimal) -> String {
    let rounded = amount.round_dp(2);
    if rounded.is_zero() {
        "0.00".to_string()
    } else {
        format!("{:.2}", rounded)
    }
}

/// Entity-escape `& < > " '` and flatten line breaks for single-line SGML values
pub fn escape_markup(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            '\r' | '\n' | '\t' => out.push(' '),
            c if c.is_control() => {}
            c => out.push(c),
        }
    }
    out
}

/// `incoming/x/Statement Jan.pdf` → `Statement Jan`
pub fn file_stem_of(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let stem = match base.rfind('.') {
        Some(0) | None => base,
        Some(pos) => &base[..pos],
    };
    if stem.is_empty() {
        "statement".to_string()
    } else {
        stem.to_string()
    }
}
