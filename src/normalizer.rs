// 🧮 Transaction Normalizer - RawTableRow → Transaction
//
// Never fails: OCR garbage in an amount becomes zero, a garbage date becomes
// None. Rows whose shape is suspicious are still carried but flagged so a
// human can look at them.

use chrono::NaiveDate;
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::LazyLock;
use tracing::warn;

use crate::parser::RawTableRow;

/// IIF payee (NAME) column limit
pub const PAYEE_MAX_LEN: usize = 40;

// ============================================================================
// CORE TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReviewFlag {
    /// Both deposit and withdrawal were non-zero; the deposit was used
    DepositAndWithdrawal,

    /// The date cell could not be read as M/D
    UnparseableDate,
}

impl ReviewFlag {
    pub fn describe(&self) -> &'static str {
        match self {
            ReviewFlag::DepositAndWithdrawal => "deposit and withdrawal both present",
            ReviewFlag::UnparseableDate => "date could not be parsed",
        }
    }
}

/// Transaction - canonical, immutable once normalized
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub date: Option<NaiveDate>,
    pub check_number: Option<String>,
    pub description: String,

    /// Positive = deposit/credit, negative = withdrawal/debit
    pub amount: Decimal,

    /// As printed on the statement; carried, never recomputed
    pub running_balance: Decimal,

    /// Derived from the description, never source-provided
    pub payee: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<ReviewFlag>,
}

impl Transaction {
    pub fn is_credit(&self) -> bool {
        self.amount > Decimal::ZERO
    }

    pub fn is_debit(&self) -> bool {
        self.amount < Decimal::ZERO
    }

    pub fn needs_review(&self) -> bool {
        !self.flags.is_empty()
    }

    /// MM/DD/YYYY, as IIF wants it
    pub fn iif_date(&self) -> String {
        format_iif_date(self.date)
    }

    /// YYYYMMDD, as OFX wants it
    pub fn ofx_date(&self) -> String {
        format_ofx_date(self.date)
    }
}

// ============================================================================
// DATE FORMATTING (two views of the same date, nothing stored twice)
// ============================================================================

pub fn format_iif_date(date: Option<NaiveDate>) -> String {
    date.map(|d| d.format("%m/%d/%Y").to_string())
        .unwrap_or_default()
}

pub fn format_ofx_date(date: Option<NaiveDate>) -> String {
    date.map(|d| d.format("%Y%m%d").to_string())
        .unwrap_or_default()
}

// ============================================================================
// FIELD PARSERS
// ============================================================================

/// `"$1,250.00"` → 1250.00, `"(89.32)"` → -89.32, garbage → 0
pub fn parse_amount(raw: &str) -> Decimal {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Decimal::ZERO;
    }

    let negative = trimmed.starts_with('-')
        || trimmed.ends_with('-')
        || (trimmed.starts_with('(') && trimmed.ends_with(')'));

    let digits: String = trimmed
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();

    match Decimal::from_str(&digits) {
        Ok(value) if negative && !value.is_zero() => -value,
        Ok(value) => value,
        Err(_) => Decimal::ZERO,
    }
}

/// Statement dates are `M/D`. The year comes from configuration unless the
/// cell itself carries one (`M/D/YY` or `M/D/YYYY`).
pub fn parse_statement_date(raw: &str, year: i32) -> Option<NaiveDate> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '/')
        .collect();

    let mut parts = cleaned.split('/');
    let month: u32 = parts.next()?.parse().ok()?;
    let day: u32 = parts.next()?.parse().ok()?;
    let year = match parts.next() {
        Some(y) if y.len() == 2 => 2000 + y.parse::<i32>().ok()?,
        Some(y) if y.len() == 4 => y.parse::<i32>().ok()?,
        Some("") | None => year,
        Some(_) => return None,
    };

    NaiveDate::from_ymd_opt(year, month, day)
}

// ============================================================================
// PAYEE EXTRACTION
// ============================================================================

/// Boilerplate the bank prepends to descriptions. Order matters: first match wins.
static PAYEE_PREFIXES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)^Purchase authorized on \d{1,2}/\d{1,2}\s+",
        r"(?i)^Recurring Payment authorized on (?:\d{1,2}/\d{1,2}\s+)?",
        r"(?i)^Non-WF ATM Withdrawal authorized on (?:\d{1,2}/\d{1,2}\s+)?",
        r"(?i)^Online Transfer to\s+",
        r"(?i)^eDeposit\s+",
        r"(?i)^Cash eWithdrawal\s+",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("payee prefix pattern"))
    .collect()
});

/// " WA S304..." : state code, location marker letter, digit
static LOCATION_TAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s[A-Z]{2}\s[A-Z]\d").expect("location tail pattern"));

/// Heuristic payee from a description. Wrong answers are expected now and then.
pub fn extract_payee(description: &str) -> String {
    let desc = description.trim();

    let stripped = PAYEE_PREFIXES
        .iter()
        .find_map(|re| re.find(desc).map(|m| &desc[m.end()..]))
        .unwrap_or(desc);

    let cut = match LOCATION_TAIL.find(stripped) {
        Some(m) => &stripped[..m.start()],
        None => stripped,
    };

    let payee = cut.split_whitespace().collect::<Vec<_>>().join(" ");
    let payee = if payee.is_empty() {
        desc.split_whitespace().collect::<Vec<_>>().join(" ")
    } else {
        payee
    };

    truncate_chars(&payee, PAYEE_MAX_LEN)
}

/// Char-safe truncation (descriptions are not guaranteed ASCII)
pub fn truncate_chars(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}

// ============================================================================
// NORMALIZER
// ============================================================================

pub struct Normalizer {
    /// Statement year; the pipeline never guesses it from the data
    pub year: i32,
}

impl Normalizer {
    pub fn new(year: i32) -> Self {
        Normalizer { year }
    }

    pub fn normalize(&self, row: &RawTableRow) -> Transaction {
        let mut flags = Vec::new();

        let deposit = parse_amount(&row.deposit).abs();
        let withdrawal = parse_amount(&row.withdrawal).abs();

        // Deposit wins. Both present is suspicious, so flag instead of guessing more.
        let amount = if deposit > Decimal::ZERO {
            if withdrawal > Decimal::ZERO {
                warn!(
                    line = row.line_number,
                    %deposit,
                    %withdrawal,
                    "Row has both deposit and withdrawal; using deposit"
                );
                flags.push(ReviewFlag::DepositAndWithdrawal);
            }
            deposit
        } else if withdrawal > Decimal::ZERO {
            -withdrawal
        } else {
            Decimal::ZERO
        };

        let date = parse_statement_date(&row.date, self.year);
        if date.is_none() {
            warn!(line = row.line_number, date = %row.date, "Unparseable statement date");
            flags.push(ReviewFlag::UnparseableDate);
        }

        let check_number = Some(row.check_number.trim())
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        Transaction {
            date,
            check_number,
            description: row.description.trim().to_string(),
            amount,
            running_balance: parse_amount(&row.balance),
            payee: extract_payee(&row.description),
            flags,
        }
    }

    pub fn normalize_table(&self, rows: &[RawTableRow]) -> Vec<Transaction> {
        rows.iter().map(|row| self.normalize(row)).collect()
    }
}

// ============================================================================
// TESTS
// ============================================================================
