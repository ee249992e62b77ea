// QuickBooks Desktop IIF: tab-delimited, one TRNS/SPL/ENDTRNS triple per transaction.
//
// The SPL line carries the negated amount against "Uncategorized" so every
// transaction balances to zero, which QuickBooks requires for bank imports.

use anyhow::Result;

use super::{format_amount, Artifact, EmitRequest, Emitter, OutputFormat};
use crate::ledger::Ledger;
use crate::normalizer::truncate_chars;

pub const IIF_MEMO_MAX_LEN: usize = 100;
pub const SPLIT_ACCOUNT: &str = "Uncategorized";

const HEADER_TRNS: [&str; 9] = [
    "!TRNS", "TRNSID", "TRNSTYPE", "DATE", "ACCNT", "NAME", "AMOUNT", "DOCNUM", "MEMO",
];
const HEADER_SPL: [&str; 9] = [
    "!SPL", "SPLID", "TRNSTYPE", "DATE", "ACCNT", "NAME", "AMOUNT", "DOCNUM", "MEMO",
];

pub struct IifEmitter;

impl IifEmitter {
    pub fn new() -> Self {
        IifEmitter
    }
}

impl Default for IifEmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl Emitter for IifEmitter {
    fn format(&self) -> OutputFormat {
        OutputFormat::Iif
    }

    fn emit(&self, ledger: &Ledger, request: &EmitRequest<'_>) -> Result<Artifact> {
        let account = clean(&request.account.iif_account);
        let mut out = String::new();

        push_line(&mut out, &HEADER_TRNS);
        push_line(&mut out, &HEADER_SPL);
        push_line(&mut out, &["!ENDTRNS"]);

        for tx in ledger.transactions() {
            let trnstype = if tx.is_debit() { "CHECK" } else { "DEPOSIT" };
            let date = tx.iif_date();
            let name = clean(&tx.payee);
            let docnum = clean(tx.check_number.as_deref().unwrap_or(""));
            let memo = clean(&truncate_chars(&tx.description, IIF_MEMO_MAX_LEN));

            let amount = format_amount(tx.amount);
            let split_amount = format_amount(-tx.amount);

            push_line(
                &mut out,
                &[
                    "TRNS",
                    "",
                    trnstype,
                    date.as_str(),
                    account.as_str(),
                    name.as_str(),
                    amount.as_str(),
                    docnum.as_str(),
                    memo.as_str(),
                ],
            );
            push_line(
                &mut out,
                &[
                    "SPL",
                    "",
                    trnstype,
                    date.as_str(),
                    SPLIT_ACCOUNT,
                    name.as_str(),
                    split_amount.as_str(),
                    docnum.as_str(),
                    memo.as_str(),
                ],
            );
            push_line(&mut out, &["ENDTRNS"]);
        }

        Ok(Artifact::new(OutputFormat::Iif, request.file_stem, out))
    }
}

fn push_line(out: &mut String, fields: &[&str]) {
    out.push_str(&fields.join("\t"));
    out.push('\n');
}

/// Tabs and line breaks would shift columns; IIF has no escaping
fn clean(value: &str) -> String {
    value
        .chars()
        .map(|c| if c == '\t' || c == '\r' || c == '\n' { ' ' } else { c })
        .collect::<String>()
        .trim()
        .to_string()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emit::AccountConfig;
    use crate::normalizer::Transaction;
    use chrono::{NaiveDate, Utc};
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn tx(amount: &str, description: &str) -> Transaction {
        Transaction {
            date: NaiveDate::from_ymd_opt(2024, 1, 3),
            check_number: None,
            description: description.to_string(),
            amount: Decimal::from_str(amount).unwrap(),
            running_balance: Decimal::ZERO,
            payee: "Grocer".to_string(),
            flags: vec![],
        }
    }

    fn emit(ledger: &Ledger) -> String {
        let account = AccountConfig::default();
        let request = EmitRequest {
            account: &account,
            file_stem: "jan",
            generated_at: Utc::now(),
        };
        IifEmitter::new().emit(ledger, &request).unwrap().body
    }

    #[test]
    fn test_header_rows() {
        let body = emit(&Ledger::empty());
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "!TRNS\tTRNSID\tTRNSTYPE\tDATE\tACCNT\tNAME\tAMOUNT\tDOCNUM\tMEMO");
        assert_eq!(lines[1], "!SPL\tSPLID\tTRNSTYPE\tDATE\tACCNT\tNAME\tAMOUNT\tDOCNUM\tMEMO");
        assert_eq!(lines[2], "!ENDTRNS");
        assert!(!body.contains('\r'));
    }

    #[test]
    fn test_withdrawal_triple() {
        let body = emit(&Ledger::from_transactions(vec![tx("-89.32", "Grocer run")]));
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines[3], "TRNS\t\tCHECK\t01/03/2024\tChecking\tGrocer\t-89.32\t\tGrocer run");
        assert_eq!(lines[4], "SPL\t\tCHECK\t01/03/2024\tUncategorized\tGrocer\t89.32\t\tGrocer run");
        assert_eq!(lines[5], "ENDTRNS");
    }

    #[test]
    fn test_deposit_type_and_docnum() {
        let mut t = tx("1250.00", "Payroll");
        t.check_number = Some("1042".to_string());
        let body = emit(&Ledger::from_transactions(vec![t]));
        let trns: Vec<&str> = body.lines().nth(3).unwrap().split('\t').collect();
        assert_eq!(trns[2], "DEPOSIT");
        assert_eq!(trns[6], "1250.00");
        assert_eq!(trns[7], "1042");
    }

    #[test]
    fn test_memo_truncated_and_tabs_cleaned() {
        let long = format!("a\tb{}", "x".repeat(200));
        let body = emit(&Ledger::from_transactions(vec![tx("-1.00", &long)]));
        let trns: Vec<&str> = body.lines().nth(3).unwrap().split('\t').collect();
        assert_eq!(trns.len(), 9);
        assert_eq!(trns[8].chars().count(), IIF_MEMO_MAX_LEN);
        assert!(trns[8].starts_with("a b"));
    }

    #[test]
    fn test_zero_amount_is_deposit() {
        let body = emit(&Ledger::from_transactions(vec![tx("0.00", "Fee reversal")]));
        let trns: Vec<&str> = body.lines().nth(3).unwrap().split('\t').collect();
        assert_eq!(trns[2], "DEPOSIT");
    }
}
