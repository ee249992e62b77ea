// OFX 1.0.2 SGML bank statement, plus the QBO dialect QuickBooks Online imports.
//
// QBO is the same document with an INTU.BID signon element, a different
// content type and a .qbo extension. It is always built from the real ledger.

use anyhow::Result;
use chrono::NaiveDate;

use super::{escape_markup, format_amount, Artifact, EmitRequest, Emitter, OutputFormat};
use crate::ledger::Ledger;
use crate::normalizer::{format_ofx_date, truncate_chars};

/// OFX 1.0.2 NAME field limit
pub const OFX_NAME_MAX_LEN: usize = 32;

/// OFX 1.0.2 MEMO field limit
pub const OFX_MEMO_MAX_LEN: usize = 255;

const OFX_HEADER: [&str; 9] = [
    "OFXHEADER:100",
    "DATA:OFXSGML",
    "VERSION:102",
    "SECURITY:NONE",
    "ENCODING:USASCII",
    "CHARSET:1252",
    "COMPRESSION:NONE",
    "OLDFILEUID:NONE",
    "NEWFILEUID:NONE",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfxDialect {
    Ofx,
    Qbo,
}

pub struct OfxEmitter {
    dialect: OfxDialect,
}

impl OfxEmitter {
    pub fn new(dialect: OfxDialect) -> Self {
        OfxEmitter { dialect }
    }
}

impl Emitter for OfxEmitter {
    fn format(&self) -> OutputFormat {
        match self.dialect {
            OfxDialect::Ofx => OutputFormat::Ofx,
            OfxDialect::Qbo => OutputFormat::Qbo,
        }
    }

    fn emit(&self, ledger: &Ledger, request: &EmitRequest<'_>) -> Result<Artifact> {
        let account = request.account;
        let today = request.generated_at.date_naive();

        // Rows without a date borrow the statement's first date so FITIDs
        // stay stable across runs
        let fallback_date = ledger.first_date().unwrap_or(today);
        let posted = |date: Option<NaiveDate>| format_ofx_date(Some(date.unwrap_or(fallback_date)));

        let mut doc = SgmlWriter::new();
        for line in OFX_HEADER {
            doc.raw(line);
        }
        doc.raw("");

        doc.open("OFX");

        // Signon: no credentials, always success
        doc.open("SIGNONMSGSRSV1");
        doc.open("SONRS");
        write_status(&mut doc);
        doc.field("DTSERVER", &request.generated_at.format("%Y%m%d%H%M%S").to_string());
        doc.field("LANGUAGE", "ENG");
        doc.open("FI");
        doc.field("ORG", &escape_markup(&account.bank_name));
        doc.field("FID", &escape_markup(&account.bank_id));
        doc.close("FI");
        if self.dialect == OfxDialect::Qbo {
            doc.field("INTU.BID", &escape_markup(&account.intu_bid));
        }
        doc.close("SONRS");
        doc.close("SIGNONMSGSRSV1");

        doc.open("BANKMSGSRSV1");
        doc.open("STMTTRNRS");
        doc.field("TRNUID", "1");
        write_status(&mut doc);
        doc.open("STMTRS");
        doc.field("CURDEF", &escape_markup(&account.currency));

        doc.open("BANKACCTFROM");
        doc.field("BANKID", &escape_markup(&account.bank_id));
        doc.field("ACCTID", &escape_markup(&account.account_id));
        doc.field("ACCTTYPE", &escape_markup(&account.account_type));
        doc.close("BANKACCTFROM");

        doc.open("BANKTRANLIST");
        doc.field("DTSTART", &posted(ledger.first_date()));
        doc.field("DTEND", &posted(ledger.last_date()));

        for (index, tx) in ledger.transactions().iter().enumerate() {
            let dt_posted = posted(tx.date);
            let trntype = if tx.is_debit() { "DEBIT" } else { "CREDIT" };

            doc.open("STMTTRN");
            doc.field("TRNTYPE", trntype);
            doc.field("DTPOSTED", &dt_posted);
            doc.field("TRNAMT", &format_amount(tx.amount));
            // Per-run id: re-running the same ledger regenerates the same FITIDs
            doc.field("FITID", &format!("{}{:06}", dt_posted, index + 1));
            if let Some(check) = &tx.check_number {
                doc.field("CHECKNUM", &escape_markup(check));
            }
            doc.field("NAME", &escape_markup(&truncate_chars(&tx.payee, OFX_NAME_MAX_LEN)));
            if !tx.description.is_empty() {
                doc.field(
                    "MEMO",
                    &escape_markup(&truncate_chars(&tx.description, OFX_MEMO_MAX_LEN)),
                );
            }
            doc.close("STMTTRN");
        }
        doc.close("BANKTRANLIST");

        // Last printed balance, not recomputed
        doc.open("LEDGERBAL");
        doc.field(
            "BALAMT",
            &format_amount(ledger.closing_balance().unwrap_or_default()),
        );
        doc.field("DTASOF", &posted(ledger.last_date()));
        doc.close("LEDGERBAL");

        doc.close("STMTRS");
        doc.close("STMTTRNRS");
        doc.close("BANKMSGSRSV1");
        doc.close("OFX");

        Ok(Artifact::new(self.format(), request.file_stem, doc.finish()))
    }
}

fn write_status(doc: &mut SgmlWriter) {
    doc.open("STATUS");
    doc.field("CODE", "0");
    doc.field("SEVERITY", "INFO");
    doc.close("STATUS");
}

/// Minimal line-oriented SGML builder. OFX 1.x leaf elements carry no end tag.
struct SgmlWriter {
    out: String,
}

impl SgmlWriter {
    fn new() -> Self {
        SgmlWriter { out: String::new() }
    }

    fn raw(&mut self, line: &str) {
        self.out.push_str(line);
        self.out.push_str("\r\n");
    }

    fn open(&mut self, tag: &str) {
        self.raw(&format!("<{}>", tag));
    }

    fn close(&mut self, tag: &str) {
        self.raw(&format!("</{}>", tag));
    }

    fn field(&mut self, tag: &str, value: &str) {
        self.raw(&format!("<{}>{}", tag, value));
    }

    fn finish(self) -> String {
        self.out
    }
}

// ============================================================================
// TESTS
// ============================================================================
