// 📒 Ledger Consolidator - many tables → one ordered ledger
//
// Tables are concatenated in the order given. No sorting by date, no dedup,
// no balance reconciliation (see continuity.rs for the optional report).

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::normalizer::Transaction;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Ledger {
    transactions: Vec<Transaction>,
    total_deposits: Decimal,
    total_withdrawals: Decimal,
    net_change: Decimal,
    transaction_count: usize,
}

impl Ledger {
    /// Concatenate per-table transaction lists in input order
    pub fn consolidate<I>(tables: I) -> Self
    where
        I: IntoIterator<Item = Vec<Transaction>>,
    {
        let transactions: Vec<Transaction> = tables.into_iter().flatten().collect();
        Ledger::from_transactions(transactions)
    }

    pub fn from_transactions(transactions: Vec<Transaction>) -> Self {
        let total_deposits: Decimal = transactions
            .iter()
            .filter(|tx| tx.is_credit())
            .map(|tx| tx.amount)
            .sum();

        // Stored as a positive magnitude
        let total_withdrawals: Decimal = transactions
            .iter()
            .filter(|tx| tx.is_debit())
            .map(|tx| -tx.amount)
            .sum();

        Ledger {
            transaction_count: transactions.len(),
            net_change: total_deposits - total_withdrawals,
            total_deposits,
            total_withdrawals,
            transactions,
        }
    }

    pub fn empty() -> Self {
        Ledger::from_transactions(Vec::new())
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn total_deposits(&self) -> Decimal {
        self.total_deposits
    }

    pub fn total_withdrawals(&self) -> Decimal {
        self.total_withdrawals
    }

    pub fn net_change(&self) -> Decimal {
        self.net_change
    }

    pub fn transaction_count(&self) -> usize {
        self.transaction_count
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Date of the first transaction that has one (source order, not min)
    pub fn first_date(&self) -> Option<NaiveDate> {
        self.transactions.iter().find_map(|tx| tx.date)
    }

    /// Date of the last transaction that has one (source order, not max)
    pub fn last_date(&self) -> Option<NaiveDate> {
        self.transactions.iter().rev().find_map(|tx| tx.date)
    }

    /// Running balance printed on the last row
    pub fn closing_balance(&self) -> Option<Decimal> {
        self.transactions.last().map(|tx| tx.running_balance)
    }

    pub fn review_count(&self) -> usize {
        self.transactions.iter().filter(|tx| tx.needs_review()).count()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} transactions, deposits ${:.2}, withdrawals ${:.2}, net ${:.2}, {} flagged for review",
            self.transaction_count,
            self.total_deposits,
            self.total_withdrawals,
            self.net_change,
            self.review_count()
        )
    }
}

impl Default for Ledger {
    fn default() -> Self {
        Self::empty()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn tx(day: u32, amount: &str, balance: &str) -> Transaction {
        Transaction {
            date: NaiveDate::from_ymd_opt(2024, 1, day),
            check_number: None,
            description: format!("Test transaction {}", day),
            amount: Decimal::from_str(amount).unwrap(),
            running_balance: Decimal::from_str(balance).unwrap(),
            payee: "Test".to_string(),
            flags: vec![],
        }
    }

    #[test]
    fn test_consolidate_preserves_table_then_row_order() {
        let ledger = Ledger::consolidate(vec![
            vec![tx(20, "1.00", "0"), tx(21, "2.00", "0")],
            vec![tx(5, "3.00", "0")],
        ]);

        let days: Vec<u32> = ledger
            .transactions()
            .iter()
            .map(|t| chrono::Datelike::day(&t.date.unwrap()))
            .collect();
        // Not re-sorted: the later table's earlier date stays last
        assert_eq!(days, vec![20, 21, 5]);
    }

    #[test]
    fn test_aggregates_balance_exactly() {
        let ledger = Ledger::from_transactions(vec![
            tx(1, "1250.00", "1250.00"),
            tx(2, "-89.32", "1160.68"),
            tx(3, "0.10", "1160.78"),
            tx(4, "-0.20", "1160.58"),
        ]);

        assert_eq!(ledger.total_deposits(), Decimal::from_str("1250.10").unwrap());
        assert_eq!(ledger.total_withdrawals(), Decimal::from_str("89.52").unwrap());
        assert_eq!(
            ledger.total_deposits() - ledger.total_withdrawals(),
            ledger.net_change()
        );
        assert_eq!(ledger.net_change(), Decimal::from_str("1160.58").unwrap());
        assert_eq!(ledger.transaction_count(), 4);
        assert_eq!(ledger.closing_balance(), Some(Decimal::from_str("1160.58").unwrap()));
    }

    #[test]
    fn test_empty_ledger() {
        let ledger = Ledger::consolidate(Vec::<Vec<Transaction>>::new());
        assert!(ledger.is_empty());
        assert_eq!(ledger.net_change(), Decimal::ZERO);
        assert_eq!(ledger.first_date(), None);
        assert_eq!(ledger.closing_balance(), None);
    }

    #[test]
    fn test_first_and_last_date_follow_source_order() {
        let ledger = Ledger::from_transactions(vec![tx(9, "1", "0"), tx(3, "1", "0")]);
        assert_eq!(ledger.first_date(), NaiveDate::from_ymd_opt(2024, 1, 9));
        assert_eq!(ledger.last_date(), NaiveDate::from_ymd_opt(2024, 1, 3));
    }
}
