// ⚖️ Balance Continuity - does each printed balance follow from the previous one?
//
//   previous_balance + amount = running_balance
//
// Report only. The ledger is never corrected from this, and a broken chain
// never fails a job. Statements often print a balance only on the last row of
// each day, so empty (zero) balances carry the computed value forward.

use rust_decimal::Decimal;
use serde::Serialize;

use crate::ledger::Ledger;

// ============================================================================
// RESULT TYPES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContinuityBreak {
    /// Position in the ledger (0-based)
    pub index: usize,
    pub expected_balance: Decimal,
    pub reported_balance: Decimal,
    pub difference: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContinuityReport {
    pub checked: usize,
    pub breaks: Vec<ContinuityBreak>,

    /// Balance before the first row, implied from the first printed balance
    pub implied_opening_balance: Option<Decimal>,
    pub closing_balance: Option<Decimal>,
}

impl ContinuityReport {
    pub fn is_continuous(&self) -> bool {
        self.breaks.is_empty()
    }

    pub fn summary(&self) -> String {
        if self.is_continuous() {
            format!("Running balance continuous across {} rows", self.checked)
        } else {
            format!(
                "Running balance breaks at {} of {} rows (first at row {})",
                self.breaks.len(),
                self.checked,
                self.breaks[0].index + 1
            )
        }
    }
}

// ============================================================================
// CONTINUITY ENGINE
// ============================================================================

pub struct ContinuityEngine {
    /// Tolerance for comparisons (default: $0.01)
    pub tolerance: Decimal,
}

impl ContinuityEngine {
    pub fn new() -> Self {
        ContinuityEngine {
            tolerance: Decimal::new(1, 2),
        }
    }

    pub fn check(&self, ledger: &Ledger) -> ContinuityReport {
        let mut breaks = Vec::new();
        let mut expected: Option<Decimal> = None;
        let mut checked = 0;
        let mut implied_opening_balance = None;

        for (index, tx) in ledger.transactions().iter().enumerate() {
            let reported = tx.running_balance;
            let printed = !reported.is_zero();

            match expected {
                Some(previous) => {
                    let computed = previous + tx.amount;
                    if printed {
                        checked += 1;
                        let difference = (computed - reported).abs();
                        if difference > self.tolerance {
                            breaks.push(ContinuityBreak {
                                index,
                                expected_balance: computed,
                                reported_balance: reported,
                                difference,
                            });
                        }
                        // Trust the statement from here on
                        expected = Some(reported);
                    } else {
                        expected = Some(computed);
                    }
                }
                None if printed => {
                    implied_opening_balance = Some(reported - tx.amount);
                    expected = Some(reported);
                }
                None => {}
            }
        }

        ContinuityReport {
            checked,
            breaks,
            implied_opening_balance,
            closing_balance: ledger.closing_balance(),
        }
    }
}

impl Default for ContinuityEngine {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================
