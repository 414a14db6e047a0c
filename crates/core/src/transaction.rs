use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::money::Money;
use super::payment::PaymentId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId(pub i64);

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One parsed bank statement line. Immutable after import except for the
/// match-state pair, which only moves through `link`/`unlink`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankTransaction {
    pub id: Option<TransactionId>,
    pub account_iban: String,
    pub booking_date: NaiveDate,
    pub value_date: Option<NaiveDate>,
    /// Signed; positive = inbound.
    pub amount: Money,
    pub description: String,
    pub counterparty: String,
    pub reference: String,
    pub matched: bool,
    pub matched_payment_id: Option<PaymentId>,
}

impl BankTransaction {
    pub fn is_matched(&self) -> bool {
        self.matched
    }

    /// Marks the transaction as settled against `payment`. Keeps the
    /// invariant `matched == matched_payment_id.is_some()`.
    pub fn link(&mut self, payment: PaymentId) {
        self.matched = true;
        self.matched_payment_id = Some(payment);
    }

    pub fn unlink(&mut self) {
        self.matched = false;
        self.matched_payment_id = None;
    }

    /// Lowercased counterparty + description + reference, the haystack for
    /// every free-text signal in the match scorer.
    pub fn combined_text(&self) -> String {
        format!(
            "{} {} {}",
            self.counterparty, self.description, self.reference
        )
        .to_lowercase()
    }

    /// Two statement lines count as the same booking when the booking date
    /// matches, the amount agrees within a cent, and the reference text is
    /// identical.
    pub fn is_duplicate_of(&self, other: &BankTransaction) -> bool {
        self.booking_date == other.booking_date
            && self.amount.approx_eq(other.amount)
            && self.reference == other.reference
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(date: (i32, u32, u32), cents: i64, reference: &str) -> BankTransaction {
        BankTransaction {
            id: None,
            account_iban: "DE02120300000000202051".to_string(),
            booking_date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
            value_date: None,
            amount: Money::from_cents(cents),
            description: "Dauerauftrag".to_string(),
            counterparty: "Max Mustermann".to_string(),
            reference: reference.to_string(),
            matched: false,
            matched_payment_id: None,
        }
    }

    #[test]
    fn link_and_unlink_keep_invariant() {
        let mut t = tx((2024, 3, 1), 75000, "Miete März");
        t.link(PaymentId(7));
        assert!(t.matched);
        assert_eq!(t.matched_payment_id, Some(PaymentId(7)));

        t.unlink();
        assert!(!t.matched);
        assert_eq!(t.matched_payment_id, None);
    }

    #[test]
    fn combined_text_is_lowercased() {
        let t = tx((2024, 3, 1), 75000, "Miete März");
        let text = t.combined_text();
        assert!(text.contains("max mustermann"));
        assert!(text.contains("miete märz"));
    }

    #[test]
    fn duplicate_requires_all_three_fields() {
        let a = tx((2024, 3, 1), 75000, "Miete März");
        assert!(a.is_duplicate_of(&tx((2024, 3, 1), 75000, "Miete März")));
        // One cent off still counts as duplicate.
        assert!(a.is_duplicate_of(&tx((2024, 3, 1), 75001, "Miete März")));
        assert!(!a.is_duplicate_of(&tx((2024, 3, 2), 75000, "Miete März")));
        assert!(!a.is_duplicate_of(&tx((2024, 3, 1), 75000, "Miete April")));
        assert!(!a.is_duplicate_of(&tx((2024, 3, 1), 74000, "Miete März")));
    }
}
