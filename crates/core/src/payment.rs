use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::money::Money;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PaymentId(pub i64);

impl fmt::Display for PaymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PayerId(pub i64);

impl fmt::Display for PayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentStatus {
    Pending,
    Partial,
    Paid,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Partial => "partial",
            PaymentStatus::Paid => "paid",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "partial" => Ok(PaymentStatus::Partial),
            "paid" => Ok(PaymentStatus::Paid),
            other => Err(format!("unknown payment status: '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentKind {
    Rent,
    OperatingCosts,
    Deposit,
    Other,
}

impl PaymentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentKind::Rent => "rent",
            PaymentKind::OperatingCosts => "operating_costs",
            PaymentKind::Deposit => "deposit",
            PaymentKind::Other => "other",
        }
    }
}

impl fmt::Display for PaymentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PaymentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rent" => Ok(PaymentKind::Rent),
            "operating_costs" => Ok(PaymentKind::OperatingCosts),
            "deposit" => Ok(PaymentKind::Deposit),
            "other" => Ok(PaymentKind::Other),
            other => Err(format!("unknown payment kind: '{other}'")),
        }
    }
}

/// The single status derivation used by both the match and the unmatch
/// path, so the two can never disagree at the exact-equality boundary.
pub fn derive_status(paid: Money, expected: Money) -> PaymentStatus {
    if paid >= expected {
        PaymentStatus::Paid
    } else if paid > Money::zero() {
        PaymentStatus::Partial
    } else {
        PaymentStatus::Pending
    }
}

/// An expected, possibly partially settled, receivable (e.g. one month of
/// rent for one unit). Owned by the entity store; this core only mutates
/// `paid_amount`/`status` as a side effect of match and unmatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Option<PaymentId>,
    pub payer_id: Option<PayerId>,
    pub unit_id: Option<i64>,
    pub kind: PaymentKind,
    pub expected_amount: Money,
    pub paid_amount: Money,
    pub status: PaymentStatus,
    pub due_date: NaiveDate,
    pub reference_text: String,
    /// "YYYY-MM" of the period this receivable covers.
    pub payment_month: String,
    /// Bumped by the store on every write; optimistic-locking guard.
    pub version: i64,
}

impl Payment {
    pub fn is_open(&self) -> bool {
        self.status != PaymentStatus::Paid
    }

    /// Books an inbound amount against this receivable.
    pub fn apply_receipt(&mut self, amount: Money) {
        self.paid_amount = self.paid_amount + amount;
        self.status = derive_status(self.paid_amount, self.expected_amount);
    }

    /// Reverts a previously booked amount; floors at zero.
    pub fn revert_receipt(&mut self, amount: Money) {
        self.paid_amount = (self.paid_amount - amount).max(Money::zero());
        self.status = derive_status(self.paid_amount, self.expected_amount);
    }

    /// The payment month with separators stripped ("2024-03" -> "202403"),
    /// as rent references often embed it that way.
    pub fn month_tag(&self) -> String {
        self.payment_month
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect()
    }
}

/// Directory entry for the tenant expected to pay; only the name parts are
/// relevant to this core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payer {
    pub id: PayerId,
    pub first_name: String,
    pub last_name: String,
}
