use chrono::NaiveDate;
use mietwerk_core::{BankTransaction, Payment};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecurringInterval {
    Monthly,
    Variable,
}

impl RecurringInterval {
    pub fn as_str(self) -> &'static str {
        match self {
            RecurringInterval::Monthly => "monthly",
            RecurringInterval::Variable => "variable",
        }
    }
}

/// Periodicity and text signature inferred from a payment's matched
/// history. Only ever produced when at least two confirming transactions
/// exist; insufficient history is `None`, never a guess.
#[derive(Debug, Clone)]
pub struct RecurringPattern {
    pub interval: RecurringInterval,
    pub average_interval_days: f64,
    /// Words shared (as mutual substrings) by every confirming transaction.
    pub common_text: String,
    /// Booking date of the most recent confirming transaction.
    pub last_seen: NaiveDate,
    /// Saturates at three confirming matches.
    pub confidence: f64,
}

const AMOUNT_WINDOW: f64 = 0.10;
const MONTHLY_MEAN_RANGE: std::ops::RangeInclusive<f64> = 25.0..=35.0;
const SATURATION_COUNT: f64 = 3.0;

/// Looks for a recurring signature for `payment` in the account's matched
/// transaction history: already-matched rows whose absolute amount lies
/// within 10% of the expected amount and which precede the payment's due
/// date.
pub fn detect_recurring_pattern(
    payment: &Payment,
    history: &[BankTransaction],
) -> Option<RecurringPattern> {
    let expected = payment.expected_amount.abs().to_f64();
    if expected == 0.0 {
        return None;
    }

    let mut confirming: Vec<&BankTransaction> = history
        .iter()
        .filter(|tx| tx.matched)
        .filter(|tx| tx.booking_date < payment.due_date)
        .filter(|tx| {
            let amount = tx.amount.abs().to_f64();
            (amount - expected).abs() / expected <= AMOUNT_WINDOW
        })
        .collect();

    if confirming.len() < 2 {
        return None;
    }
    confirming.sort_by_key(|tx| tx.booking_date);

    let gaps: Vec<i64> = confirming
        .windows(2)
        .map(|pair| (pair[1].booking_date - pair[0].booking_date).num_days())
        .collect();
    let average_interval_days = gaps.iter().sum::<i64>() as f64 / gaps.len() as f64;

    let interval = if MONTHLY_MEAN_RANGE.contains(&average_interval_days) {
        RecurringInterval::Monthly
    } else {
        RecurringInterval::Variable
    };

    Some(RecurringPattern {
        interval,
        average_interval_days,
        common_text: common_text(&confirming),
        last_seen: confirming[confirming.len() - 1].booking_date,
        confidence: (confirming.len() as f64 / SATURATION_COUNT).min(1.0),
    })
}

/// Words of the first confirming transaction that survive in every other
/// one, where "survive" means some word there contains it or vice versa.
/// Catches truncated counterparty names ("Mustermann" vs "Musterman GmbH")
/// that an exact set intersection would lose.
fn common_text(confirming: &[&BankTransaction]) -> String {
    let word_lists: Vec<Vec<String>> = confirming
        .iter()
        .map(|tx| {
            format!("{} {}", tx.counterparty, tx.description)
                .to_lowercase()
                .split_whitespace()
                .map(str::to_string)
                .collect()
        })
        .collect();

    let mut shared: Vec<String> = Vec::new();
    for word in &word_lists[0] {
        let everywhere = word_lists[1..].iter().all(|words| {
            words
                .iter()
                .any(|w| w.contains(word.as_str()) || word.contains(w.as_str()))
        });
        if everywhere && !shared.contains(word) {
            shared.push(word.clone());
        }
    }
    shared.join(" ")
}
