use chrono::Datelike;
use serde::Deserialize;

use mietwerk_core::{BankTransaction, Payer, Payment, PaymentId, PaymentKind};

use crate::recurring::{detect_recurring_pattern, RecurringInterval, RecurringPattern};
use crate::similarity::similarity;

/// Tunables for the scoring engine. Defaults mirror the back office's
/// long-standing behavior; a TOML file can override any of them.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// Below this no match is ever proposed, not even as "best".
    pub auto_floor: f64,
    /// Lower bar for human-review suggestions.
    pub suggestion_floor: f64,
    /// Auto-accept threshold for rent payments (recurring bonuses push
    /// legitimate rent scores well past this).
    pub rent_threshold: f64,
    /// Auto-accept threshold for every other payment kind.
    pub default_threshold: f64,
    pub high_confidence: f64,
    pub recurring_flag: f64,
    pub max_suggestions: usize,
    /// Description keywords that indicate rent.
    pub rent_keywords: Vec<String>,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            auto_floor: 50.0,
            suggestion_floor: 40.0,
            rent_threshold: 70.0,
            default_threshold: 80.0,
            high_confidence: 70.0,
            recurring_flag: 80.0,
            max_suggestions: 5,
            rent_keywords: ["miete", "kaltmiete", "warmmiete", "rent"]
                .map(String::from)
                .to_vec(),
        }
    }
}

impl MatchConfig {
    pub fn from_toml(toml_content: &str) -> Result<Self, String> {
        toml::from_str(toml_content).map_err(|e| format!("Failed to parse match config: {e}"))
    }

    pub fn threshold_for(&self, kind: PaymentKind) -> f64 {
        match kind {
            PaymentKind::Rent => self.rent_threshold,
            _ => self.default_threshold,
        }
    }
}

/// One scored (transaction, payment) pairing.
#[derive(Debug, Clone)]
pub struct MatchCandidate {
    pub payment_id: PaymentId,
    pub score: f64,
    pub is_high_confidence: bool,
    pub is_recurring: bool,
}

#[derive(Debug, Default)]
pub struct MatchScorer {
    config: MatchConfig,
}

impl MatchScorer {
    pub fn new(config: MatchConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    /// Weighted confidence that `tx` settles `payment`. Contributions are
    /// additive, not mutually exclusive: amount proximity (max 50), date
    /// proximity (max 30), recurring-pattern bonus (30·confidence + 15),
    /// payer name (max 25), reference similarity (max 20 + 10 month tag),
    /// rent keyword (flat 5).
    pub fn score(
        &self,
        tx: &BankTransaction,
        payment: &Payment,
        pattern: Option<&RecurringPattern>,
        payer: Option<&Payer>,
    ) -> f64 {
        let text = tx.combined_text();

        amount_score(tx, payment)
            + date_score(tx, payment)
            + recurring_bonus(tx, &text, pattern)
            + payer_bonus(&text, payer)
            + reference_score(tx, payment)
            + keyword_bonus(&tx.description, &self.config.rent_keywords)
    }

    fn candidate(&self, payment_id: PaymentId, score: f64) -> MatchCandidate {
        MatchCandidate {
            payment_id,
            score,
            is_high_confidence: score >= self.config.high_confidence,
            is_recurring: score > self.config.recurring_flag,
        }
    }

    /// Best open payment for `tx`, if any clears the hard floor. Paid
    /// payments are never candidates.
    pub fn best_match(
        &self,
        tx: &BankTransaction,
        payments: &[Payment],
        history: &[BankTransaction],
        payers: &[Payer],
    ) -> Option<MatchCandidate> {
        let mut best: Option<MatchCandidate> = None;

        for payment in payments.iter().filter(|p| p.is_open()) {
            let Some(payment_id) = payment.id else {
                continue;
            };
            let pattern = detect_recurring_pattern(payment, history);
            let payer = lookup_payer(payment, payers);
            let score = self.score(tx, payment, pattern.as_ref(), payer);

            let beats_current = best.as_ref().is_none_or(|b| score > b.score);
            if score >= self.config.auto_floor && beats_current {
                best = Some(self.candidate(payment_id, score));
            }
        }

        best
    }

    /// Up to `max_suggestions` candidates above the suggestion floor,
    /// best first. Meant for human review, so the bar is lower than the
    /// auto floor.
    pub fn suggestions(
        &self,
        tx: &BankTransaction,
        payments: &[Payment],
        history: &[BankTransaction],
        payers: &[Payer],
    ) -> Vec<MatchCandidate> {
        let mut candidates: Vec<MatchCandidate> = payments
            .iter()
            .filter(|p| p.is_open())
            .filter_map(|payment| {
                let payment_id = payment.id?;
                let pattern = detect_recurring_pattern(payment, history);
                let payer = lookup_payer(payment, payers);
                let score = self.score(tx, payment, pattern.as_ref(), payer);
                (score >= self.config.suggestion_floor)
                    .then(|| self.candidate(payment_id, score))
            })
            .collect();

        candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
        candidates.truncate(self.config.max_suggestions);
        candidates
    }
}

fn lookup_payer<'a>(payment: &Payment, payers: &'a [Payer]) -> Option<&'a Payer> {
    let payer_id = payment.payer_id?;
    payers.iter().find(|p| p.id == payer_id)
}

fn amount_score(tx: &BankTransaction, payment: &Payment) -> f64 {
    let expected = payment.expected_amount.abs();
    let diff = tx.amount.abs() - expected;
    if diff.abs() <= mietwerk_core::Money::from_cents(1) {
        return 50.0;
    }
    if expected.is_zero() {
        return 0.0;
    }
    let relative = (diff.abs().to_f64()) / expected.to_f64();
    if relative < 0.02 {
        45.0
    } else if relative < 0.05 {
        35.0
    } else if relative < 0.10 {
        20.0
    } else {
        0.0
    }
}

fn date_score(tx: &BankTransaction, payment: &Payment) -> f64 {
    let days = (tx.booking_date - payment.due_date).num_days().abs();
    match days {
        0 => 30.0,
        1..=2 => 25.0,
        3..=5 => 20.0,
        6..=10 => 10.0,
        _ => {
            let same_month = tx.booking_date.year() == payment.due_date.year()
                && tx.booking_date.month() == payment.due_date.month();
            if same_month {
                5.0
            } else {
                0.0
            }
        }
    }
}

fn recurring_bonus(tx: &BankTransaction, text: &str, pattern: Option<&RecurringPattern>) -> f64 {
    let Some(pattern) = pattern else {
        return 0.0;
    };
    let mut bonus = 0.0;
    if !pattern.common_text.is_empty() && similarity(text, &pattern.common_text) > 0.6 {
        bonus += 30.0 * pattern.confidence;
    }
    if pattern.interval == RecurringInterval::Monthly {
        let gap = (tx.booking_date - pattern.last_seen).num_days();
        if (gap - 30).abs() <= 5 {
            bonus += 15.0;
        }
    }
    bonus
}

fn payer_bonus(text: &str, payer: Option<&Payer>) -> f64 {
    let Some(payer) = payer else {
        return 0.0;
    };
    let first = payer.first_name.trim().to_lowercase();
    let last = payer.last_name.trim().to_lowercase();
    let has_first = !first.is_empty() && text.contains(&first);
    let has_last = !last.is_empty() && text.contains(&last);
    match (has_first, has_last) {
        (true, true) => 25.0,
        (false, true) => 20.0,
        (true, false) => 10.0,
        (false, false) => 0.0,
    }
}

fn reference_score(tx: &BankTransaction, payment: &Payment) -> f64 {
    let sim = similarity(&tx.reference, &payment.reference_text);
    let mut score = if sim > 0.8 {
        20.0
    } else if sim > 0.6 {
        15.0
    } else if sim > 0.4 {
        10.0
    } else {
        0.0
    };

    let month_tag = payment.month_tag();
    if !month_tag.is_empty() {
        let stripped: String = tx
            .reference
            .to_lowercase()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();
        if stripped.contains(&month_tag.to_lowercase()) {
            score += 10.0;
        }
    }
    score
}

fn keyword_bonus(description: &str, keywords: &[String]) -> f64 {
    let description = description.to_lowercase();
    if keywords.iter().any(|k| description.contains(k.as_str())) {
        5.0
    } else {
        0.0
    }
}
