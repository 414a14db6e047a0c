use thiserror::Error;

use mietwerk_core::{BankTransaction, Payment, PaymentId, TransactionId};
use mietwerk_import::{dedupe, parse_statement, ImportError};
use mietwerk_match::{MatchCandidate, MatchConfig, MatchScorer};

use crate::store::{ReconStore, StoreError};

#[derive(Error, Debug)]
pub enum ReconError {
    #[error("transaction {0} not found")]
    TransactionNotFound(TransactionId),
    #[error("payment {0} not found")]
    PaymentNotFound(PaymentId),
    #[error("transaction {0} is not matched")]
    NotMatched(TransactionId),
    #[error("transaction {0} is already matched; unmatch it first")]
    AlreadyMatched(TransactionId),
    #[error(transparent)]
    Import(#[from] ImportError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Counts reported by the bulk import boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportOutcome {
    pub imported: usize,
    pub matched: usize,
    /// Unparseable rows plus suppressed duplicates.
    pub skipped: usize,
}

/// Orchestrates parsing, scoring and the match/unmatch state transitions
/// over an injected store. All decisions happen in memory on a snapshot;
/// writes go through `commit_match`, which is atomic per pair.
pub struct Reconciler<S: ReconStore> {
    store: S,
    scorer: MatchScorer,
}

impl<S: ReconStore> Reconciler<S> {
    pub fn new(store: S) -> Self {
        Self::with_config(store, MatchConfig::default())
    }

    pub fn with_config(store: S, config: MatchConfig) -> Self {
        Self {
            store,
            scorer: MatchScorer::new(config),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Best candidate for one transaction, or `None` when nothing clears
    /// the hard floor.
    pub async fn find_matching_payment(
        &self,
        tx_id: TransactionId,
    ) -> Result<Option<MatchCandidate>, ReconError> {
        let tx = self.require_transaction(tx_id).await?;
        let payments = self.store.open_payments().await?;
        let history = self.store.matched_transactions().await?;
        let payers = self.store.payers().await?;
        Ok(self.scorer.best_match(&tx, &payments, &history, &payers))
    }

    /// Up to five ranked candidates above the (lower) suggestion floor,
    /// for human review.
    pub async fn find_match_suggestions(
        &self,
        tx_id: TransactionId,
    ) -> Result<Vec<MatchCandidate>, ReconError> {
        let tx = self.require_transaction(tx_id).await?;
        let payments = self.store.open_payments().await?;
        let history = self.store.matched_transactions().await?;
        let payers = self.store.payers().await?;
        Ok(self.scorer.suggestions(&tx, &payments, &history, &payers))
    }

    /// Settles `tx_id` against `payment_id`: links the transaction, books
    /// its absolute amount onto the payment, derives the new status. The
    /// write is atomic; an optimistic-lock miss is retried once against
    /// the re-read payment.
    pub async fn match_transaction(
        &self,
        tx_id: TransactionId,
        payment_id: PaymentId,
    ) -> Result<(), ReconError> {
        let mut tx = self.require_transaction(tx_id).await?;
        // Relinking would leave the first payment's balance inflated with
        // nothing left to revert it; the caller has to unmatch first.
        if tx.matched {
            return Err(ReconError::AlreadyMatched(tx_id));
        }
        let payment = self.require_payment(payment_id).await?;

        tx.link(payment_id);
        let apply = |mut p: Payment, tx: &BankTransaction| {
            p.apply_receipt(tx.amount.abs());
            p
        };
        self.commit_with_retry(&tx, payment, apply).await
    }

    /// Inverse of `match_transaction` for the same pair: books the amount
    /// back off the linked payment (floored at zero), re-derives status
    /// through the same derivation, clears the transaction's match state.
    pub async fn unmatch_transaction(&self, tx_id: TransactionId) -> Result<(), ReconError> {
        let mut tx = self.require_transaction(tx_id).await?;
        let payment_id = tx
            .matched_payment_id
            .ok_or(ReconError::NotMatched(tx_id))?;
        let payment = self.require_payment(payment_id).await?;

        tx.unlink();
        let revert = |mut p: Payment, tx: &BankTransaction| {
            p.revert_receipt(tx.amount.abs());
            p
        };
        self.commit_with_retry(&tx, payment, revert).await
    }

    /// Walks every unmatched inbound transaction sequentially and commits
    /// the best candidate when it clears the payment-kind threshold (rent
    /// payments accept earlier than others). One failed commit is logged
    /// and skipped, never aborts the batch. Returns the number of commits.
    pub async fn auto_match_all(&self) -> Result<usize, ReconError> {
        let pending = self.store.unmatched_transactions().await?;
        let history = self.store.matched_transactions().await?;
        let payers = self.store.payers().await?;

        let mut matched = 0usize;
        for tx in pending.iter().filter(|t| t.amount.is_positive()) {
            let Some(tx_id) = tx.id else { continue };

            // Re-read open payments each round: a commit in the previous
            // round may have closed a payment or moved its paid amount.
            let payments = self.store.open_payments().await?;
            let Some(best) = self.scorer.best_match(tx, &payments, &history, &payers) else {
                continue;
            };

            let threshold = payments
                .iter()
                .find(|p| p.id == Some(best.payment_id))
                .map(|p| self.scorer.config().threshold_for(p.kind))
                .unwrap_or(f64::MAX);
            if best.score < threshold {
                continue;
            }

            match self.match_transaction(tx_id, best.payment_id).await {
                Ok(()) => {
                    tracing::info!(
                        transaction = %tx_id,
                        payment = %best.payment_id,
                        score = best.score,
                        "auto-matched"
                    );
                    matched += 1;
                }
                Err(e) => {
                    tracing::warn!(transaction = %tx_id, "auto-match commit failed: {e}");
                }
            }
        }
        Ok(matched)
    }

    /// Bulk import boundary: parse, suppress duplicates against the
    /// account's stored rows, persist, then auto-match.
    pub async fn import_statement(
        &self,
        account_iban: &str,
        csv_text: &str,
    ) -> Result<ImportOutcome, ReconError> {
        let report = parse_statement(csv_text, account_iban)?;
        for skip in &report.skipped {
            tracing::warn!(line = skip.line, "statement row skipped: {}", skip.error);
        }

        let existing = self.store.account_transactions(account_iban).await?;
        let (fresh, duplicates) = dedupe(report.parsed, &existing);

        let imported = self.store.insert_transactions(fresh).await?;
        let matched = self.auto_match_all().await?;

        Ok(ImportOutcome {
            imported,
            matched,
            skipped: report.skipped.len() + duplicates,
        })
    }

    async fn require_transaction(
        &self,
        tx_id: TransactionId,
    ) -> Result<BankTransaction, ReconError> {
        self.store
            .transaction(tx_id)
            .await?
            .ok_or(ReconError::TransactionNotFound(tx_id))
    }

    async fn require_payment(&self, payment_id: PaymentId) -> Result<Payment, ReconError> {
        self.store
            .payment(payment_id)
            .await?
            .ok_or(ReconError::PaymentNotFound(payment_id))
    }

    /// Applies `mutate` to the payment and commits both entities; on an
    /// optimistic-lock conflict the payment is re-read and the commit
    /// re-attempted exactly once.
    async fn commit_with_retry<F>(
        &self,
        tx: &BankTransaction,
        payment: Payment,
        mutate: F,
    ) -> Result<(), ReconError>
    where
        F: Fn(Payment, &BankTransaction) -> Payment,
    {
        let payment_id = payment.id.ok_or_else(|| {
            ReconError::Store(StoreError::Backend(anyhow::anyhow!("payment without id")))
        })?;

        let updated = mutate(payment, tx);
        match self.store.commit_match(tx, &updated).await {
            Err(StoreError::Conflict(_)) => {
                tracing::debug!(payment = %payment_id, "commit conflict, retrying once");
                let current = self.require_payment(payment_id).await?;
                let updated = mutate(current, tx);
                self.store.commit_match(tx, &updated).await?;
                Ok(())
            }
            other => Ok(other?),
        }
    }
}
