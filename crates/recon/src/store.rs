use thiserror::Error;

use mietwerk_core::{BankTransaction, Payer, Payment, PaymentId, TransactionId};

#[derive(Error, Debug)]
pub enum StoreError {
    /// The payment row changed under us (optimistic-lock miss). The
    /// reconciler retries such commits once.
    #[error("conflicting concurrent update on payment {0}")]
    Conflict(PaymentId),
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Narrow repository seam over the hosted entity store. The reconciler is
/// generic over this, so the matching logic never touches a concrete
/// database and tests run against the in-memory implementation.
pub trait ReconStore {
    fn transaction(
        &self,
        id: TransactionId,
    ) -> impl std::future::Future<Output = Result<Option<BankTransaction>, StoreError>> + Send;

    fn payment(
        &self,
        id: PaymentId,
    ) -> impl std::future::Future<Output = Result<Option<Payment>, StoreError>> + Send;

    /// All transactions not currently matched, oldest first.
    fn unmatched_transactions(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<BankTransaction>, StoreError>> + Send;

    /// Every stored transaction for one account, for duplicate suppression.
    fn account_transactions(
        &self,
        iban: &str,
    ) -> impl std::future::Future<Output = Result<Vec<BankTransaction>, StoreError>> + Send;

    /// Matched history feeding the recurring-pattern detector.
    fn matched_transactions(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<BankTransaction>, StoreError>> + Send;

    /// Payments with status pending or partial.
    fn open_payments(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<Payment>, StoreError>> + Send;

    fn payers(&self)
        -> impl std::future::Future<Output = Result<Vec<Payer>, StoreError>> + Send;

    fn insert_transactions(
        &self,
        batch: Vec<BankTransaction>,
    ) -> impl std::future::Future<Output = Result<usize, StoreError>> + Send;

    /// Persists a transaction's match state together with the linked
    /// payment's new balance in one atomic write. The payment's `version`
    /// must still hold, else `StoreError::Conflict`.
    fn commit_match(
        &self,
        tx: &BankTransaction,
        payment: &Payment,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;
}
