use std::collections::BTreeMap;

use tokio::sync::Mutex;

use mietwerk_core::{BankTransaction, Payer, Payment, PaymentId, TransactionId};

use crate::store::{ReconStore, StoreError};

#[derive(Default)]
struct Inner {
    transactions: BTreeMap<i64, BankTransaction>,
    payments: BTreeMap<i64, Payment>,
    payers: Vec<Payer>,
    next_transaction_id: i64,
}

/// In-memory store: the stand-in for the hosted entity store in tests and
/// demos (the real system only ever simulated its bank backend anyway).
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a payment, assigning an id if absent. Returns the id.
    pub async fn add_payment(&self, mut payment: Payment) -> PaymentId {
        let mut inner = self.inner.lock().await;
        let id = payment
            .id
            .unwrap_or(PaymentId(inner.payments.len() as i64 + 1));
        payment.id = Some(id);
        inner.payments.insert(id.0, payment);
        id
    }

    pub async fn add_payer(&self, payer: Payer) {
        self.inner.lock().await.payers.push(payer);
    }

    pub async fn add_transaction(&self, mut tx: BankTransaction) -> TransactionId {
        let mut inner = self.inner.lock().await;
        inner.next_transaction_id += 1;
        let id = TransactionId(inner.next_transaction_id);
        tx.id = Some(id);
        inner.transactions.insert(id.0, tx);
        id
    }
}

impl ReconStore for MemoryStore {
    async fn transaction(&self, id: TransactionId) -> Result<Option<BankTransaction>, StoreError> {
        Ok(self.inner.lock().await.transactions.get(&id.0).cloned())
    }

    async fn payment(&self, id: PaymentId) -> Result<Option<Payment>, StoreError> {
        Ok(self.inner.lock().await.payments.get(&id.0).cloned())
    }

    async fn unmatched_transactions(&self) -> Result<Vec<BankTransaction>, StoreError> {
        let inner = self.inner.lock().await;
        let mut rows: Vec<BankTransaction> = inner
            .transactions
            .values()
            .filter(|t| !t.matched)
            .cloned()
            .collect();
        rows.sort_by_key(|t| t.booking_date);
        Ok(rows)
    }

    async fn account_transactions(&self, iban: &str) -> Result<Vec<BankTransaction>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .transactions
            .values()
            .filter(|t| t.account_iban == iban)
            .cloned()
            .collect())
    }

    async fn matched_transactions(&self) -> Result<Vec<BankTransaction>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .transactions
            .values()
            .filter(|t| t.matched)
            .cloned()
            .collect())
    }

    async fn open_payments(&self) -> Result<Vec<Payment>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .payments
            .values()
            .filter(|p| p.is_open())
            .cloned()
            .collect())
    }

    async fn payers(&self) -> Result<Vec<Payer>, StoreError> {
        Ok(self.inner.lock().await.payers.clone())
    }

    async fn insert_transactions(
        &self,
        batch: Vec<BankTransaction>,
    ) -> Result<usize, StoreError> {
        let mut inner = self.inner.lock().await;
        let count = batch.len();
        for mut tx in batch {
            inner.next_transaction_id += 1;
            let id = TransactionId(inner.next_transaction_id);
            tx.id = Some(id);
            inner.transactions.insert(id.0, tx);
        }
        Ok(count)
    }

    async fn commit_match(
        &self,
        tx: &BankTransaction,
        payment: &Payment,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;

        let payment_id = payment
            .id
            .ok_or_else(|| StoreError::Backend(anyhow::anyhow!("payment without id")))?;
        let stored_version = inner
            .payments
            .get(&payment_id.0)
            .map(|p| p.version)
            .ok_or_else(|| StoreError::Backend(anyhow::anyhow!("payment {payment_id} gone")))?;
        if stored_version != payment.version {
            return Err(StoreError::Conflict(payment_id));
        }

        let tx_id = tx
            .id
            .ok_or_else(|| StoreError::Backend(anyhow::anyhow!("transaction without id")))?;
        if !inner.transactions.contains_key(&tx_id.0) {
            return Err(StoreError::Backend(anyhow::anyhow!(
                "transaction {tx_id} gone"
            )));
        }

        let mut updated = payment.clone();
        updated.version += 1;
        inner.payments.insert(payment_id.0, updated);
        inner.transactions.insert(tx_id.0, tx.clone());
        Ok(())
    }
}
