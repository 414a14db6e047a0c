use std::path::Path;
use std::str::FromStr;

use chrono::NaiveDate;
use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite};

use mietwerk_core::{
    BankTransaction, Money, Payer, PayerId, Payment, PaymentId, PaymentKind, PaymentStatus,
    TransactionId,
};
use mietwerk_recon::{ReconStore, StoreError};

pub type DbPool = Pool<Sqlite>;

pub async fn create_db(path: &Path) -> Result<DbPool, sqlx::Error> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(&format!("sqlite:{}?mode=rwc", path.display()))
        .await?;

    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous = NORMAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA cache_size = -32000")
        .execute(&pool)
        .await?;

    run_migrations(&pool).await?;

    Ok(pool)
}

async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS payers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS payments (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            payer_id INTEGER,
            unit_id INTEGER,
            kind TEXT NOT NULL,
            expected_cents INTEGER NOT NULL,
            paid_cents INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'pending',
            due_date TEXT NOT NULL,
            reference_text TEXT NOT NULL DEFAULT '',
            payment_month TEXT NOT NULL,
            version INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            FOREIGN KEY (payer_id) REFERENCES payers(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS bank_transactions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            account_iban TEXT NOT NULL,
            booking_date TEXT NOT NULL,
            value_date TEXT,
            amount_cents INTEGER NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            counterparty TEXT NOT NULL DEFAULT '',
            reference TEXT NOT NULL DEFAULT '',
            matched INTEGER NOT NULL DEFAULT 0,
            matched_payment_id INTEGER,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            FOREIGN KEY (matched_payment_id) REFERENCES payments(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_tx_account ON bank_transactions(account_iban, booking_date)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

type TransactionRow = (
    i64,
    String,
    NaiveDate,
    Option<NaiveDate>,
    i64,
    String,
    String,
    String,
    i64,
    Option<i64>,
);

const TRANSACTION_COLUMNS: &str = "id, account_iban, booking_date, value_date, amount_cents, \
     description, counterparty, reference, matched, matched_payment_id";

fn map_transaction(r: TransactionRow) -> BankTransaction {
    BankTransaction {
        id: Some(TransactionId(r.0)),
        account_iban: r.1,
        booking_date: r.2,
        value_date: r.3,
        amount: Money::from_cents(r.4),
        description: r.5,
        counterparty: r.6,
        reference: r.7,
        matched: r.8 != 0,
        matched_payment_id: r.9.map(PaymentId),
    }
}

type PaymentRow = (
    i64,
    Option<i64>,
    Option<i64>,
    String,
    i64,
    i64,
    String,
    NaiveDate,
    String,
    String,
    i64,
);

const PAYMENT_COLUMNS: &str = "id, payer_id, unit_id, kind, expected_cents, paid_cents, status, \
     due_date, reference_text, payment_month, version";

fn map_payment(r: PaymentRow) -> Result<Payment, StoreError> {
    let kind = PaymentKind::from_str(&r.3).map_err(anyhow::Error::msg)?;
    let status = PaymentStatus::from_str(&r.6).map_err(anyhow::Error::msg)?;
    Ok(Payment {
        id: Some(PaymentId(r.0)),
        payer_id: r.1.map(PayerId),
        unit_id: r.2,
        kind,
        expected_amount: Money::from_cents(r.4),
        paid_amount: Money::from_cents(r.5),
        status,
        due_date: r.7,
        reference_text: r.8,
        payment_month: r.9,
        version: r.10,
    })
}

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.into())
}

/// Persistent `ReconStore` backed by the application SQLite file.
#[derive(Clone)]
pub struct SqliteStore {
    pool: DbPool,
}

impl SqliteStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub async fn insert_payer(&self, payer: &Payer) -> Result<PayerId, StoreError> {
        let result = sqlx::query("INSERT INTO payers (first_name, last_name) VALUES (?, ?)")
            .bind(&payer.first_name)
            .bind(&payer.last_name)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(PayerId(result.last_insert_rowid()))
    }

    pub async fn insert_payment(&self, payment: &Payment) -> Result<PaymentId, StoreError> {
        let result = sqlx::query(
            "INSERT INTO payments (payer_id, unit_id, kind, expected_cents, paid_cents, status, \
             due_date, reference_text, payment_month, version) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(payment.payer_id.map(|p| p.0))
        .bind(payment.unit_id)
        .bind(payment.kind.as_str())
        .bind(payment.expected_amount.to_cents())
        .bind(payment.paid_amount.to_cents())
        .bind(payment.status.as_str())
        .bind(payment.due_date)
        .bind(&payment.reference_text)
        .bind(&payment.payment_month)
        .bind(payment.version)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(PaymentId(result.last_insert_rowid()))
    }
}

impl ReconStore for SqliteStore {
    async fn transaction(&self, id: TransactionId) -> Result<Option<BankTransaction>, StoreError> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM bank_transactions WHERE id = ?"
        ))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        Ok(row.map(map_transaction))
    }

    async fn payment(&self, id: PaymentId) -> Result<Option<Payment>, StoreError> {
        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = ?"
        ))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.map(map_payment).transpose()
    }

    async fn unmatched_transactions(&self) -> Result<Vec<BankTransaction>, StoreError> {
        let rows = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM bank_transactions \
             WHERE matched = 0 ORDER BY booking_date, id"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        Ok(rows.into_iter().map(map_transaction).collect())
    }

    async fn account_transactions(&self, iban: &str) -> Result<Vec<BankTransaction>, StoreError> {
        let rows = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM bank_transactions \
             WHERE account_iban = ? ORDER BY booking_date, id"
        ))
        .bind(iban)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        Ok(rows.into_iter().map(map_transaction).collect())
    }

    async fn matched_transactions(&self) -> Result<Vec<BankTransaction>, StoreError> {
        let rows = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM bank_transactions \
             WHERE matched = 1 ORDER BY booking_date, id"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        Ok(rows.into_iter().map(map_transaction).collect())
    }

    async fn open_payments(&self) -> Result<Vec<Payment>, StoreError> {
        let rows = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments \
             WHERE status IN ('pending', 'partial') ORDER BY due_date, id"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.into_iter().map(map_payment).collect()
    }

    async fn payers(&self) -> Result<Vec<Payer>, StoreError> {
        let rows = sqlx::query_as::<_, (i64, String, String)>(
            "SELECT id, first_name, last_name FROM payers ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        Ok(rows
            .into_iter()
            .map(|(id, first_name, last_name)| Payer {
                id: PayerId(id),
                first_name,
                last_name,
            })
            .collect())
    }

    async fn insert_transactions(
        &self,
        batch: Vec<BankTransaction>,
    ) -> Result<usize, StoreError> {
        let mut db_tx = self.pool.begin().await.map_err(backend)?;
        let mut inserted = 0usize;
        for tx in &batch {
            sqlx::query(
                "INSERT INTO bank_transactions (account_iban, booking_date, value_date, \
                 amount_cents, description, counterparty, reference, matched, matched_payment_id) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&tx.account_iban)
            .bind(tx.booking_date)
            .bind(tx.value_date)
            .bind(tx.amount.to_cents())
            .bind(&tx.description)
            .bind(&tx.counterparty)
            .bind(&tx.reference)
            .bind(tx.matched)
            .bind(tx.matched_payment_id.map(|p| p.0))
            .execute(&mut *db_tx)
            .await
            .map_err(backend)?;
            inserted += 1;
        }
        db_tx.commit().await.map_err(backend)?;
        Ok(inserted)
    }

    async fn commit_match(
        &self,
        tx: &BankTransaction,
        payment: &Payment,
    ) -> Result<(), StoreError> {
        let tx_id = tx
            .id
            .ok_or_else(|| StoreError::Backend(anyhow::anyhow!("transaction without id")))?;
        let payment_id = payment
            .id
            .ok_or_else(|| StoreError::Backend(anyhow::anyhow!("payment without id")))?;

        let mut db_tx = self.pool.begin().await.map_err(backend)?;

        // Version-guarded write: zero affected rows means someone else
        // updated the payment since we read it.
        let result = sqlx::query(
            "UPDATE payments SET paid_cents = ?, status = ?, version = version + 1 \
             WHERE id = ? AND version = ?",
        )
        .bind(payment.paid_amount.to_cents())
        .bind(payment.status.as_str())
        .bind(payment_id.0)
        .bind(payment.version)
        .execute(&mut *db_tx)
        .await
        .map_err(backend)?;
        if result.rows_affected() == 0 {
            db_tx.rollback().await.map_err(backend)?;
            return Err(StoreError::Conflict(payment_id));
        }

        sqlx::query(
            "UPDATE bank_transactions SET matched = ?, matched_payment_id = ? WHERE id = ?",
        )
        .bind(tx.matched)
        .bind(tx.matched_payment_id.map(|p| p.0))
        .bind(tx_id.0)
        .execute(&mut *db_tx)
        .await
        .map_err(backend)?;

        db_tx.commit().await.map_err(backend)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> (tempfile::TempDir, SqliteStore) {
        let dir = tempfile::tempdir().unwrap();
        let pool = create_db(&dir.path().join("test.db")).await.unwrap();
        (dir, SqliteStore::new(pool))
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn sample_tx(cents: i64) -> BankTransaction {
        BankTransaction {
            id: None,
            account_iban: "DE02120300000000202051".to_string(),
            booking_date: date(2024, 3, 1),
            value_date: Some(date(2024, 3, 2)),
            amount: Money::from_cents(cents),
            description: "Miete März".to_string(),
            counterparty: "Max Mustermann".to_string(),
            reference: "Miete März".to_string(),
            matched: false,
            matched_payment_id: None,
        }
    }

    fn sample_payment(payer_id: Option<PayerId>) -> Payment {
        Payment {
            id: None,
            payer_id,
            unit_id: Some(1),
            kind: PaymentKind::Rent,
            expected_amount: Money::from_cents(75000),
            paid_amount: Money::zero(),
            status: PaymentStatus::Pending,
            due_date: date(2024, 3, 1),
            reference_text: "Miete".to_string(),
            payment_month: "2024-03".to_string(),
            version: 0,
        }
    }

    #[tokio::test]
    async fn transactions_round_trip() {
        let (_dir, store) = test_store().await;

        let inserted = store
            .insert_transactions(vec![sample_tx(75000), sample_tx(-1200)])
            .await
            .unwrap();
        assert_eq!(inserted, 2);

        let all = store
            .account_transactions("DE02120300000000202051")
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
        let first = &all[0];
        assert_eq!(first.amount, Money::from_cents(75000));
        assert_eq!(first.value_date, Some(date(2024, 3, 2)));
        assert_eq!(first.counterparty, "Max Mustermann");
        assert!(!first.matched);

        let unmatched = store.unmatched_transactions().await.unwrap();
        assert_eq!(unmatched.len(), 2);
        assert!(store.matched_transactions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn payments_round_trip_with_status() {
        let (_dir, store) = test_store().await;
        let payer_id = store
            .insert_payer(&Payer {
                id: PayerId(0),
                first_name: "Max".to_string(),
                last_name: "Mustermann".to_string(),
            })
            .await
            .unwrap();

        let payment_id = store
            .insert_payment(&sample_payment(Some(payer_id)))
            .await
            .unwrap();

        let loaded = store.payment(payment_id).await.unwrap().unwrap();
        assert_eq!(loaded.kind, PaymentKind::Rent);
        assert_eq!(loaded.status, PaymentStatus::Pending);
        assert_eq!(loaded.payer_id, Some(payer_id));
        assert_eq!(loaded.version, 0);

        let open = store.open_payments().await.unwrap();
        assert_eq!(open.len(), 1);
    }

    #[tokio::test]
    async fn commit_match_is_atomic_and_versioned() {
        let (_dir, store) = test_store().await;
        let payment_id = store.insert_payment(&sample_payment(None)).await.unwrap();
        store
            .insert_transactions(vec![sample_tx(75000)])
            .await
            .unwrap();
        let tx = store
            .unmatched_transactions()
            .await
            .unwrap()
            .into_iter()
            .next()
            .unwrap();

        let mut payment = store.payment(payment_id).await.unwrap().unwrap();
        payment.apply_receipt(tx.amount.abs());
        let mut linked = tx.clone();
        linked.link(payment_id);

        store.commit_match(&linked, &payment).await.unwrap();

        let stored = store.payment(payment_id).await.unwrap().unwrap();
        assert_eq!(stored.paid_amount, Money::from_cents(75000));
        assert_eq!(stored.status, PaymentStatus::Paid);
        assert_eq!(stored.version, 1);
        let stored_tx = store.transaction(tx.id.unwrap()).await.unwrap().unwrap();
        assert!(stored_tx.matched);
        assert_eq!(stored_tx.matched_payment_id, Some(payment_id));

        // Closed payments fall out of the open set.
        assert!(store.open_payments().await.unwrap().is_empty());

        // Re-committing with the stale version must conflict and leave
        // the transaction row untouched.
        let mut stale_tx = stored_tx.clone();
        stale_tx.unlink();
        let err = store.commit_match(&stale_tx, &payment).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(id) if id == payment_id));
        let after = store.transaction(tx.id.unwrap()).await.unwrap().unwrap();
        assert!(after.matched);
    }
}
