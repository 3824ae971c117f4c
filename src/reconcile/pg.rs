//! PostgreSQL Ledger Store
//!
//! The SQL strategy. Uniqueness of Posted rows is enforced by partial
//! unique indexes on `bank_transaction_id` and on
//! (`money_transfer_id`, `account_id`); a concurrent duplicate surfaces as
//! [`StoreError::DuplicateRow`] instead of a second ledger row.

use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::error::StoreError;
use crate::money::{Currency, Money};
use crate::notification::{CodeType, TransactionType};

use super::key::CorrelationKey;
use super::state::{PendingStatus, PostedStatus};
use super::store::LedgerStore;
use super::types::{PendingTransaction, PostedTransaction, TransactionId, TransactionSubtype};

/// Schema for the ledger tables; applied once at deploy time
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS pending_transactions_tb (
    id                  TEXT PRIMARY KEY,
    business_id         TEXT NOT NULL,
    bank_transaction_id TEXT,
    money_transfer_id   TEXT,
    account_id          TEXT,
    card_id             TEXT,
    contact_id          TEXT,
    amount              NUMERIC NOT NULL,
    currency            TEXT NOT NULL,
    transaction_type    TEXT NOT NULL,
    code_type           TEXT NOT NULL,
    status_id           SMALLINT NOT NULL,
    counterparty        TEXT NOT NULL,
    title               TEXT NOT NULL,
    description         TEXT NOT NULL,
    transaction_date    TIMESTAMPTZ NOT NULL,
    updated_at          TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
CREATE INDEX IF NOT EXISTS idx_pending_bank_txn
    ON pending_transactions_tb (bank_transaction_id);
CREATE INDEX IF NOT EXISTS idx_pending_transfer
    ON pending_transactions_tb (money_transfer_id, account_id);

CREATE TABLE IF NOT EXISTS posted_transactions_tb (
    id                  TEXT PRIMARY KEY,
    business_id         TEXT NOT NULL,
    bank_transaction_id TEXT,
    money_transfer_id   TEXT,
    account_id          TEXT,
    card_id             TEXT,
    contact_id          TEXT,
    amount              NUMERIC NOT NULL,
    currency            TEXT NOT NULL,
    transaction_type    TEXT NOT NULL,
    code_type           TEXT NOT NULL,
    status_id           SMALLINT NOT NULL,
    subtype             TEXT NOT NULL,
    counterparty        TEXT NOT NULL,
    title               TEXT NOT NULL,
    description         TEXT NOT NULL,
    transaction_date    TIMESTAMPTZ NOT NULL,
    created_at          TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
CREATE UNIQUE INDEX IF NOT EXISTS uq_posted_bank_txn
    ON posted_transactions_tb (bank_transaction_id)
    WHERE bank_transaction_id IS NOT NULL;
CREATE UNIQUE INDEX IF NOT EXISTS uq_posted_transfer
    ON posted_transactions_tb (money_transfer_id, account_id)
    WHERE money_transfer_id IS NOT NULL AND account_id IS NOT NULL;

CREATE TABLE IF NOT EXISTS processed_notifications_tb (
    notification_id TEXT PRIMARY KEY,
    processed_at    TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
"#;

/// PostgreSQL-backed [`LedgerStore`]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply the ledger schema (idempotent)
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        for statement in SCHEMA.split(';').filter(|s| !s.trim().is_empty()) {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }
}

const PENDING_COLS: &str = "id, business_id, bank_transaction_id, money_transfer_id, account_id, \
     card_id, contact_id, amount, currency, transaction_type, code_type, status_id, \
     counterparty, title, description, transaction_date";

const POSTED_COLS: &str = "id, business_id, bank_transaction_id, money_transfer_id, account_id, \
     card_id, contact_id, amount, currency, transaction_type, code_type, status_id, subtype, \
     counterparty, title, description, transaction_date";

fn parse_id(raw: &str) -> Result<TransactionId, StoreError> {
    raw.parse()
        .map_err(|_| StoreError::Database(format!("invalid transaction id in store: {}", raw)))
}

fn parse_currency(raw: &str) -> Result<Currency, StoreError> {
    raw.parse()
        .map_err(|_| StoreError::Database(format!("unknown currency in store: {}", raw)))
}

fn pending_from_row(row: &PgRow) -> Result<PendingTransaction, StoreError> {
    let status_id: i16 = row.try_get("status_id")?;
    let status = PendingStatus::from_id(status_id)
        .ok_or_else(|| StoreError::Database(format!("unknown pending status id {}", status_id)))?;
    let amount: Decimal = row.try_get("amount")?;
    let currency: String = row.try_get("currency")?;
    let id: String = row.try_get("id")?;
    let transaction_type: String = row.try_get("transaction_type")?;
    let code_type: String = row.try_get("code_type")?;

    Ok(PendingTransaction {
        id: parse_id(&id)?,
        business_id: row.try_get("business_id")?,
        bank_transaction_id: row.try_get("bank_transaction_id")?,
        money_transfer_id: row.try_get("money_transfer_id")?,
        account_id: row.try_get("account_id")?,
        card_id: row.try_get("card_id")?,
        contact_id: row.try_get("contact_id")?,
        amount: Money::new(amount, parse_currency(&currency)?),
        transaction_type: TransactionType::from(transaction_type),
        code_type: CodeType::from(code_type),
        status,
        counterparty: row.try_get("counterparty")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        transaction_date: row.try_get("transaction_date")?,
    })
}

fn posted_from_row(row: &PgRow) -> Result<PostedTransaction, StoreError> {
    let status_id: i16 = row.try_get("status_id")?;
    let status = PostedStatus::from_id(status_id)
        .ok_or_else(|| StoreError::Database(format!("unknown posted status id {}", status_id)))?;
    let amount: Decimal = row.try_get("amount")?;
    let currency: String = row.try_get("currency")?;
    let id: String = row.try_get("id")?;
    let transaction_type: String = row.try_get("transaction_type")?;
    let code_type: String = row.try_get("code_type")?;
    let subtype: String = row.try_get("subtype")?;

    Ok(PostedTransaction {
        id: parse_id(&id)?,
        business_id: row.try_get("business_id")?,
        bank_transaction_id: row.try_get("bank_transaction_id")?,
        money_transfer_id: row.try_get("money_transfer_id")?,
        account_id: row.try_get("account_id")?,
        card_id: row.try_get("card_id")?,
        contact_id: row.try_get("contact_id")?,
        amount: Money::new(amount, parse_currency(&currency)?),
        transaction_type: TransactionType::from(transaction_type),
        code_type: CodeType::from(code_type),
        status,
        subtype: serde_json::from_value(serde_json::Value::String(subtype.clone()))
            .map_err(|_| StoreError::Database(format!("unknown posted subtype {}", subtype)))?,
        counterparty: row.try_get("counterparty")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        transaction_date: row.try_get("transaction_date")?,
    })
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

async fn insert_posted_tx<'e, E>(executor: E, row: &PostedTransaction) -> Result<(), sqlx::Error>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    sqlx::query(
        r#"
        INSERT INTO posted_transactions_tb
            (id, business_id, bank_transaction_id, money_transfer_id, account_id,
             card_id, contact_id, amount, currency, transaction_type, code_type,
             status_id, subtype, counterparty, title, description, transaction_date)
        VALUES
            ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
        "#,
    )
    .bind(row.id.to_string())
    .bind(&row.business_id)
    .bind(&row.bank_transaction_id)
    .bind(&row.money_transfer_id)
    .bind(&row.account_id)
    .bind(&row.card_id)
    .bind(&row.contact_id)
    .bind(row.amount.amount)
    .bind(row.amount.currency.as_str())
    .bind(row.transaction_type.as_str())
    .bind(row.code_type.as_str())
    .bind(row.status.id())
    .bind(row.subtype.as_str())
    .bind(&row.counterparty)
    .bind(&row.title)
    .bind(&row.description)
    .bind(row.transaction_date)
    .execute(executor)
    .await
    .map(|_| ())
}

impl PgLedgerStore {
    async fn find_pending_by_key(
        &self,
        key: &CorrelationKey,
        postable_only: bool,
    ) -> Result<Option<PendingTransaction>, StoreError> {
        let row = match key {
            CorrelationKey::BankTransaction(bank_txn) => {
                sqlx::query(&format!(
                    "SELECT {PENDING_COLS} FROM pending_transactions_tb \
                     WHERE bank_transaction_id = $1 AND ($2 = false OR status_id <> $3) \
                     ORDER BY transaction_date LIMIT 1"
                ))
                .bind(bank_txn)
                .bind(postable_only)
                .bind(PendingStatus::CardAuthDeclined.id())
                .fetch_optional(&self.pool)
                .await?
            }
            CorrelationKey::Transfer {
                money_transfer_id,
                account_id,
            } => {
                sqlx::query(&format!(
                    "SELECT {PENDING_COLS} FROM pending_transactions_tb \
                     WHERE money_transfer_id = $1 AND account_id = $2 \
                       AND ($3 = false OR status_id <> $4) \
                     ORDER BY transaction_date LIMIT 1"
                ))
                .bind(money_transfer_id)
                .bind(account_id)
                .bind(postable_only)
                .bind(PendingStatus::CardAuthDeclined.id())
                .fetch_optional(&self.pool)
                .await?
            }
        };

        row.as_ref().map(pending_from_row).transpose()
    }

    async fn find_posted_by_key(
        &self,
        key: &CorrelationKey,
    ) -> Result<Option<PostedTransaction>, StoreError> {
        let row = match key {
            CorrelationKey::BankTransaction(bank_txn) => {
                sqlx::query(&format!(
                    "SELECT {POSTED_COLS} FROM posted_transactions_tb \
                     WHERE bank_transaction_id = $1 LIMIT 1"
                ))
                .bind(bank_txn)
                .fetch_optional(&self.pool)
                .await?
            }
            CorrelationKey::Transfer {
                money_transfer_id,
                account_id,
            } => {
                sqlx::query(&format!(
                    "SELECT {POSTED_COLS} FROM posted_transactions_tb \
                     WHERE money_transfer_id = $1 AND account_id = $2 LIMIT 1"
                ))
                .bind(money_transfer_id)
                .bind(account_id)
                .fetch_optional(&self.pool)
                .await?
            }
        };

        row.as_ref().map(posted_from_row).transpose()
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn already_processed(&self, notification_id: &str) -> Result<bool, StoreError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM processed_notifications_tb WHERE notification_id = $1)",
        )
        .bind(notification_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn mark_processed(&self, notification_id: &str) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO processed_notifications_tb (notification_id) VALUES ($1) \
             ON CONFLICT (notification_id) DO NOTHING",
        )
        .bind(notification_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_pending(
        &self,
        keys: &[CorrelationKey],
        postable_only: bool,
    ) -> Result<Option<PendingTransaction>, StoreError> {
        for key in keys {
            if let Some(row) = self.find_pending_by_key(key, postable_only).await? {
                return Ok(Some(row));
            }
        }
        Ok(None)
    }

    async fn find_posted(
        &self,
        keys: &[CorrelationKey],
    ) -> Result<Option<PostedTransaction>, StoreError> {
        for key in keys {
            if let Some(row) = self.find_posted_by_key(key).await? {
                return Ok(Some(row));
            }
        }
        Ok(None)
    }

    async fn upsert_pending(
        &self,
        row: &PendingTransaction,
    ) -> Result<(TransactionId, bool), StoreError> {
        let keys = CorrelationKey::candidates(
            row.bank_transaction_id.as_deref(),
            row.money_transfer_id.as_deref(),
            row.account_id.as_deref(),
        );

        if let Some(existing) = self.find_pending(&keys, false).await? {
            sqlx::query(
                r#"
                UPDATE pending_transactions_tb
                SET amount = $2, currency = $3, transaction_type = $4, code_type = $5,
                    status_id = $6, counterparty = $7, title = $8, description = $9,
                    transaction_date = $10, updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(existing.id.to_string())
            .bind(row.amount.amount)
            .bind(row.amount.currency.as_str())
            .bind(row.transaction_type.as_str())
            .bind(row.code_type.as_str())
            .bind(row.status.id())
            .bind(&row.counterparty)
            .bind(&row.title)
            .bind(&row.description)
            .bind(row.transaction_date)
            .execute(&self.pool)
            .await?;
            return Ok((existing.id, false));
        }

        sqlx::query(
            r#"
            INSERT INTO pending_transactions_tb
                (id, business_id, bank_transaction_id, money_transfer_id, account_id,
                 card_id, contact_id, amount, currency, transaction_type, code_type,
                 status_id, counterparty, title, description, transaction_date)
            VALUES
                ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(row.id.to_string())
        .bind(&row.business_id)
        .bind(&row.bank_transaction_id)
        .bind(&row.money_transfer_id)
        .bind(&row.account_id)
        .bind(&row.card_id)
        .bind(&row.contact_id)
        .bind(row.amount.amount)
        .bind(row.amount.currency.as_str())
        .bind(row.transaction_type.as_str())
        .bind(row.code_type.as_str())
        .bind(row.status.id())
        .bind(&row.counterparty)
        .bind(&row.title)
        .bind(&row.description)
        .bind(row.transaction_date)
        .execute(&self.pool)
        .await?;

        Ok((row.id, true))
    }

    async fn delete_pending(&self, id: TransactionId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM pending_transactions_tb WHERE id = $1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn insert_posted(&self, row: &PostedTransaction) -> Result<(), StoreError> {
        insert_posted_tx(&self.pool, row).await.map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::DuplicateRow(
                    row.bank_transaction_id
                        .clone()
                        .unwrap_or_else(|| row.id.to_string()),
                )
            } else {
                e.into()
            }
        })
    }

    async fn promote(
        &self,
        pending_id: TransactionId,
        posted: &PostedTransaction,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        insert_posted_tx(&mut *tx, posted).await.map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::DuplicateRow(posted.id.to_string())
            } else {
                StoreError::from(e)
            }
        })?;

        sqlx::query("DELETE FROM pending_transactions_tb WHERE id = $1")
            .bind(pending_id.to_string())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}
