//! Transaction store: the durable record of every payment attempt.
//!
//! The store is the only shared mutable resource in the service. It is exposed as
//! a trait so the services can run against PostgreSQL in production and an
//! in-memory map in tests.
//!
//! # Guarantees
//!
//! - Exactly one record per merchant transaction id. The loser of a concurrent
//!   create gets [`StoreError::Duplicate`] and the winner's record is untouched.
//! - Every operation is atomic for a single record. A patch carrying an expected
//!   status is a compare-and-set: it lands only if the status has not moved.
//! - `updated_at` is refreshed on every update; `amount` is never updated.

use std::time::Duration;

use async_trait::async_trait;

use crate::models::transaction::{
    NewTransaction, PaymentTransaction, TransactionPatch, TransactionStatus,
};

pub mod memory;
pub mod postgres;

pub use memory::InMemoryTransactionStore;
pub use postgres::PgTransactionStore;

/// Errors raised by a transaction store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A record with this merchant transaction id already exists.
    #[error("transaction {0} already exists")]
    Duplicate(String),

    /// No record with this merchant transaction id.
    #[error("transaction {0} not found")]
    NotFound(String),

    /// The record's status is no longer the one the patch expected.
    #[error("transaction {merchant_transaction_id} is {actual}, expected {expected}")]
    Conflict {
        merchant_transaction_id: String,
        expected: TransactionStatus,
        actual: TransactionStatus,
    },

    /// A stored row could not be turned into a transaction.
    #[error("invalid transaction record: {0}")]
    InvalidRecord(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[async_trait]
pub trait TransactionStore: Send + Sync + 'static {
    /// Insert a new record with status INITIATED.
    async fn create(&self, record: NewTransaction) -> Result<PaymentTransaction, StoreError>;

    async fn find_by_merchant_id(
        &self,
        merchant_transaction_id: &str,
    ) -> Result<PaymentTransaction, StoreError>;

    /// Apply `patch` to an existing record and return the updated record.
    ///
    /// Fails with [`StoreError::Conflict`], writing nothing, when the patch
    /// expects a status the record no longer has.
    async fn update(
        &self,
        merchant_transaction_id: &str,
        patch: TransactionPatch,
    ) -> Result<PaymentTransaction, StoreError>;

    /// Records for one payer, newest first.
    async fn list_for_payer(
        &self,
        payer_identifier: &str,
    ) -> Result<Vec<PaymentTransaction>, StoreError>;

    /// Every record, newest first.
    async fn list_all(&self) -> Result<Vec<PaymentTransaction>, StoreError>;

    /// Records in one of `statuses` that have not been updated for `older_than`,
    /// oldest first, at most `limit` of them.
    async fn list_stale(
        &self,
        statuses: &[TransactionStatus],
        older_than: Duration,
        limit: i64,
    ) -> Result<Vec<PaymentTransaction>, StoreError>;

    /// Check that the backing storage is reachable.
    async fn ping(&self) -> Result<(), StoreError>;
}
