//! Read-only transaction listings.

use crate::error::AppError;
use crate::models::transaction::TransactionListResponse;
use crate::store::TransactionStore;

/// Transactions of one payer, newest first.
///
/// # Errors
///
/// `Validation` if `payer_identifier` is missing or blank.
pub async fn list_for_payer(
    store: &dyn TransactionStore,
    payer_identifier: Option<&str>,
) -> Result<TransactionListResponse, AppError> {
    let payer_identifier = payer_identifier
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .ok_or_else(|| AppError::Validation(vec!["payerIdentifier".to_string()]))?;

    let transactions = store.list_for_payer(payer_identifier).await?;
    Ok(transactions.into())
}

/// Every transaction, newest first. Callers must be privileged.
pub async fn list_all(store: &dyn TransactionStore) -> Result<TransactionListResponse, AppError> {
    Ok(store.list_all().await?.into())
}
