//! Business logic services.
//!
//! Services contain the payment flows separated from HTTP handlers. They work
//! against the [`TransactionStore`](crate::store::TransactionStore) and
//! [`PaymentGateway`](crate::gateway::PaymentGateway) traits only.

pub mod payment_service;
pub mod query_service;
pub mod reconciliation_service;
pub mod sweeper;
