//! Storefront payment backend.
//!
//! Starts PhonePe payments, reconciles them with the provider when the payer
//! returns (and, optionally, on a schedule), and exposes the resulting
//! transaction history. Razorpay order creation is offered alongside.
//!
//! # Architecture
//!
//! - **Web Framework**: Axum (async HTTP server)
//! - **Database**: PostgreSQL with sqlx, behind the [`store::TransactionStore`] trait
//! - **Providers**: reqwest clients behind the [`gateway::PaymentGateway`] trait
//! - **Authentication**: admin API key with SHA-256 hashing
//! - **Format**: JSON requests/responses, redirects for provider callbacks

pub mod app;
pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod state;
pub mod store;

pub use app::build_router;
pub use state::AppState;
