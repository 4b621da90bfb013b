//! Data models representing database entities and API payloads.
//!
//! This module contains the payment transaction record and the request/response
//! bodies of the payment endpoints.

/// Payment API request and response bodies
pub mod payment;
/// Payment transaction record and status state machine
pub mod transaction;
