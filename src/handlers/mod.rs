//! HTTP request handlers (route handlers).
//!
//! Each handler is an async function that:
//! 1. Receives HTTP request data (JSON body, query string, path params)
//! 2. Delegates to a service
//! 3. Returns an HTTP response (JSON, redirect, status code)

/// Health check endpoint
pub mod health;
/// Payment, callback and transaction listing endpoints
pub mod payments;
