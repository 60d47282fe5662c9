//! Integration tests for the Tiergate router service
//!
//! This module contains integration tests that verify the complete request/response
//! flow through the service, including tier ordering, retries, circuit breaking
//! and fallback.

mod health;
mod operations;
mod tiers;
