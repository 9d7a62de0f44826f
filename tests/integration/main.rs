//! Integration tests
//!
//! These need a PostgreSQL database reachable through `DATABASE_URL` and are
//! ignored by default. Run with: cargo test -- --ignored

mod api_tests;
mod common;
mod ledger_tests;
mod reminder_tests;
mod reservation_tests;
