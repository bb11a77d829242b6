//! E2E test scenarios, one module per behavior.

mod cache;
mod dedup;
mod failure;
mod ordering;
mod pool;
mod timeout;
