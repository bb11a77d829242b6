//! E2E tests for the scan orchestrator.
//!
//! These tests drive `ScanOrchestrator` through its public API with scripted
//! tools, a failure-injecting store and a recording notifier, and check
//! deduplication, caching, failure propagation, pool bounds, timeouts and drain.
//!
//! # Test Structure
//!
//! - `helpers/` -- Scripted ports, harness construction, polling assertions
//! - `scenarios/` -- Test files organized by behavior
//!
//! # Running
//!
//! ```bash
//! cargo test -p ironvuln-engine --test e2e
//! ```

mod helpers;
mod scenarios;
