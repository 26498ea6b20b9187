//! Integration tests for mediadeck
//!
//! Tests are organized by component:
//! - registry_test: CRUD, single-current invariant, write serialization
//! - prober_test: HEAD probing against live mock servers, timeouts
//! - store_test: JSON file store and registry persistence across restarts
//! - auth_test: bearer requests with refresh-once retry
//! - view_test: server list view key handling

// Note: Each test file is a separate integration test crate
// Tests are run individually by cargo, not via mod.rs
