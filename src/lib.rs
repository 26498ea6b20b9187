//! mediadeck - media server registry for streaming front-ends
//!
//! Owns the user's configured media servers (Stremio, TorrServer, ...),
//! keeps exactly one "current" server per type and probes reachability.
//!
//! # Modules
//!
//! - `models` - Server records, ids and connection status
//! - `store` - Key-value persistence adapters (memory, JSON file)
//! - `registry` - Server registry and background health monitor
//! - `api` - Connection prober and authenticated request wrapper
//! - `app` - Server list view state machine
//! - `cli` / `commands` - Scriptable command-line front-end
//! - `config` - Config file handling

pub mod api;
pub mod app;
pub mod cli;
pub mod commands;
pub mod config;
pub mod models;
pub mod registry;
pub mod store;

// Re-export commonly used types
pub use models::{ConnectionStatus, ServerId, ServerPatch, ServerRecord, StatusEvent};

pub use api::{HttpProber, Probe};
pub use app::{ServerListView, ViewAction, ViewMode};
pub use registry::{HealthMonitor, RegistryError, ServerRegistry};
pub use store::{FileStore, KeyValueStore, MemoryStore, StoreError};
