//! Data structures shared across mediadeck
//!
//! - **Servers**: persisted server records and their identifiers
//! - **Health**: ephemeral connection status per server

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// =============================================================================
// Server Models
// =============================================================================

/// Opaque server identifier, `"{serverType}-{suffix}"`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerId(String);

impl ServerId {
    /// Generate a fresh id for a server of the given type
    pub fn generate(server_type: &str) -> Self {
        Self(format!("{}-{}", server_type, Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ServerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ServerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A user-configured remote media server endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerRecord {
    pub server_id: ServerId,
    /// Partition key, e.g. "stremio" or "torrserver"
    pub server_type: String,
    pub server_name: String,
    pub server_url: String,
    /// Active server for its type (at most one per type)
    #[serde(default)]
    pub current: bool,
}

impl ServerRecord {
    pub fn is_type(&self, server_type: &str) -> bool {
        self.server_type == server_type
    }

    /// True if `other` shares this record's type but is a different record
    pub fn is_sibling_of(&self, other: &ServerRecord) -> bool {
        self.server_type == other.server_type && self.server_id != other.server_id
    }
}

impl fmt::Display for ServerRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marker = if self.current { "*" } else { " " };
        write!(
            f,
            "{} {} [{}] {} ({})",
            marker, self.server_name, self.server_type, self.server_url, self.server_id
        )
    }
}

/// Partial update for an existing server record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerPatch {
    pub server_url: Option<String>,
    pub server_name: Option<String>,
    pub current: Option<bool>,
}

impl ServerPatch {
    pub fn url(url: impl Into<String>) -> Self {
        Self {
            server_url: Some(url.into()),
            ..Default::default()
        }
    }

    pub fn name(name: impl Into<String>) -> Self {
        Self {
            server_name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn make_current() -> Self {
        Self {
            current: Some(true),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.server_url.is_none() && self.server_name.is_none() && self.current.is_none()
    }
}

// =============================================================================
// Health Models
// =============================================================================

/// Ephemeral reachability of a server, never persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// Not checked this session
    #[default]
    Unknown,
    /// Probe in flight
    Checking,
    /// Server answered with a non-5xx status
    Connected,
    /// Server failed (5xx) or did not answer in time
    Disconnected,
    /// Transport failure (DNS, refused, TLS)
    Error,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Unknown => "unknown",
            ConnectionStatus::Checking => "checking",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Error => "error",
        }
    }

    /// Whether a probe has produced this status
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            ConnectionStatus::Connected | ConnectionStatus::Disconnected | ConnectionStatus::Error
        )
    }

    /// Status indicator for list rendering
    pub fn symbol(&self) -> &'static str {
        match self {
            ConnectionStatus::Unknown => "?",
            ConnectionStatus::Checking => "…",
            ConnectionStatus::Connected => "●",
            ConnectionStatus::Disconnected => "○",
            ConnectionStatus::Error => "✗",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A status change published by the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusEvent {
    pub server_id: ServerId,
    pub status: ConnectionStatus,
}
