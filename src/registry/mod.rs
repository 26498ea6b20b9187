//! Server registry
//!
//! Single owner of the configured server list. Enforces "at most one
//! current server per type", serializes read-modify-write cycles against
//! the store, and tracks ephemeral connection status per server.

pub mod monitor;

pub use monitor::HealthMonitor;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::api::prober::{HttpProber, Probe, DEFAULT_PROBE_TIMEOUT};
use crate::models::{ConnectionStatus, ServerId, ServerPatch, ServerRecord, StatusEvent};
use crate::store::{KeyValueStore, StoreError};

/// Store key holding every server record, all types
pub const SERVERS_KEY: &str = "servers";

/// Version written into the persisted envelope
pub const SERVERS_VERSION: u32 = 1;

const STATUS_CHANNEL_CAPACITY: usize = 64;

/// Registry error types
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Invalid server URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Server not found: {0}")]
    NotFound(ServerId),

    #[error("Server {0} is the current server and cannot be deleted")]
    CannotDeleteCurrent(ServerId),

    #[error("Persistence failure: {0}")]
    PersistenceFailure(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, RegistryError>;

// =============================================================================
// Persisted Layout
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct ServerList {
    version: u32,
    servers: Vec<ServerRecord>,
}

/// Either the versioned envelope or the bare array older builds wrote
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StoredServers {
    Versioned(ServerList),
    Legacy(Vec<ServerRecord>),
}

fn decode_servers(json: &str) -> std::result::Result<Vec<ServerRecord>, StoreError> {
    match serde_json::from_str::<StoredServers>(json) {
        Ok(StoredServers::Versioned(list)) if list.version > SERVERS_VERSION => {
            Err(StoreError::UnsupportedVersion(list.version))
        }
        Ok(StoredServers::Versioned(list)) => Ok(list.servers),
        Ok(StoredServers::Legacy(servers)) => {
            warn!(count = servers.len(), "Read unversioned server list");
            Ok(servers)
        }
        Err(e) => Err(StoreError::Corrupt(e)),
    }
}

fn encode_servers(servers: &[ServerRecord]) -> std::result::Result<String, StoreError> {
    #[derive(Serialize)]
    struct ServerListRef<'a> {
        version: u32,
        servers: &'a [ServerRecord],
    }

    Ok(serde_json::to_string(&ServerListRef {
        version: SERVERS_VERSION,
        servers,
    })?)
}

/// Check that a server URL parses as an absolute URL
pub fn validate_url(url: &str) -> Result<()> {
    url::Url::parse(url)
        .map(|_| ())
        .map_err(|e| RegistryError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })
}

/// Mark `servers[idx]` current and demote every sibling of its type
fn promote(servers: &mut [ServerRecord], idx: usize) {
    let target = servers[idx].clone();
    for record in servers.iter_mut() {
        if record.is_sibling_of(&target) {
            record.current = false;
        }
    }
    servers[idx].current = true;
}

fn position(servers: &[ServerRecord], server_id: &ServerId) -> Result<usize> {
    servers
        .iter()
        .position(|r| &r.server_id == server_id)
        .ok_or_else(|| RegistryError::NotFound(server_id.clone()))
}

// =============================================================================
// Registry
// =============================================================================

/// Owner of the configured media servers
pub struct ServerRegistry {
    store: Arc<dyn KeyValueStore>,
    prober: Arc<dyn Probe>,
    probe_timeout: Duration,
    /// Held across each read-modify-write of [`SERVERS_KEY`]
    write_lock: tokio::sync::Mutex<()>,
    statuses: Mutex<HashMap<ServerId, ConnectionStatus>>,
    events: broadcast::Sender<StatusEvent>,
}

impl ServerRegistry {
    /// Create a registry over `store`, probing with [`HttpProber`]
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        let (events, _) = broadcast::channel(STATUS_CHANNEL_CAPACITY);
        Self {
            store,
            prober: Arc::new(HttpProber::new()),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            write_lock: tokio::sync::Mutex::new(()),
            statuses: Mutex::new(HashMap::new()),
            events,
        }
    }

    /// Replace the prober (tests, custom transports)
    pub fn with_prober(mut self, prober: Arc<dyn Probe>) -> Self {
        self.prober = prober;
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn probe_timeout(&self) -> Duration {
        self.probe_timeout
    }

    // -------------------------------------------------------------------------
    // Persistence
    // -------------------------------------------------------------------------

    async fn load(&self) -> Result<Vec<ServerRecord>> {
        match self.store.get_item(SERVERS_KEY).await? {
            Some(json) => Ok(decode_servers(&json)?),
            None => Ok(Vec::new()),
        }
    }

    async fn save(&self, servers: &[ServerRecord]) -> Result<()> {
        let json = encode_servers(servers)?;
        self.store.set_item(SERVERS_KEY, &json).await?;
        debug!(count = servers.len(), "Saved server list");
        Ok(())
    }

    /// Serialized read-modify-write of the full server list.
    ///
    /// Nothing is written when `apply` fails.
    async fn mutate<T>(
        &self,
        apply: impl FnOnce(&mut Vec<ServerRecord>) -> Result<T>,
    ) -> Result<T> {
        let _guard = self.write_lock.lock().await;
        let mut servers = self.load().await?;
        let out = apply(&mut servers)?;
        self.save(&servers).await?;
        Ok(out)
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    /// All servers of `server_type`, in insertion order
    pub async fn list(&self, server_type: &str) -> Result<Vec<ServerRecord>> {
        let mut servers = self.load().await?;
        servers.retain(|r| r.is_type(server_type));
        Ok(servers)
    }

    /// Every server of every type
    pub async fn list_all(&self) -> Result<Vec<ServerRecord>> {
        self.load().await
    }

    pub async fn get(&self, server_id: &ServerId) -> Result<ServerRecord> {
        self.load()
            .await?
            .into_iter()
            .find(|r| &r.server_id == server_id)
            .ok_or_else(|| RegistryError::NotFound(server_id.clone()))
    }

    /// The active server of `server_type`, if one is selected
    pub async fn current(&self, server_type: &str) -> Result<Option<ServerRecord>> {
        Ok(self
            .load()
            .await?
            .into_iter()
            .find(|r| r.is_type(server_type) && r.current))
    }

    // -------------------------------------------------------------------------
    // Mutations
    // -------------------------------------------------------------------------

    /// Add a server. With `make_current`, siblings are demoted in the same write.
    pub async fn add(
        &self,
        server_type: &str,
        server_name: &str,
        server_url: &str,
        make_current: bool,
    ) -> Result<ServerRecord> {
        validate_url(server_url)?;

        let record = ServerRecord {
            server_id: ServerId::generate(server_type),
            server_type: server_type.to_string(),
            server_name: server_name.to_string(),
            server_url: server_url.to_string(),
            current: false,
        };

        let added = self
            .mutate(|servers| {
                servers.push(record);
                let idx = servers.len() - 1;
                if make_current {
                    promote(servers, idx);
                }
                Ok(servers[idx].clone())
            })
            .await?;

        info!(
            server_id = %added.server_id,
            server_type,
            current = added.current,
            "Added server"
        );
        Ok(added)
    }

    /// Apply `patch` to a server. `current: Some(true)` demotes siblings.
    pub async fn update(&self, server_id: &ServerId, patch: ServerPatch) -> Result<ServerRecord> {
        if let Some(ref url) = patch.server_url {
            validate_url(url)?;
        }

        let updated = self
            .mutate(|servers| {
                let idx = position(servers, server_id)?;
                let record = &mut servers[idx];
                if let Some(url) = patch.server_url {
                    record.server_url = url;
                }
                if let Some(name) = patch.server_name {
                    record.server_name = name;
                }
                match patch.current {
                    Some(true) => promote(servers, idx),
                    Some(false) => servers[idx].current = false,
                    None => {}
                }
                Ok(servers[idx].clone())
            })
            .await?;

        info!(server_id = %server_id, current = updated.current, "Updated server");
        Ok(updated)
    }

    /// Make a server the current one for its type
    pub async fn set_current(&self, server_id: &ServerId) -> Result<()> {
        self.update(server_id, ServerPatch::make_current()).await?;
        Ok(())
    }

    /// Delete a server. The current server of a type cannot be deleted.
    pub async fn remove(&self, server_id: &ServerId) -> Result<()> {
        self.mutate(|servers| {
            let idx = position(servers, server_id)?;
            if servers[idx].current {
                return Err(RegistryError::CannotDeleteCurrent(server_id.clone()));
            }
            servers.remove(idx);
            Ok(())
        })
        .await?;

        self.statuses().remove(server_id);
        info!(server_id = %server_id, "Removed server");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Connection Status
    // -------------------------------------------------------------------------

    fn statuses(&self) -> MutexGuard<'_, HashMap<ServerId, ConnectionStatus>> {
        self.statuses.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, server_id: &ServerId, status: ConnectionStatus) {
        // No subscribers is fine
        let _ = self.events.send(StatusEvent {
            server_id: server_id.clone(),
            status,
        });
    }

    fn publish(&self, server_id: &ServerId, status: ConnectionStatus) {
        self.statuses().insert(server_id.clone(), status);
        self.notify(server_id, status);
    }

    /// Replace a tracked status. Ids dropped from the map by `remove` while
    /// their probe was in flight stay untracked.
    fn settle(&self, server_id: &ServerId, status: ConnectionStatus) {
        let tracked = match self.statuses().get_mut(server_id) {
            Some(current) => {
                *current = status;
                true
            }
            None => false,
        };
        if tracked {
            self.notify(server_id, status);
        } else {
            debug!(server_id = %server_id, "Dropping result for removed server");
        }
    }

    /// Reset `Checking` to `Unknown` unless a newer result already landed
    fn abandon(&self, server_id: &ServerId) {
        let reverted = match self.statuses().get_mut(server_id) {
            Some(current) if *current == ConnectionStatus::Checking => {
                *current = ConnectionStatus::Unknown;
                true
            }
            _ => false,
        };
        if reverted {
            debug!(server_id = %server_id, "Check abandoned");
            self.notify(server_id, ConnectionStatus::Unknown);
        }
    }

    /// Last known status of a server (`Unknown` if never checked)
    pub fn status(&self, server_id: &ServerId) -> ConnectionStatus {
        self.statuses()
            .get(server_id)
            .copied()
            .unwrap_or_default()
    }

    /// Snapshot of every tracked status
    pub fn status_snapshot(&self) -> HashMap<ServerId, ConnectionStatus> {
        self.statuses().clone()
    }

    /// Receive status changes as checks start and finish
    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.events.subscribe()
    }

    fn begin_check(&self, server_id: &ServerId) -> PendingCheck<'_> {
        self.publish(server_id, ConnectionStatus::Checking);
        PendingCheck {
            registry: self,
            server_id: server_id.clone(),
            finished: false,
        }
    }

    async fn run_check(&self, record: ServerRecord, pending: PendingCheck<'_>) -> ConnectionStatus {
        let status = self
            .prober
            .probe(&record.server_url, self.probe_timeout)
            .await;
        pending.finish(status);
        status
    }

    /// Probe one server and record its status
    pub async fn check_connection(&self, server_id: &ServerId) -> Result<ConnectionStatus> {
        let record = self.get(server_id).await?;
        let pending = self.begin_check(server_id);
        Ok(self.run_check(record, pending).await)
    }

    /// Probe every server of `server_type` concurrently.
    ///
    /// All affected ids read `Checking` before the first probe is sent.
    pub async fn check_all_connections(
        &self,
        server_type: &str,
    ) -> Result<HashMap<ServerId, ConnectionStatus>> {
        let records = self.list(server_type).await?;
        let pending: Vec<_> = records
            .iter()
            .map(|r| self.begin_check(&r.server_id))
            .collect();

        debug!(server_type, count = records.len(), "Checking all servers");

        let checks = records
            .into_iter()
            .zip(pending)
            .map(|(record, pending)| async move {
                let id = record.server_id.clone();
                (id, self.run_check(record, pending).await)
            });

        Ok(join_all(checks).await.into_iter().collect())
    }
}

/// A started check; dropping it unfinished reverts `Checking` to `Unknown`
struct PendingCheck<'a> {
    registry: &'a ServerRegistry,
    server_id: ServerId,
    finished: bool,
}

impl PendingCheck<'_> {
    fn finish(mut self, status: ConnectionStatus) {
        self.finished = true;
        self.registry.settle(&self.server_id, status);
    }
}

impl Drop for PendingCheck<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.registry.abandon(&self.server_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn record(id: &str, server_type: &str, current: bool) -> ServerRecord {
        ServerRecord {
            server_id: ServerId::from(id),
            server_type: server_type.to_string(),
            server_name: id.to_string(),
            server_url: format!("http://{}.local", id),
            current,
        }
    }

    #[test]
    fn test_promote_only_touches_same_type() {
        let mut servers = vec![
            record("a", "stremio", true),
            record("b", "stremio", false),
            record("c", "torrserver", true),
        ];
        promote(&mut servers, 1);
        assert!(!servers[0].current);
        assert!(servers[1].current);
        assert!(servers[2].current);
    }

    #[test]
    fn test_promote_without_prior_current() {
        let mut servers = vec![record("a", "stremio", false), record("b", "stremio", false)];
        promote(&mut servers, 0);
        assert!(servers[0].current);
        assert!(!servers[1].current);
    }

    #[tokio::test]
    async fn test_abandon_keeps_newer_result() {
        let registry = ServerRegistry::new(Arc::new(MemoryStore::new()));
        let id = ServerId::from("stremio-1");

        let pending = registry.begin_check(&id);
        registry.publish(&id, ConnectionStatus::Connected);
        drop(pending);

        assert_eq!(registry.status(&id), ConnectionStatus::Connected);
    }

    #[tokio::test]
    async fn test_abandon_resets_checking_once() {
        let registry = ServerRegistry::new(Arc::new(MemoryStore::new()));
        let mut events = registry.subscribe();
        let id = ServerId::from("stremio-1");

        drop(registry.begin_check(&id));

        assert_eq!(registry.status(&id), ConnectionStatus::Unknown);
        assert_eq!(events.try_recv().unwrap().status, ConnectionStatus::Checking);
        assert_eq!(events.try_recv().unwrap().status, ConnectionStatus::Unknown);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_settle_skips_untracked_ids() {
        let registry = ServerRegistry::new(Arc::new(MemoryStore::new()));
        let id = ServerId::from("stremio-1");

        let pending = registry.begin_check(&id);
        registry.statuses().remove(&id);
        pending.finish(ConnectionStatus::Connected);

        assert!(!registry.status_snapshot().contains_key(&id));
    }

    #[test]
    fn test_validate_url() {
        assert!(validate_url("https://example.com").is_ok());
        assert!(validate_url("http://192.168.1.2:11470/").is_ok());
        assert!(matches!(
            validate_url("not a url"),
            Err(RegistryError::InvalidUrl { .. })
        ));
        assert!(validate_url("").is_err());
        assert!(validate_url("example.com").is_err());
    }

    #[test]
    fn test_decode_legacy_array() {
        let json = r#"[{"serverId":"stremio-1","serverType":"stremio","serverName":"Home","serverUrl":"http://home:11470","current":true}]"#;
        let servers = decode_servers(json).unwrap();
        assert_eq!(servers.len(), 1);
        assert!(servers[0].current);
    }

    #[test]
    fn test_decode_rejects_future_version() {
        let json = r#"{"version":99,"servers":[]}"#;
        assert!(matches!(
            decode_servers(json),
            Err(StoreError::UnsupportedVersion(99))
        ));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            decode_servers("{oops"),
            Err(StoreError::Corrupt(_))
        ));
    }

    #[test]
    fn test_encode_writes_envelope() {
        let json = encode_servers(&[record("a", "stremio", true)]).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["version"], SERVERS_VERSION);
        assert_eq!(value["servers"][0]["serverId"], "a");
    }

    #[tokio::test]
    async fn test_failed_mutation_writes_nothing() {
        let store = Arc::new(MemoryStore::new());
        let registry = ServerRegistry::new(store.clone());

        let result = registry
            .update(&ServerId::from("missing"), ServerPatch::make_current())
            .await;
        assert!(matches!(result, Err(RegistryError::NotFound(_))));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_legacy_list_upgraded_on_write() {
        let legacy = r#"[{"serverId":"stremio-1","serverType":"stremio","serverName":"Home","serverUrl":"http://home:11470","current":true}]"#;
        let store = Arc::new(MemoryStore::with_item(SERVERS_KEY, legacy));
        let registry = ServerRegistry::new(store.clone());

        registry
            .add("stremio", "Laptop", "http://laptop:11470", false)
            .await
            .unwrap();

        let raw = store.get_item(SERVERS_KEY).await.unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["version"], SERVERS_VERSION);
        assert_eq!(value["servers"].as_array().unwrap().len(), 2);
    }
}
