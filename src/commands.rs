//! CLI Command Handlers
//!
//! Implements all CLI commands on top of the server registry.
//! Each handler takes CLI args, the registry and Output, returns ExitCode.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use tracing::debug;

use crate::app::error_message;
use crate::cli::{
    AddCmd, CheckCmd, EditCmd, ExitCode, ListCmd, Output, RemoveCmd, StatusOk, UseCmd,
};
use crate::config::Config;
use crate::models::{ConnectionStatus, ServerId, ServerPatch, ServerRecord};
use crate::registry::{RegistryError, ServerRegistry};
use crate::store::FileStore;

/// Open the registry backed by the configured store file
pub fn open_registry(config: &Config, timeout: Option<Duration>) -> anyhow::Result<ServerRegistry> {
    let path = config.store_path()?;
    debug!(path = %path.display(), "Opening server store");

    let registry = ServerRegistry::new(Arc::new(FileStore::new(path)))
        .with_probe_timeout(timeout.unwrap_or_else(|| config.probe_timeout()));
    Ok(registry)
}

/// Report a registry failure with its user-facing message
fn registry_error(output: &Output, err: RegistryError) -> ExitCode {
    debug!(error = %err, "Registry operation failed");
    output.error(error_message(&err), ExitCode::from(&err))
}

fn serialize_error(output: &Output, err: anyhow::Error) -> ExitCode {
    output.error(format!("Failed to serialize: {}", err), ExitCode::Error)
}

// =============================================================================
// List Command
// =============================================================================

pub async fn list_cmd(cmd: ListCmd, registry: &ServerRegistry, output: &Output) -> ExitCode {
    let result = match cmd.server_type {
        Some(ref server_type) => registry.list(server_type).await,
        None => registry.list_all().await,
    };

    match result {
        Ok(servers) => {
            if servers.is_empty() {
                output.info("No servers configured");
            }
            let lines: Vec<String> = servers.iter().map(|s| s.to_string()).collect();
            if let Err(e) = output.print_lines(&servers, &lines) {
                return serialize_error(output, e);
            }
            ExitCode::Success
        }
        Err(e) => registry_error(output, e),
    }
}

// =============================================================================
// Add / Edit / Use / Remove Commands
// =============================================================================

pub async fn add_cmd(cmd: AddCmd, registry: &ServerRegistry, output: &Output) -> ExitCode {
    match registry
        .add(&cmd.server_type, &cmd.name, &cmd.url, cmd.current)
        .await
    {
        Ok(record) => {
            output.info(format!("Added {}", record.server_id));
            print_record(output, &record)
        }
        Err(e) => registry_error(output, e),
    }
}

pub async fn edit_cmd(cmd: EditCmd, registry: &ServerRegistry, output: &Output) -> ExitCode {
    let patch = ServerPatch {
        server_url: cmd.url,
        server_name: cmd.name,
        current: None,
    };
    if patch.is_empty() {
        return output.error("Nothing to change. Pass --url and/or --name.", ExitCode::InvalidArgs);
    }

    match registry.update(&ServerId::from(cmd.id), patch).await {
        Ok(record) => print_record(output, &record),
        Err(e) => registry_error(output, e),
    }
}

pub async fn use_cmd(cmd: UseCmd, registry: &ServerRegistry, output: &Output) -> ExitCode {
    let id = ServerId::from(cmd.id);
    if let Err(e) = registry.set_current(&id).await {
        return registry_error(output, e);
    }

    match registry.get(&id).await {
        Ok(record) => {
            output.info(format!(
                "{} is now the current {} server",
                record.server_name, record.server_type
            ));
            print_record(output, &record)
        }
        Err(e) => registry_error(output, e),
    }
}

pub async fn remove_cmd(cmd: RemoveCmd, registry: &ServerRegistry, output: &Output) -> ExitCode {
    match registry.remove(&ServerId::from(cmd.id)).await {
        Ok(()) => {
            if let Err(e) = output.print(StatusOk::default()) {
                return serialize_error(output, e);
            }
            ExitCode::Success
        }
        Err(e) => registry_error(output, e),
    }
}

fn print_record(output: &Output, record: &ServerRecord) -> ExitCode {
    if let Err(e) = output.print_lines(record, &[record.to_string()]) {
        return serialize_error(output, e);
    }
    ExitCode::Success
}

// =============================================================================
// Check Command
// =============================================================================

/// One probed server in `check` output
#[derive(Debug, Serialize)]
pub struct CheckResult {
    pub server_id: ServerId,
    pub server_type: String,
    pub server_name: String,
    pub server_url: String,
    pub current: bool,
    pub status: ConnectionStatus,
}

impl CheckResult {
    fn new(record: ServerRecord, status: ConnectionStatus) -> Self {
        Self {
            server_id: record.server_id,
            server_type: record.server_type,
            server_name: record.server_name,
            server_url: record.server_url,
            current: record.current,
            status,
        }
    }

    fn line(&self) -> String {
        format!(
            "{} {:<12} {} [{}] {}",
            self.status.symbol(),
            self.status,
            self.server_name,
            self.server_type,
            self.server_url
        )
    }
}

pub async fn check_cmd(cmd: CheckCmd, registry: &ServerRegistry, output: &Output) -> ExitCode {
    let results = match (cmd.id, cmd.server_type) {
        (Some(id), _) => check_one(registry, ServerId::from(id)).await,
        (None, Some(server_type)) => check_type(registry, &server_type).await,
        (None, None) => check_everything(registry).await,
    };

    let results = match results {
        Ok(results) => results,
        Err(e) => return registry_error(output, e),
    };

    if results.is_empty() {
        output.info("No servers to check");
    } else {
        output.info(format!(
            "Probed {} server(s) with a {} ms timeout",
            results.len(),
            registry.probe_timeout().as_millis()
        ));
    }

    let lines: Vec<String> = results.iter().map(CheckResult::line).collect();
    if let Err(e) = output.print_lines(&results, &lines) {
        return serialize_error(output, e);
    }

    if results
        .iter()
        .all(|r| r.status == ConnectionStatus::Connected)
    {
        ExitCode::Success
    } else {
        ExitCode::Unreachable
    }
}

async fn check_one(
    registry: &ServerRegistry,
    id: ServerId,
) -> Result<Vec<CheckResult>, RegistryError> {
    let record = registry.get(&id).await?;
    let status = registry.check_connection(&id).await?;
    Ok(vec![CheckResult::new(record, status)])
}

async fn check_type(
    registry: &ServerRegistry,
    server_type: &str,
) -> Result<Vec<CheckResult>, RegistryError> {
    let records = registry.list(server_type).await?;
    let statuses = registry.check_all_connections(server_type).await?;
    Ok(merge(records, &statuses))
}

async fn check_everything(registry: &ServerRegistry) -> Result<Vec<CheckResult>, RegistryError> {
    let records = registry.list_all().await?;
    let types: BTreeSet<&str> = records.iter().map(|r| r.server_type.as_str()).collect();

    let mut statuses = HashMap::new();
    for result in join_all(types.into_iter().map(|t| registry.check_all_connections(t))).await {
        statuses.extend(result?);
    }
    Ok(merge(records, &statuses))
}

/// Pair records with probe results, keeping list order
fn merge(
    records: Vec<ServerRecord>,
    statuses: &HashMap<ServerId, ConnectionStatus>,
) -> Vec<CheckResult> {
    records
        .into_iter()
        .map(|r| {
            let status = statuses.get(&r.server_id).copied().unwrap_or_default();
            CheckResult::new(r, status)
        })
        .collect()
}
