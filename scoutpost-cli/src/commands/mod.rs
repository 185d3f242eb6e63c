//! Command handlers -- one module per subcommand

pub mod config;
pub mod instance;
pub mod reconcile;

use std::sync::Arc;

use tracing::debug;

use scoutpost_core::config::ScoutpostConfig;
use scoutpost_provisioner::{
    BollardRuntime, ContainerRuntime, InstanceManager, InstanceManagerBuilder,
    MongoShellProvisioner, ProvisionerConfig, SqliteInstanceStore,
};

use crate::error::CliError;

/// Manager wired to Docker, SQLite and `mongosh`.
pub type Manager =
    InstanceManager<BollardRuntime, SqliteInstanceStore, MongoShellProvisioner<BollardRuntime>>;

/// Builds the production manager from the loaded configuration.
///
/// With `require_runtime`, the Docker daemon is pinged first so that an
/// unreachable daemon fails fast with exit code 3.
pub async fn connect(config: &ScoutpostConfig, require_runtime: bool) -> Result<Manager, CliError> {
    let provisioner_config = ProvisionerConfig::from_core(config);
    let runtime = Arc::new(BollardRuntime::from_config(&provisioner_config)?);
    if require_runtime {
        runtime
            .ping()
            .await
            .map_err(|e| CliError::RuntimeUnavailable(e.to_string()))?;
        debug!(socket = %provisioner_config.docker_socket, "container runtime reachable");
    }

    let store = Arc::new(SqliteInstanceStore::open(&config.store.path)?);
    let database = Arc::new(MongoShellProvisioner::new(
        Arc::clone(&runtime),
        &provisioner_config,
    ));

    let manager = InstanceManagerBuilder::new()
        .config(provisioner_config)
        .runtime(runtime)
        .store(store)
        .database(database)
        .build()?;
    Ok(manager)
}
