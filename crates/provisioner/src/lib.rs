#![doc = include_str!("../README.md")]
//!
//! # Module Structure
//!
//! - [`error`]: Domain error types (`ProvisionerError`)
//! - [`config`]: Provisioner configuration (`ProvisionerConfig`, builder)
//! - [`labels`]: Routing and ownership labels (`RoutingPolicy`)
//! - [`docker`]: Container runtime abstraction (`ContainerRuntime` trait, `BollardRuntime`)
//! - [`database`]: Logical database lifecycle (`DatabaseProvisioner`, `MongoShellProvisioner`)
//! - [`store`]: Instance records (`InstanceStore`, `SqliteInstanceStore`, `MemoryInstanceStore`)
//! - [`reconcile`]: Drift report (`ReconciliationReport`)
//! - [`lifecycle`]: Main orchestrator (`InstanceManager`, `InstanceManagerBuilder`)
//!
//! # Architecture
//!
//! ```text
//! create_instance(owner, secret, settings)
//!        |
//!   InstanceStore.insert(creating)      <- claim, unique on owner
//!        |
//!   ContainerRuntime.create(spec)       <- env + traefik labels
//!        |
//!   InstanceStore.update_status(active)
//!
//! delete_instance(owner)
//!        |
//!   update_status(deleting) -> ContainerRuntime.remove
//!        |
//!   DatabaseProvisioner.drop_database -> InstanceStore.delete_by_owner
//! ```

pub mod config;
pub mod database;
pub mod docker;
pub mod error;
pub mod labels;
pub mod lifecycle;
pub mod reconcile;
pub mod store;

// --- Public API Re-exports ---

// Lifecycle (main orchestrator)
pub use lifecycle::{
    CreateOutcome, DatabaseCleanup, DeleteOutcome, DeleteReport, InstanceManager,
    InstanceManagerBuilder,
};

// Configuration
pub use config::{ProvisionerConfig, ProvisionerConfigBuilder};

// Error
pub use error::ProvisionerError;

// Container runtime
pub use docker::{BollardRuntime, ContainerHandle, ContainerRuntime, ContainerSpec, ManagedContainer};

// Database
pub use database::{CommandExecutor, DatabaseProvisioner, DropOutcome, MongoShellProvisioner};

// Routing
pub use labels::RoutingPolicy;

// Store
pub use store::{InstanceStore, MemoryInstanceStore, SqliteInstanceStore};

// Reconciliation
pub use reconcile::ReconciliationReport;
