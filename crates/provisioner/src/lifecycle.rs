//! 인스턴스 생명주기 관리자 -- 생성/삭제/정리 전체 흐름 관리
//!
//! [`InstanceManager`]는 레코드 저장소, 컨테이너 런타임, 데이터베이스 프로비저너를
//! 묶어 한 사용자당 하나의 인스턴스를 보장합니다.
//!
//! # 생성 흐름
//! ```text
//! validate identity ─> find_by_owner ──(exists)──> Existing
//!                           │
//!                      insert(creating)  ── conflict ──> ProvisioningFailed
//!                           │
//!       ensure_absent + ensure_image + create (각각 bounded)
//!                           │            └─ error ─> remove, release claim
//!                 update_status(active)
//!                           │            └─ error ─> remove, release claim
//!                        Created
//! ```
//!
//! 생성/삭제 본문은 별도 태스크에서 실행되므로 호출자의 future가 drop되어도
//! 중간에 끊기지 않습니다.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use metrics::{counter, histogram};
use serde::Serialize;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use scoutpost_core::metrics as m;
use scoutpost_core::naming::{InstanceNames, validate_identity};
use scoutpost_core::types::{AccessSecret, InstanceRecord, InstanceSettings, InstanceStatus};

use crate::config::ProvisionerConfig;
use crate::database::{DatabaseProvisioner, DropOutcome};
use crate::docker::{ContainerRuntime, ContainerSpec};
use crate::error::ProvisionerError;
use crate::labels::RoutingPolicy;
use crate::reconcile::{self, ReconciliationReport};
use crate::store::InstanceStore;

/// Result of [`InstanceManager::create_instance`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    /// A new instance was provisioned
    Created(InstanceRecord),
    /// The owner already had an instance; nothing was touched
    Existing(InstanceRecord),
}

impl CreateOutcome {
    pub fn record(&self) -> &InstanceRecord {
        match self {
            Self::Created(r) | Self::Existing(r) => r,
        }
    }

    pub fn into_record(self) -> InstanceRecord {
        match self {
            Self::Created(r) | Self::Existing(r) => r,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

/// What happened to the logical database during teardown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum DatabaseCleanup {
    Dropped,
    NotFound,
    /// Drop failed; the database must be removed by an operator
    Failed { reason: String },
}

/// Teardown summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteReport {
    pub owner: String,
    /// `false` when the container was already gone
    pub container_removed: bool,
    pub database: DatabaseCleanup,
    /// `false` when no record existed (purge only)
    pub record_deleted: bool,
}

/// Result of [`InstanceManager::delete_instance`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted(DeleteReport),
    /// No record for the owner; no runtime call was made
    NotFound,
}

/// 인스턴스 생명주기 관리자
///
/// Cheap to clone; all clones share the same runtime, store and provisioner.
pub struct InstanceManager<R, S, P> {
    inner: Arc<Inner<R, S, P>>,
}

impl<R, S, P> Clone for InstanceManager<R, S, P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<R, S, P> {
    config: ProvisionerConfig,
    routing: RoutingPolicy,
    runtime: Arc<R>,
    store: Arc<S>,
    database: Arc<P>,
}

/// Runs `fut` under `limit`; a timeout becomes [`ProvisionerError::Runtime`].
async fn bounded<T, F>(limit: Duration, what: &str, fut: F) -> Result<T, ProvisionerError>
where
    F: Future<Output = Result<T, ProvisionerError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => {
            counter!(m::RUNTIME_ERRORS_TOTAL).increment(1);
            Err(e)
        }
        Err(_) => {
            counter!(m::RUNTIME_TIMEOUTS_TOTAL).increment(1);
            Err(ProvisionerError::Runtime(format!(
                "{what} timed out after {}s",
                limit.as_secs_f64()
            )))
        }
    }
}

fn task_failed(e: tokio::task::JoinError) -> ProvisionerError {
    ProvisionerError::Runtime(format!("lifecycle task failed: {e}"))
}

impl<R, S, P> InstanceManager<R, S, P>
where
    R: ContainerRuntime,
    S: InstanceStore,
    P: DatabaseProvisioner,
{
    /// Provisions an instance for `owner` unless one already exists.
    ///
    /// Idempotent: a second call for the same owner returns
    /// [`CreateOutcome::Existing`] without touching the runtime. That includes
    /// a record stalled in `creating` or `deleting`; callers should check its
    /// status and purge it. The credential
    /// is passed through to the instance and never stored.
    pub async fn create_instance(
        &self,
        owner: &str,
        secret: AccessSecret,
        settings: InstanceSettings,
    ) -> Result<CreateOutcome, ProvisionerError> {
        validate_identity(owner)?;

        if let Some(existing) = self.inner.store.find_by_owner(owner).await? {
            if existing.status == InstanceStatus::Active {
                debug!(owner, "instance already exists");
            } else {
                warn!(owner, status = %existing.status, "existing record is stalled, purge to recover");
            }
            counter!(m::INSTANCE_CREATES_TOTAL, m::LABEL_RESULT => "existing").increment(1);
            return Ok(CreateOutcome::Existing(existing));
        }

        let inner = Arc::clone(&self.inner);
        let owner = owner.to_owned();
        let span = info_span!("create_instance", owner = %owner, operation_id = %Uuid::new_v4());
        tokio::spawn(async move { inner.provision(owner, secret, settings).await }.instrument(span))
            .await
            .map_err(task_failed)?
    }

    /// Tears down the instance of `owner`: container, database, record.
    ///
    /// A database drop failure is reported in the [`DeleteReport`], not as an
    /// error. A container removal failure rolls the record back to `active`.
    pub async fn delete_instance(&self, owner: &str) -> Result<DeleteOutcome, ProvisionerError> {
        let inner = Arc::clone(&self.inner);
        let owner = owner.to_owned();
        let span = info_span!("delete_instance", owner = %owner, operation_id = %Uuid::new_v4());
        tokio::spawn(async move { inner.teardown(owner).await }.instrument(span))
            .await
            .map_err(task_failed)?
    }

    /// Removes everything named for `owner` regardless of record state.
    ///
    /// Works without a record, for cleaning up orphans found by [`reconcile`](Self::reconcile).
    pub async fn purge_instance(&self, owner: &str) -> Result<DeleteReport, ProvisionerError> {
        validate_identity(owner)?;
        let inner = Arc::clone(&self.inner);
        let owner = owner.to_owned();
        let span = info_span!("purge_instance", owner = %owner, operation_id = %Uuid::new_v4());
        tokio::spawn(async move { inner.purge(owner).await }.instrument(span))
            .await
            .map_err(task_failed)?
    }

    /// Record for `owner`, if any.
    pub async fn get_instance(&self, owner: &str) -> Result<Option<InstanceRecord>, ProvisionerError> {
        self.inner.store.find_by_owner(owner).await
    }

    /// Records ordered by creation time; `None` uses the configured limit.
    pub async fn list_instances(
        &self,
        limit: Option<usize>,
    ) -> Result<Vec<InstanceRecord>, ProvisionerError> {
        let limit = limit.unwrap_or(self.inner.config.list_limit);
        self.inner.store.list_all(limit).await
    }

    /// Read-only comparison of records against managed containers.
    pub async fn reconcile(
        &self,
        limit: Option<usize>,
    ) -> Result<ReconciliationReport, ProvisionerError> {
        let limit = limit.unwrap_or(self.inner.config.list_limit);
        reconcile::sweep(&*self.inner.runtime, &*self.inner.store, limit).await
    }

    /// Public URL of an instance.
    pub fn instance_url(&self, record: &InstanceRecord) -> String {
        record.url(&self.inner.config.base_domain)
    }

    /// Checks that the container runtime is reachable.
    pub async fn ping(&self) -> Result<(), ProvisionerError> {
        self.inner.runtime.ping().await
    }

    pub fn config(&self) -> &ProvisionerConfig {
        &self.inner.config
    }
}

impl<R, S, P> Inner<R, S, P>
where
    R: ContainerRuntime,
    S: InstanceStore,
    P: DatabaseProvisioner,
{
    fn container_spec(&self, record: &InstanceRecord, secret: &AccessSecret) -> ContainerSpec {
        let mut env = BTreeMap::new();
        env.insert(
            "MONGO_CONNECTION".to_owned(),
            self.database.connection_uri(&record.db_name),
        );
        env.insert("API_SECRET".to_owned(), secret.expose().to_owned());
        env.insert("PORT".to_owned(), self.config.app_port.to_string());
        env.extend(self.config.default_env.clone());
        env.extend(
            record
                .settings
                .iter()
                .map(|(k, v)| (k.to_owned(), v.to_owned())),
        );

        let mut spec = ContainerSpec::from_config(&record.container_name, &self.config);
        spec.env = env;
        spec.labels = self.routing.labels_for(&record.owner, &record.subdomain);
        spec
    }

    async fn provision(
        &self,
        owner: String,
        secret: AccessSecret,
        settings: InstanceSettings,
    ) -> Result<CreateOutcome, ProvisionerError> {
        let started = Instant::now();
        let record = InstanceRecord::claim(&owner, settings, Utc::now());
        let spec = self.container_spec(&record, &secret);
        let container = record.container_name.clone();

        if let Err(e) = self.store.insert(record).await {
            counter!(m::INSTANCE_CREATES_TOTAL, m::LABEL_RESULT => "failed").increment(1);
            return match e {
                ProvisionerError::RecordConflict(reason) => {
                    warn!(reason = reason.as_str(), "claim rejected, another create won");
                    Err(ProvisionerError::ProvisioningFailed {
                        owner,
                        reason: format!("claim rejected: {reason}"),
                        orphaned_container: None,
                    })
                }
                other => Err(other),
            };
        }
        debug!(container = container.as_str(), "owner claimed");

        let started_container = async {
            bounded(
                self.config.remove_timeout(),
                "remove stale container",
                self.runtime.ensure_absent(&container),
            )
            .await?;
            bounded(
                self.config.pull_timeout(),
                "pull image",
                self.runtime.ensure_image(&spec.image),
            )
            .await?;
            bounded(
                self.config.create_timeout(),
                "create container",
                self.runtime.create(&spec),
            )
            .await
        }
        .await;

        let handle = match started_container {
            Ok(handle) => handle,
            Err(e) => {
                error!(container = container.as_str(), error = %e, "container start failed, rolling back");
                let orphaned_container = self.discard(&owner, &container).await;
                counter!(m::INSTANCE_CREATES_TOTAL, m::LABEL_RESULT => "failed").increment(1);
                return Err(ProvisionerError::ProvisioningFailed {
                    owner,
                    reason: e.to_string(),
                    orphaned_container,
                });
            }
        };

        match self
            .store
            .update_status(&owner, InstanceStatus::Creating, InstanceStatus::Active)
            .await
        {
            Ok(record) => {
                let elapsed = started.elapsed().as_secs_f64();
                info!(
                    container = container.as_str(),
                    container_id = handle.id.as_str(),
                    subdomain = record.subdomain.as_str(),
                    elapsed_secs = elapsed,
                    "instance created"
                );
                counter!(m::INSTANCE_CREATES_TOTAL, m::LABEL_RESULT => "created").increment(1);
                histogram!(m::INSTANCE_CREATE_DURATION_SECONDS).record(elapsed);
                Ok(CreateOutcome::Created(record))
            }
            Err(e) => {
                error!(container = container.as_str(), error = %e, "activating record failed, rolling back");
                let orphaned_container = self.discard(&owner, &container).await;
                counter!(m::INSTANCE_CREATES_TOTAL, m::LABEL_RESULT => "failed").increment(1);
                Err(ProvisionerError::ProvisioningFailed {
                    owner,
                    reason: format!("activate record: {e}"),
                    orphaned_container,
                })
            }
        }
    }

    /// Best-effort rollback of a failed create. Returns the container name if
    /// it may still exist.
    async fn discard(&self, owner: &str, container: &str) -> Option<String> {
        let orphan = match bounded(
            self.config.remove_timeout(),
            "remove failed container",
            self.runtime.ensure_absent(container),
        )
        .await
        {
            Ok(()) => None,
            Err(e) => {
                error!(container, error = %e, "rollback left a container behind");
                counter!(m::INSTANCE_ORPHANS_TOTAL).increment(1);
                Some(container.to_owned())
            }
        };

        if let Err(e) = self.store.delete_by_owner(owner).await {
            error!(error = %e, "releasing claim failed, record stays in creating");
        }
        orphan
    }

    async fn teardown(&self, owner: String) -> Result<DeleteOutcome, ProvisionerError> {
        let Some(record) = self.store.find_by_owner(&owner).await? else {
            debug!("no record, nothing to delete");
            counter!(m::INSTANCE_DELETES_TOTAL, m::LABEL_RESULT => "not_found").increment(1);
            return Ok(DeleteOutcome::NotFound);
        };

        match record.status {
            InstanceStatus::Deleting => info!("resuming interrupted delete"),
            status => {
                status.transition(&owner, InstanceStatus::Deleting)?;
                self.store
                    .update_status(&owner, status, InstanceStatus::Deleting)
                    .await?;
            }
        }

        let container_removed = match bounded(
            self.config.remove_timeout(),
            "remove container",
            self.runtime.remove(&record.container_name),
        )
        .await
        {
            Ok(removed) => removed,
            Err(e) => {
                error!(container = record.container_name.as_str(), error = %e, "container removal failed");
                if let Err(rollback) = self
                    .store
                    .update_status(&owner, InstanceStatus::Deleting, InstanceStatus::Active)
                    .await
                {
                    warn!(error = %rollback, "status rollback failed, record stays in deleting");
                }
                counter!(m::INSTANCE_DELETES_TOTAL, m::LABEL_RESULT => "failed").increment(1);
                return Err(e);
            }
        };

        let database = self.drop_database(&record.db_name).await;
        self.store.delete_by_owner(&owner).await?;

        info!(
            container = record.container_name.as_str(),
            container_removed,
            database = ?database,
            "instance deleted"
        );
        counter!(m::INSTANCE_DELETES_TOTAL, m::LABEL_RESULT => "deleted").increment(1);
        Ok(DeleteOutcome::Deleted(DeleteReport {
            owner,
            container_removed,
            database,
            record_deleted: true,
        }))
    }

    async fn purge(&self, owner: String) -> Result<DeleteReport, ProvisionerError> {
        let names = InstanceNames::derive(&owner);
        warn!(container = names.container_name.as_str(), "purging instance");

        let container_removed = bounded(
            self.config.remove_timeout(),
            "remove container",
            self.runtime.remove(&names.container_name),
        )
        .await?;
        let database = self.drop_database(&names.db_name).await;
        let record_deleted = self.store.delete_by_owner(&owner).await?;

        counter!(m::INSTANCE_DELETES_TOTAL, m::LABEL_RESULT => "purged").increment(1);
        Ok(DeleteReport {
            owner,
            container_removed,
            database,
            record_deleted,
        })
    }

    async fn drop_database(&self, db_name: &str) -> DatabaseCleanup {
        let limit = self.config.drop_timeout();
        let reason = match tokio::time::timeout(limit, self.database.drop_database(db_name)).await {
            Ok(Ok(DropOutcome::Dropped)) => return DatabaseCleanup::Dropped,
            Ok(Ok(DropOutcome::NotFound)) => {
                debug!(db_name, "database did not exist");
                return DatabaseCleanup::NotFound;
            }
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("drop timed out after {}s", limit.as_secs_f64()),
        };
        error!(db_name, reason = reason.as_str(), "database drop failed");
        counter!(m::DATABASE_DROP_FAILURES_TOTAL).increment(1);
        DatabaseCleanup::Failed { reason }
    }
}

/// 인스턴스 관리자 빌더
pub struct InstanceManagerBuilder<R, S, P> {
    config: ProvisionerConfig,
    runtime: Option<Arc<R>>,
    store: Option<Arc<S>>,
    database: Option<Arc<P>>,
}

impl<R, S, P> InstanceManagerBuilder<R, S, P>
where
    R: ContainerRuntime,
    S: InstanceStore,
    P: DatabaseProvisioner,
{
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self {
            config: ProvisionerConfig::default(),
            runtime: None,
            store: None,
            database: None,
        }
    }

    /// 프로비저너 설정을 지정합니다.
    pub fn config(mut self, config: ProvisionerConfig) -> Self {
        self.config = config;
        self
    }

    /// 컨테이너 런타임을 설정합니다.
    pub fn runtime(mut self, runtime: Arc<R>) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// 레코드 저장소를 설정합니다.
    pub fn store(mut self, store: Arc<S>) -> Self {
        self.store = Some(store);
        self
    }

    /// 데이터베이스 프로비저너를 설정합니다.
    pub fn database(mut self, database: Arc<P>) -> Self {
        self.database = Some(database);
        self
    }

    /// 관리자를 빌드합니다.
    pub fn build(self) -> Result<InstanceManager<R, S, P>, ProvisionerError> {
        self.config.validate()?;

        let missing = |field: &str| ProvisionerError::Config {
            field: field.to_owned(),
            reason: format!("{field} must be provided"),
        };
        let runtime = self.runtime.ok_or_else(|| missing("runtime"))?;
        let store = self.store.ok_or_else(|| missing("store"))?;
        let database = self.database.ok_or_else(|| missing("database"))?;

        Ok(InstanceManager {
            inner: Arc::new(Inner {
                routing: RoutingPolicy::from_config(&self.config),
                config: self.config,
                runtime,
                store,
                database,
            }),
        })
    }
}

impl<R, S, P> Default for InstanceManagerBuilder<R, S, P>
where
    R: ContainerRuntime,
    S: InstanceStore,
    P: DatabaseProvisioner,
{
    fn default() -> Self {
        Self::new()
    }
}
