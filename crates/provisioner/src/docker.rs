//! Container runtime abstraction for testability.
//!
//! The [`ContainerRuntime`] trait abstracts the bollard Docker API, allowing
//! production code to use [`BollardRuntime`] while tests use `MockRuntime`.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │ InstanceManager  │
//! └────────┬─────────┘
//!          │
//!          ▼
//!  ┌────────────────┐
//!  │ContainerRuntime│ (trait)
//!  └────────────────┘
//!        │     │
//!        ▼     ▼
//!   ┌───────┐ ┌────┐
//!   │Bollard│ │Mock│
//!   └───┬───┘ └────┘
//!       │
//!       ▼
//!   Docker Daemon
//! ```
//!
//! # Error mapping
//!
//! - **404** on stop/remove/inspect: the container is absent, not an error
//! - **409** on create: [`ProvisionerError::NameConflict`]
//! - everything else, including 404 for a missing image or network on
//!   create: [`ProvisionerError::Runtime`]
//!
//! Timeouts are applied by the caller, not here. The image pull is a separate
//! call so a slow first pull is not charged to the create budget.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;

use futures_util::{StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::ProvisionerConfig;
use crate::database::{CommandExecutor, ExecOutput};
use crate::error::ProvisionerError;
use crate::labels::{MANAGED_LABEL, OWNER_LABEL};

/// Desired state of one instance container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    /// Container name (`ns_<identity>`)
    pub name: String,
    /// Image reference
    pub image: String,
    /// Environment variables
    pub env: BTreeMap<String, String>,
    /// Routing and ownership labels
    pub labels: BTreeMap<String, String>,
    /// Network the container joins
    pub network: String,
    /// Internal port exposed by the application
    pub app_port: u16,
    /// Publish `app_port` on an ephemeral host port
    pub publish_port: bool,
    /// `always`, `unless-stopped`, `on-failure` or `no`
    pub restart_policy: String,
}

impl ContainerSpec {
    /// Spec skeleton with runtime settings from `config`; env and labels empty.
    pub fn from_config(name: impl Into<String>, config: &ProvisionerConfig) -> Self {
        Self {
            name: name.into(),
            image: config.image.clone(),
            env: BTreeMap::new(),
            labels: BTreeMap::new(),
            network: config.network.clone(),
            app_port: config.app_port,
            publish_port: config.publish_port,
            restart_policy: config.restart_policy.clone(),
        }
    }
}

/// Runtime-assigned identity of a started container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerHandle {
    /// Runtime container ID
    pub id: String,
    /// Container name
    pub name: String,
}

/// Observed state of a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerState {
    pub id: String,
    pub name: String,
    pub image: String,
    pub running: bool,
    pub labels: BTreeMap<String, String>,
}

/// A container carrying the managed label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedContainer {
    pub id: String,
    pub name: String,
    /// Value of the owner label, if present
    pub owner: Option<String>,
    pub running: bool,
}

/// Trait abstracting container runtime operations.
///
/// The trait is `Send + Sync + 'static`, allowing the lifecycle manager to
/// share one runtime across spawned tasks.
pub trait ContainerRuntime: Send + Sync + 'static {
    /// Makes `image` available locally.
    ///
    /// Pulling runtimes do it here, not in [`create`](Self::create), so the
    /// pull gets its own time budget. The default does nothing.
    fn ensure_image(&self, image: &str) -> impl Future<Output = Result<(), ProvisionerError>> + Send {
        async move {
            debug!(image, "image preparation not required");
            Ok(())
        }
    }

    /// Creates and starts a detached container.
    ///
    /// The image must already be present (see
    /// [`ensure_image`](Self::ensure_image)). Callers must run [`ensure_absent`](Self::ensure_absent) first; a taken
    /// name is reported as [`ProvisionerError::NameConflict`].
    fn create(
        &self,
        spec: &ContainerSpec,
    ) -> impl Future<Output = Result<ContainerHandle, ProvisionerError>> + Send;

    /// Stops (with grace period) and force-removes a container.
    ///
    /// Returns `false` when no such container exists.
    fn remove(&self, name: &str) -> impl Future<Output = Result<bool, ProvisionerError>> + Send;

    /// Removes the container if present. Absence is success.
    fn ensure_absent(&self, name: &str) -> impl Future<Output = Result<(), ProvisionerError>> + Send {
        async move {
            if self.remove(name).await? {
                debug!(container = name, "removed stale container");
            }
            Ok(())
        }
    }

    /// Looks up a container by name.
    fn inspect(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<Option<ContainerState>, ProvisionerError>> + Send;

    /// Lists all managed containers, running or not.
    fn list_managed(
        &self,
    ) -> impl Future<Output = Result<Vec<ManagedContainer>, ProvisionerError>> + Send;

    /// Checks daemon connectivity.
    fn ping(&self) -> impl Future<Output = Result<(), ProvisionerError>> + Send;
}

fn status_code(err: &bollard::errors::Error) -> Option<u16> {
    match err {
        bollard::errors::Error::DockerResponseServerError { status_code, .. } => {
            Some(*status_code)
        }
        _ => None,
    }
}

fn runtime_err(action: &str, target: &str, err: bollard::errors::Error) -> ProvisionerError {
    ProvisionerError::Runtime(format!("{action} '{target}' failed: {err}"))
}

/// Production runtime implementation using `bollard`.
///
/// Internally uses `Arc<bollard::Docker>`; cloning is cheap.
#[derive(Clone)]
pub struct BollardRuntime {
    docker: Arc<bollard::Docker>,
    pull_image: bool,
    stop_grace_secs: i64,
}

impl BollardRuntime {
    /// Connects to Docker using the default local socket.
    pub fn connect_local() -> Result<Self, ProvisionerError> {
        let docker = bollard::Docker::connect_with_local_defaults().map_err(|e| {
            ProvisionerError::Runtime(format!("failed to connect to docker: {e}"))
        })?;
        Ok(Self::with_docker(docker))
    }

    /// Connects to Docker using a specific socket path.
    pub fn connect_with_socket(socket_path: &str) -> Result<Self, ProvisionerError> {
        let docker =
            bollard::Docker::connect_with_socket(socket_path, 120, bollard::API_DEFAULT_VERSION)
                .map_err(|e| {
                    ProvisionerError::Runtime(format!(
                        "failed to connect to docker at {socket_path}: {e}"
                    ))
                })?;
        Ok(Self::with_docker(docker))
    }

    /// Connects using the socket and runtime options from `config`.
    pub fn from_config(config: &ProvisionerConfig) -> Result<Self, ProvisionerError> {
        let runtime = if config.docker_socket.is_empty() {
            Self::connect_local()?
        } else {
            Self::connect_with_socket(&config.docker_socket)?
        };
        Ok(runtime
            .pull_image(config.pull_image)
            .stop_grace_secs(config.stop_grace_secs))
    }

    fn with_docker(docker: bollard::Docker) -> Self {
        Self {
            docker: Arc::new(docker),
            pull_image: true,
            stop_grace_secs: 10,
        }
    }

    /// Enables or disables pulling missing images.
    pub fn pull_image(mut self, pull: bool) -> Self {
        self.pull_image = pull;
        self
    }

    /// Sets the stop grace period.
    pub fn stop_grace_secs(mut self, secs: u64) -> Self {
        self.stop_grace_secs = i64::try_from(secs).unwrap_or(i64::MAX);
        self
    }

    async fn image_present(&self, image: &str) -> Result<bool, ProvisionerError> {
        match self.docker.inspect_image(image).await {
            Ok(_) => Ok(true),
            Err(e) if status_code(&e) == Some(404) => Ok(false),
            Err(e) => Err(runtime_err("inspect image", image, e)),
        }
    }

    async fn pull(&self, image: &str) -> Result<(), ProvisionerError> {
        use bollard::image::CreateImageOptions;

        info!(image, "pulling image");
        let options = CreateImageOptions {
            from_image: image,
            ..Default::default()
        };
        let mut progress = self.docker.create_image(Some(options), None, None);
        while let Some(step) = progress
            .try_next()
            .await
            .map_err(|e| runtime_err("pull image", image, e))?
        {
            if let Some(status) = step.status {
                debug!(image, status = status.as_str(), "pull progress");
            }
        }
        Ok(())
    }
}

fn restart_policy(name: &str) -> bollard::models::RestartPolicy {
    use bollard::models::RestartPolicyNameEnum;

    let name = match name {
        "unless-stopped" => RestartPolicyNameEnum::UNLESS_STOPPED,
        "on-failure" => RestartPolicyNameEnum::ON_FAILURE,
        "no" => RestartPolicyNameEnum::NO,
        _ => RestartPolicyNameEnum::ALWAYS,
    };
    bollard::models::RestartPolicy {
        name: Some(name),
        maximum_retry_count: None,
    }
}

fn container_config(spec: &ContainerSpec) -> bollard::container::Config<String> {
    use bollard::models::{HostConfig, PortBinding};

    let env = spec.env.iter().map(|(k, v)| format!("{k}={v}")).collect();
    let labels: HashMap<String, String> = spec
        .labels
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    let port_key = format!("{}/tcp", spec.app_port);
    let exposed_ports = HashMap::from([(port_key.clone(), HashMap::new())]);
    let port_bindings = spec.publish_port.then(|| {
        HashMap::from([(
            port_key,
            Some(vec![PortBinding {
                host_ip: None,
                host_port: None,
            }]),
        )])
    });

    let host_config = HostConfig {
        restart_policy: Some(restart_policy(&spec.restart_policy)),
        network_mode: Some(spec.network.clone()),
        port_bindings,
        ..Default::default()
    };

    bollard::container::Config {
        image: Some(spec.image.clone()),
        env: Some(env),
        labels: Some(labels),
        exposed_ports: Some(exposed_ports),
        host_config: Some(host_config),
        ..Default::default()
    }
}

impl ContainerRuntime for BollardRuntime {
    async fn ensure_image(&self, image: &str) -> Result<(), ProvisionerError> {
        if self.pull_image && !self.image_present(image).await? {
            self.pull(image).await?;
        }
        Ok(())
    }

    async fn create(&self, spec: &ContainerSpec) -> Result<ContainerHandle, ProvisionerError> {
        use bollard::container::{CreateContainerOptions, StartContainerOptions};

        let options = CreateContainerOptions {
            name: spec.name.clone(),
            ..Default::default()
        };
        let created = self
            .docker
            .create_container(Some(options), container_config(spec))
            .await
            .map_err(|e| match status_code(&e) {
                Some(409) => ProvisionerError::NameConflict(spec.name.clone()),
                _ => runtime_err("create container", &spec.name, e),
            })?;

        for warning in &created.warnings {
            debug!(container = spec.name.as_str(), warning = warning.as_str(), "create warning");
        }

        self.docker
            .start_container(&created.id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| runtime_err("start container", &spec.name, e))?;

        Ok(ContainerHandle {
            id: created.id,
            name: spec.name.clone(),
        })
    }

    async fn remove(&self, name: &str) -> Result<bool, ProvisionerError> {
        use bollard::container::{RemoveContainerOptions, StopContainerOptions};

        let stop = StopContainerOptions {
            t: self.stop_grace_secs,
        };
        match self.docker.stop_container(name, Some(stop)).await {
            Ok(()) => {}
            Err(e) if status_code(&e) == Some(404) => return Ok(false),
            // 304: already stopped
            Err(e) if status_code(&e) == Some(304) => {}
            Err(e) => return Err(runtime_err("stop container", name, e)),
        }

        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        match self.docker.remove_container(name, Some(options)).await {
            Ok(()) => Ok(true),
            // removed concurrently after the stop
            Err(e) if status_code(&e) == Some(404) => Ok(true),
            Err(e) => Err(runtime_err("remove container", name, e)),
        }
    }

    async fn inspect(&self, name: &str) -> Result<Option<ContainerState>, ProvisionerError> {
        use bollard::container::InspectContainerOptions;

        let details = match self
            .docker
            .inspect_container(name, None::<InspectContainerOptions>)
            .await
        {
            Ok(details) => details,
            Err(e) if status_code(&e) == Some(404) => return Ok(None),
            Err(e) => return Err(runtime_err("inspect container", name, e)),
        };

        let (image, labels) = details
            .config
            .map(|c| (c.image.unwrap_or_default(), c.labels.unwrap_or_default()))
            .unwrap_or_default();

        Ok(Some(ContainerState {
            id: details.id.unwrap_or_default(),
            name: details
                .name
                .map(|n| n.trim_start_matches('/').to_owned())
                .unwrap_or_else(|| name.to_owned()),
            image,
            running: details.state.and_then(|s| s.running).unwrap_or(false),
            labels: labels.into_iter().collect(),
        }))
    }

    async fn list_managed(&self) -> Result<Vec<ManagedContainer>, ProvisionerError> {
        use bollard::container::ListContainersOptions;

        let options = ListContainersOptions::<String> {
            all: true,
            filters: HashMap::from([(
                "label".to_owned(),
                vec![format!("{MANAGED_LABEL}=true")],
            )]),
            ..Default::default()
        };

        let containers = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(|e| ProvisionerError::Runtime(format!("list containers failed: {e}")))?;

        Ok(containers
            .into_iter()
            .map(|c| {
                let name = c
                    .names
                    .unwrap_or_default()
                    .first()
                    .map(|n| n.trim_start_matches('/').to_owned())
                    .unwrap_or_default();
                let owner = c.labels.and_then(|mut l| l.remove(OWNER_LABEL));
                ManagedContainer {
                    id: c.id.unwrap_or_default(),
                    name,
                    owner,
                    running: c.state.as_deref() == Some("running"),
                }
            })
            .collect())
    }

    async fn ping(&self) -> Result<(), ProvisionerError> {
        self.docker
            .ping()
            .await
            .map_err(|e| ProvisionerError::Runtime(format!("ping failed: {e}")))?;
        Ok(())
    }
}

impl CommandExecutor for BollardRuntime {
    async fn exec(&self, container: &str, cmd: Vec<String>) -> Result<ExecOutput, ProvisionerError> {
        use bollard::container::LogOutput;
        use bollard::exec::{CreateExecOptions, StartExecResults};

        let exec = self
            .docker
            .create_exec(
                container,
                CreateExecOptions {
                    cmd: Some(cmd),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| runtime_err("create exec in", container, e))?;

        let mut out = ExecOutput::default();
        if let StartExecResults::Attached { mut output, .. } = self
            .docker
            .start_exec(&exec.id, None)
            .await
            .map_err(|e| runtime_err("start exec in", container, e))?
        {
            while let Some(chunk) = output.next().await {
                match chunk.map_err(|e| runtime_err("read exec output from", container, e))? {
                    LogOutput::StdOut { message } => {
                        out.stdout.push_str(&String::from_utf8_lossy(&message));
                    }
                    LogOutput::StdErr { message } => {
                        out.stderr.push_str(&String::from_utf8_lossy(&message));
                    }
                    _ => {}
                }
            }
        }

        let inspected = self
            .docker
            .inspect_exec(&exec.id)
            .await
            .map_err(|e| runtime_err("inspect exec in", container, e))?;
        out.exit_code = inspected.exit_code;
        Ok(out)
    }
}

#[cfg(test)]
pub(crate) use mock::MockRuntime;


#[cfg(test)]
mod tests {
    use super::*;

    fn spec(name: &str) -> ContainerSpec {
        let mut spec = ContainerSpec::from_config(name, &ProvisionerConfig::default());
        spec.env.insert("PORT".to_owned(), "1337".to_owned());
        spec.labels.insert(MANAGED_LABEL.to_owned(), "true".to_owned());
        spec.labels.insert(OWNER_LABEL.to_owned(), "alice".to_owned());
        spec
    }

    #[test]
    fn spec_from_config_uses_runtime_settings() {
        let spec = ContainerSpec::from_config("ns_alice", &ProvisionerConfig::default());
        assert_eq!(spec.name, "ns_alice");
        assert_eq!(spec.image, "nightscout/cgm-remote-monitor:latest");
        assert_eq!(spec.network, "project_nightscout_net");
        assert_eq!(spec.app_port, 1337);
        assert_eq!(spec.restart_policy, "always");
        assert!(spec.env.is_empty());
    }

    #[test]
    fn container_config_carries_env_labels_and_port() {
        let config = container_config(&spec("ns_alice"));
        assert_eq!(config.env, Some(vec!["PORT=1337".to_owned()]));
        let labels = config.labels.unwrap();
        assert_eq!(labels.get(OWNER_LABEL).map(String::as_str), Some("alice"));
        assert!(config.exposed_ports.unwrap().contains_key("1337/tcp"));

        let host = config.host_config.unwrap();
        assert_eq!(host.network_mode.as_deref(), Some("project_nightscout_net"));
        assert!(host.port_bindings.unwrap().contains_key("1337/tcp"));
        assert_eq!(
            host.restart_policy.unwrap().name,
            Some(bollard::models::RestartPolicyNameEnum::ALWAYS)
        );
    }

    #[test]
    fn container_config_without_publish_has_no_bindings() {
        let mut spec = spec("ns_alice");
        spec.publish_port = false;
        let host = container_config(&spec).host_config.unwrap();
        assert!(host.port_bindings.is_none());
    }

    #[test]
    fn restart_policy_mapping() {
        use bollard::models::RestartPolicyNameEnum;
        assert_eq!(
            restart_policy("unless-stopped").name,
            Some(RestartPolicyNameEnum::UNLESS_STOPPED)
        );
        assert_eq!(restart_policy("no").name, Some(RestartPolicyNameEnum::NO));
        assert_eq!(
            restart_policy("on-failure").name,
            Some(RestartPolicyNameEnum::ON_FAILURE)
        );
    }

    #[test]
    fn status_code_extracts_server_errors() {
        let err = bollard::errors::Error::DockerResponseServerError {
            status_code: 409,
            message: "Conflict".to_owned(),
        };
        assert_eq!(status_code(&err), Some(409));
    }

    #[tokio::test]
    async fn mock_create_then_inspect() {
        let runtime = MockRuntime::new();
        let handle = runtime.create(&spec("ns_alice")).await.unwrap();
        assert_eq!(handle.name, "ns_alice");

        let state = runtime.inspect("ns_alice").await.unwrap().unwrap();
        assert_eq!(state.id, handle.id);
        assert!(state.running);
    }

    #[tokio::test]
    async fn mock_create_name_conflict() {
        let runtime = MockRuntime::new().with_container("ns_alice", Some("alice"));
        let err = runtime.create(&spec("ns_alice")).await.unwrap_err();
        assert!(matches!(err, ProvisionerError::NameConflict(_)));
    }

    #[tokio::test]
    async fn remove_of_never_created_container_returns_false() {
        let runtime = MockRuntime::new();
        assert!(!runtime.remove("ns_ghost").await.unwrap());
    }

    #[tokio::test]
    async fn remove_existing_returns_true() {
        let runtime = MockRuntime::new().with_container("ns_alice", Some("alice"));
        assert!(runtime.remove("ns_alice").await.unwrap());
        assert!(runtime.inspect("ns_alice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn ensure_absent_is_idempotent() {
        let runtime = MockRuntime::new().with_container("ns_alice", Some("alice"));
        runtime.ensure_absent("ns_alice").await.unwrap();
        runtime.ensure_absent("ns_alice").await.unwrap();
        assert!(runtime.container_names().is_empty());
    }

    #[tokio::test]
    async fn ensure_absent_propagates_runtime_errors() {
        let runtime = MockRuntime::new().with_failing_remove();
        let err = runtime.ensure_absent("ns_alice").await.unwrap_err();
        assert!(matches!(err, ProvisionerError::Runtime(_)));
    }

    #[tokio::test]
    async fn list_managed_reports_owner() {
        let runtime = MockRuntime::new()
            .with_container("ns_alice", Some("alice"))
            .with_container("ns_legacy", None);
        let managed = runtime.list_managed().await.unwrap();
        assert_eq!(managed.len(), 2);
        let alice = managed.iter().find(|c| c.name == "ns_alice").unwrap();
        assert_eq!(alice.owner.as_deref(), Some("alice"));
        let legacy = managed.iter().find(|c| c.name == "ns_legacy").unwrap();
        assert!(legacy.owner.is_none());
    }

    #[test]
    fn runtime_types_are_send_sync() {
        fn assert_send_sync<T: Send + Sync + 'static>() {}
        assert_send_sync::<MockRuntime>();
        assert_send_sync::<BollardRuntime>();
    }
}
