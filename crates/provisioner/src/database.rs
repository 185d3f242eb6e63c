//! 인스턴스별 논리 데이터베이스 관리
//!
//! 할당은 지연 방식입니다. 인스턴스는 자기 DB 이름으로 범위가 정해진 연결 URI만
//! 받고, 데이터베이스 서버가 첫 쓰기 때 DB를 만듭니다. 명시적 호출은 삭제뿐입니다.
//!
//! [`MongoShellProvisioner`]는 [`CommandExecutor`](운영 환경에서는 Docker exec API)로
//! 데이터베이스 컨테이너 안에서 셸을 실행해 DB를 삭제합니다. 셸은 설정된
//! `admin_uri`로 접속하므로 인증이 켜진 서버에서도 동작합니다.

use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use scoutpost_core::config::DB_PLACEHOLDER;

use crate::config::ProvisionerConfig;
use crate::error::ProvisionerError;

/// Result of a drop request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropOutcome {
    /// The database existed and was dropped
    Dropped,
    /// No database by that name
    NotFound,
}

/// Logical database lifecycle.
pub trait DatabaseProvisioner: Send + Sync + 'static {
    /// Connection URI handed to the instance for `db_name`.
    fn connection_uri(&self, db_name: &str) -> String;

    /// Irreversibly drops `db_name`.
    fn drop_database(
        &self,
        db_name: &str,
    ) -> impl Future<Output = Result<DropOutcome, ProvisionerError>> + Send;
}

/// Captured output of a command run inside a container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i64>,
}

/// Runs a command inside a running container.
pub trait CommandExecutor: Send + Sync + 'static {
    fn exec(
        &self,
        container: &str,
        cmd: Vec<String>,
    ) -> impl Future<Output = Result<ExecOutput, ProvisionerError>> + Send;
}

/// Substitutes `{db}` in `template`.
pub fn render_connection_uri(template: &str, db_name: &str) -> String {
    template.replace(DB_PLACEHOLDER, db_name)
}

/// Drops MongoDB databases via `mongosh --eval` in the database container.
pub struct MongoShellProvisioner<E> {
    executor: Arc<E>,
    connection_template: String,
    admin_container: String,
    admin_uri: String,
    shell: String,
}

impl<E: CommandExecutor> MongoShellProvisioner<E> {
    pub fn new(executor: Arc<E>, config: &ProvisionerConfig) -> Self {
        Self {
            executor,
            connection_template: config.connection_template.clone(),
            admin_container: config.admin_container.clone(),
            admin_uri: config.admin_uri.clone(),
            shell: config.shell.clone(),
        }
    }

    fn drop_command(&self, db_name: &str) -> Vec<String> {
        let script = format!(
            "const n = \"{db_name}\"; \
             if (db.getMongo().getDBNames().includes(n)) {{ \
             db.getSiblingDB(n).dropDatabase(); print(\"dropped\"); \
             }} else {{ print(\"missing\"); }}"
        );
        vec![
            self.shell.clone(),
            self.admin_uri.clone(),
            "--quiet".to_owned(),
            "--eval".to_owned(),
            script,
        ]
    }
}

/// Database names reach a script literal; only the identity alphabet passes.
fn check_db_name(db_name: &str) -> Result<(), ProvisionerError> {
    if db_name.is_empty()
        || !db_name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(ProvisionerError::Database(format!(
            "refusing to drop database with unsafe name '{db_name}'"
        )));
    }
    Ok(())
}

impl<E: CommandExecutor> DatabaseProvisioner for MongoShellProvisioner<E> {
    fn connection_uri(&self, db_name: &str) -> String {
        render_connection_uri(&self.connection_template, db_name)
    }

    async fn drop_database(&self, db_name: &str) -> Result<DropOutcome, ProvisionerError> {
        check_db_name(db_name)?;

        debug!(db_name, container = self.admin_container.as_str(), "dropping database");
        let output = self
            .executor
            .exec(&self.admin_container, self.drop_command(db_name))
            .await
            .map_err(|e| ProvisionerError::Database(format!("drop '{db_name}': {e}")))?;

        if output.exit_code != Some(0) {
            return Err(ProvisionerError::Database(format!(
                "drop '{db_name}' exited with {:?}: {}",
                output.exit_code,
                output.stderr.trim()
            )));
        }

        match output.stdout.lines().map(str::trim).rfind(|l| !l.is_empty()) {
            Some("dropped") => {
                info!(db_name, "database dropped");
                Ok(DropOutcome::Dropped)
            }
            Some("missing") => Ok(DropOutcome::NotFound),
            other => Err(ProvisionerError::Database(format!(
                "drop '{db_name}': unexpected shell output {other:?}"
            ))),
        }
    }
}
