//! 프로비저너 설정
//!
//! [`ProvisionerConfig`]는 core의 [`ScoutpostConfig`](scoutpost_core::config::ScoutpostConfig)
//! 섹션들(runtime, routing, database, instance)을 생명주기 관리자가 쓰는 하나의
//! 평면 구조로 모읍니다.
//!
//! # 사용 예시
//! ```ignore
//! use scoutpost_core::config::ScoutpostConfig;
//! use scoutpost_provisioner::config::ProvisionerConfig;
//!
//! let core_config = ScoutpostConfig::default();
//! let config = ProvisionerConfig::from_core(&core_config);
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use scoutpost_core::config::{DB_PLACEHOLDER, ScoutpostConfig};

use crate::error::ProvisionerError;

/// 프로비저너 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionerConfig {
    /// Docker 소켓 경로
    pub docker_socket: String,
    /// 프록시와 공유하는 Docker 네트워크
    pub network: String,
    /// 인스턴스 이미지
    pub image: String,
    /// 컨테이너 내부 포트
    pub app_port: u16,
    /// 내부 포트를 임의의 호스트 포트로 공개할지 여부
    pub publish_port: bool,
    /// 재시작 정책
    pub restart_policy: String,
    /// 이미지가 없을 때 pull 시도
    pub pull_image: bool,
    /// 정지 유예 시간 (초). `remove_timeout_secs`보다 짧아야 함
    pub stop_grace_secs: u64,
    /// 이미지 pull 타임아웃 (초)
    pub pull_timeout_secs: u64,
    /// 생성 타임아웃 (초)
    pub create_timeout_secs: u64,
    /// 제거 타임아웃 (초)
    pub remove_timeout_secs: u64,

    /// 기본 도메인
    pub base_domain: String,
    /// 라우터 이름 접두어
    pub router_prefix: String,
    /// 라우터 entrypoints
    pub entrypoints: Option<String>,
    /// TLS 인증서 resolver
    pub cert_resolver: Option<String>,

    /// 연결 문자열 템플릿
    pub connection_template: String,
    /// 데이터베이스 관리 컨테이너
    pub admin_container: String,
    /// 관리 셸 접속 URI
    pub admin_uri: String,
    /// 데이터베이스 셸
    pub shell: String,
    /// 데이터베이스 삭제 타임아웃 (초)
    pub drop_timeout_secs: u64,

    /// 모든 인스턴스에 주입되는 추가 환경변수
    pub default_env: BTreeMap<String, String>,
    /// 목록 조회 기본 개수
    pub list_limit: usize,
}

impl Default for ProvisionerConfig {
    fn default() -> Self {
        Self::from_core(&ScoutpostConfig::default())
    }
}

/// 설정 상한값 상수
const MAX_STOP_GRACE_SECS: u64 = 300;
const MAX_PULL_TIMEOUT_SECS: u64 = 3600;
const MAX_CREATE_TIMEOUT_SECS: u64 = 600;
const MAX_REMOVE_TIMEOUT_SECS: u64 = 300;
const MAX_DROP_TIMEOUT_SECS: u64 = 300;
const MAX_LIST_LIMIT: usize = 10_000;

/// `default_env`에 둘 수 없는 키. 호출자 settings는 마지막에 병합되어 덮어쓸 수 있음
pub const RESERVED_ENV_KEYS: [&str; 3] = ["MONGO_CONNECTION", "API_SECRET", "PORT"];

impl ProvisionerConfig {
    /// core 설정에서 프로비저너 설정을 생성합니다.
    pub fn from_core(core: &ScoutpostConfig) -> Self {
        Self {
            docker_socket: core.runtime.docker_socket.clone(),
            network: core.runtime.network.clone(),
            image: core.runtime.image.clone(),
            app_port: core.runtime.app_port,
            publish_port: core.runtime.publish_port,
            restart_policy: core.runtime.restart_policy.clone(),
            pull_image: core.runtime.pull_image,
            stop_grace_secs: core.runtime.stop_grace_secs,
            pull_timeout_secs: core.runtime.pull_timeout_secs,
            create_timeout_secs: core.runtime.create_timeout_secs,
            remove_timeout_secs: core.runtime.remove_timeout_secs,
            base_domain: core.routing.base_domain.clone(),
            router_prefix: core.routing.router_prefix.clone(),
            entrypoints: core.routing.entrypoints.clone(),
            cert_resolver: core.routing.cert_resolver.clone(),
            connection_template: core.database.connection_template.clone(),
            admin_container: core.database.admin_container.clone(),
            admin_uri: core.database.admin_uri.clone(),
            shell: core.database.shell.clone(),
            drop_timeout_secs: core.database.drop_timeout_secs,
            default_env: core.instance.default_env.clone(),
            list_limit: core.instance.list_limit,
        }
    }

    /// 이미지 pull 타임아웃
    pub fn pull_timeout(&self) -> Duration {
        Duration::from_secs(self.pull_timeout_secs)
    }

    /// 생성 타임아웃
    pub fn create_timeout(&self) -> Duration {
        Duration::from_secs(self.create_timeout_secs)
    }

    /// 제거 타임아웃
    pub fn remove_timeout(&self) -> Duration {
        Duration::from_secs(self.remove_timeout_secs)
    }

    /// 데이터베이스 삭제 타임아웃
    pub fn drop_timeout(&self) -> Duration {
        Duration::from_secs(self.drop_timeout_secs)
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), ProvisionerError> {
        if self.network.is_empty() {
            return Err(config_err("network", "must not be empty".to_owned()));
        }

        if self.image.is_empty() {
            return Err(config_err("image", "must not be empty".to_owned()));
        }

        if self.app_port == 0 {
            return Err(config_err("app_port", "must be 1-65535".to_owned()));
        }

        if !matches!(
            self.restart_policy.as_str(),
            "always" | "unless-stopped" | "on-failure" | "no"
        ) {
            return Err(config_err(
                "restart_policy",
                format!("unknown policy '{}'", self.restart_policy),
            ));
        }

        if self.stop_grace_secs > MAX_STOP_GRACE_SECS {
            return Err(config_err(
                "stop_grace_secs",
                format!("must be 0-{MAX_STOP_GRACE_SECS}"),
            ));
        }

        if self.create_timeout_secs == 0 || self.create_timeout_secs > MAX_CREATE_TIMEOUT_SECS {
            return Err(config_err(
                "create_timeout_secs",
                format!("must be 1-{MAX_CREATE_TIMEOUT_SECS}"),
            ));
        }

        if self.remove_timeout_secs == 0 || self.remove_timeout_secs > MAX_REMOVE_TIMEOUT_SECS {
            return Err(config_err(
                "remove_timeout_secs",
                format!("must be 1-{MAX_REMOVE_TIMEOUT_SECS}"),
            ));
        }

        // stop이 제거 예산을 다 쓰면 강제 제거 전에 타임아웃됨
        if self.stop_grace_secs >= self.remove_timeout_secs {
            return Err(config_err(
                "stop_grace_secs",
                format!(
                    "must be less than remove_timeout_secs ({})",
                    self.remove_timeout_secs
                ),
            ));
        }

        if self.pull_timeout_secs == 0 || self.pull_timeout_secs > MAX_PULL_TIMEOUT_SECS {
            return Err(config_err(
                "pull_timeout_secs",
                format!("must be 1-{MAX_PULL_TIMEOUT_SECS}"),
            ));
        }

        if self.drop_timeout_secs == 0 || self.drop_timeout_secs > MAX_DROP_TIMEOUT_SECS {
            return Err(config_err(
                "drop_timeout_secs",
                format!("must be 1-{MAX_DROP_TIMEOUT_SECS}"),
            ));
        }

        if self.base_domain.is_empty() {
            return Err(config_err("base_domain", "must not be empty".to_owned()));
        }

        if self.router_prefix.is_empty() {
            return Err(config_err("router_prefix", "must not be empty".to_owned()));
        }

        if !self.connection_template.contains(DB_PLACEHOLDER) {
            return Err(config_err(
                "connection_template",
                format!("must contain {DB_PLACEHOLDER}"),
            ));
        }

        if self.admin_container.is_empty() {
            return Err(config_err("admin_container", "must not be empty".to_owned()));
        }

        if !self.admin_uri.starts_with("mongodb://")
            && !self.admin_uri.starts_with("mongodb+srv://")
        {
            return Err(config_err(
                "admin_uri",
                "must be a mongodb:// or mongodb+srv:// URI".to_owned(),
            ));
        }

        if let Some(key) = self
            .default_env
            .keys()
            .find(|k| RESERVED_ENV_KEYS.contains(&k.as_str()))
        {
            return Err(config_err(
                "default_env",
                format!("'{key}' is managed by the provisioner"),
            ));
        }

        if self.list_limit == 0 || self.list_limit > MAX_LIST_LIMIT {
            return Err(config_err(
                "list_limit",
                format!("must be 1-{MAX_LIST_LIMIT}"),
            ));
        }

        Ok(())
    }
}

fn config_err(field: &str, reason: String) -> ProvisionerError {
    ProvisionerError::Config {
        field: field.to_owned(),
        reason,
    }
}

/// 프로비저너 설정 빌더
#[derive(Default)]
pub struct ProvisionerConfigBuilder {
    config: ProvisionerConfig,
}

impl ProvisionerConfigBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// Docker 네트워크를 설정합니다.
    pub fn network(mut self, network: impl Into<String>) -> Self {
        self.config.network = network.into();
        self
    }

    /// 인스턴스 이미지를 설정합니다.
    pub fn image(mut self, image: impl Into<String>) -> Self {
        self.config.image = image.into();
        self
    }

    /// 컨테이너 내부 포트를 설정합니다.
    pub fn app_port(mut self, port: u16) -> Self {
        self.config.app_port = port;
        self
    }

    /// 호스트 포트 공개 여부를 설정합니다.
    pub fn publish_port(mut self, publish: bool) -> Self {
        self.config.publish_port = publish;
        self
    }

    /// 재시작 정책을 설정합니다.
    pub fn restart_policy(mut self, policy: impl Into<String>) -> Self {
        self.config.restart_policy = policy.into();
        self
    }

    /// 이미지 pull 여부를 설정합니다.
    pub fn pull_image(mut self, pull: bool) -> Self {
        self.config.pull_image = pull;
        self
    }

    /// 정지 유예 시간(초)을 설정합니다.
    pub fn stop_grace_secs(mut self, secs: u64) -> Self {
        self.config.stop_grace_secs = secs;
        self
    }

    /// 이미지 pull 타임아웃(초)을 설정합니다.
    pub fn pull_timeout_secs(mut self, secs: u64) -> Self {
        self.config.pull_timeout_secs = secs;
        self
    }

    /// 생성 타임아웃(초)을 설정합니다.
    pub fn create_timeout_secs(mut self, secs: u64) -> Self {
        self.config.create_timeout_secs = secs;
        self
    }

    /// 제거 타임아웃(초)을 설정합니다.
    pub fn remove_timeout_secs(mut self, secs: u64) -> Self {
        self.config.remove_timeout_secs = secs;
        self
    }

    /// 데이터베이스 삭제 타임아웃(초)을 설정합니다.
    pub fn drop_timeout_secs(mut self, secs: u64) -> Self {
        self.config.drop_timeout_secs = secs;
        self
    }

    /// 기본 도메인을 설정합니다.
    pub fn base_domain(mut self, domain: impl Into<String>) -> Self {
        self.config.base_domain = domain.into();
        self
    }

    /// 라우터 entrypoints를 설정합니다.
    pub fn entrypoints(mut self, entrypoints: impl Into<String>) -> Self {
        self.config.entrypoints = Some(entrypoints.into());
        self
    }

    /// TLS 인증서 resolver를 설정합니다.
    pub fn cert_resolver(mut self, resolver: impl Into<String>) -> Self {
        self.config.cert_resolver = Some(resolver.into());
        self
    }

    /// 연결 문자열 템플릿을 설정합니다.
    pub fn connection_template(mut self, template: impl Into<String>) -> Self {
        self.config.connection_template = template.into();
        self
    }

    /// 관리 셸 접속 URI를 설정합니다.
    pub fn admin_uri(mut self, uri: impl Into<String>) -> Self {
        self.config.admin_uri = uri.into();
        self
    }

    /// 기본 환경변수를 추가합니다.
    pub fn default_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.default_env.insert(key.into(), value.into());
        self
    }

    /// 설정을 검증하고 `ProvisionerConfig`를 생성합니다.
    pub fn build(self) -> Result<ProvisionerConfig, ProvisionerError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        ProvisionerConfig::default().validate().unwrap();
    }

    #[test]
    fn from_core_preserves_values() {
        let mut core = ScoutpostConfig::default();
        core.runtime.network = "edge".to_owned();
        core.runtime.app_port = 8080;
        core.routing.base_domain = "example.org".to_owned();
        core.routing.cert_resolver = Some("le".to_owned());
        core.database.admin_container = "mongo-admin".to_owned();
        core.database.admin_uri = "mongodb://root:pw@mongo-admin:27017/".to_owned();
        core.instance.list_limit = 25;

        let config = ProvisionerConfig::from_core(&core);
        assert_eq!(config.network, "edge");
        assert_eq!(config.app_port, 8080);
        assert_eq!(config.base_domain, "example.org");
        assert_eq!(config.cert_resolver.as_deref(), Some("le"));
        assert_eq!(config.admin_container, "mongo-admin");
        assert_eq!(config.admin_uri, "mongodb://root:pw@mongo-admin:27017/");
        assert_eq!(config.list_limit, 25);
    }

    #[test]
    fn timeouts_as_durations() {
        let config = ProvisionerConfig::default();
        assert_eq!(config.create_timeout(), Duration::from_secs(30));
        assert_eq!(config.remove_timeout(), Duration::from_secs(10));
        assert_eq!(config.drop_timeout(), Duration::from_secs(10));
        assert_eq!(config.pull_timeout(), Duration::from_secs(300));
    }

    #[test]
    fn default_stop_grace_fits_remove_budget() {
        let config = ProvisionerConfig::default();
        assert!(config.stop_grace_secs < config.remove_timeout_secs);
    }

    #[test]
    fn validate_rejects_stop_grace_equal_to_remove_timeout() {
        let config = ProvisionerConfig {
            stop_grace_secs: 10,
            remove_timeout_secs: 10,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("stop_grace_secs"));
    }

    #[test]
    fn builder_rejects_grace_longer_than_remove_timeout() {
        let result = ProvisionerConfigBuilder::new()
            .remove_timeout_secs(20)
            .stop_grace_secs(30)
            .build();
        assert!(result.is_err());

        let config = ProvisionerConfigBuilder::new()
            .remove_timeout_secs(20)
            .stop_grace_secs(15)
            .build()
            .unwrap();
        assert_eq!(config.stop_grace_secs, 15);
    }

    #[test]
    fn validate_rejects_zero_pull_timeout() {
        let config = ProvisionerConfig {
            pull_timeout_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_non_mongodb_admin_uri() {
        let config = ProvisionerConfig {
            admin_uri: "http://mongodb:27017".to_owned(),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("admin_uri"));
    }

    #[test]
    fn validate_rejects_zero_create_timeout() {
        let config = ProvisionerConfig {
            create_timeout_secs: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("create_timeout_secs"));
    }

    #[test]
    fn validate_rejects_excessive_remove_timeout() {
        let config = ProvisionerConfig {
            remove_timeout_secs: MAX_REMOVE_TIMEOUT_SECS + 1,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_unknown_restart_policy() {
        let config = ProvisionerConfig {
            restart_policy: "forever".to_owned(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_reserved_default_env() {
        let mut config = ProvisionerConfig::default();
        config
            .default_env
            .insert("API_SECRET".to_owned(), "shared".to_owned());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("API_SECRET"));
    }

    #[test]
    fn validate_rejects_template_without_placeholder() {
        let config = ProvisionerConfig {
            connection_template: "mongodb://mongodb/shared".to_owned(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn builder_creates_valid_config() {
        let config = ProvisionerConfigBuilder::new()
            .network("proxy")
            .image("nightscout/cgm-remote-monitor:15.0.2")
            .base_domain("cgm.example.net")
            .entrypoints("websecure")
            .create_timeout_secs(60)
            .default_env("AUTH_DEFAULT_ROLES", "denied")
            .build()
            .unwrap();
        assert_eq!(config.network, "proxy");
        assert_eq!(config.entrypoints.as_deref(), Some("websecure"));
        assert_eq!(config.create_timeout_secs, 60);
        assert_eq!(
            config.default_env.get("AUTH_DEFAULT_ROLES").map(String::as_str),
            Some("denied")
        );
    }

    #[test]
    fn builder_validates_on_build() {
        let result = ProvisionerConfigBuilder::new().app_port(0).build();
        assert!(result.is_err());
    }
}
