//! 설정 관리: scoutpost.toml 파싱 및 런타임 설정
//!
//! [`ScoutpostConfig`]는 모든 모듈의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`SCOUTPOST_RUNTIME_NETWORK=proxy_net` 형식)
//! 3. 설정 파일 (`scoutpost.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), scoutpost_core::error::ScoutpostError> {
//! use scoutpost_core::config::ScoutpostConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = ScoutpostConfig::load("scoutpost.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = ScoutpostConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, ScoutpostError};

/// Placeholder substituted with the logical database name.
pub const DB_PLACEHOLDER: &str = "{db}";

/// Scoutpost 통합 설정
///
/// `scoutpost.toml` 파일의 최상위 구조를 나타냅니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoutpostConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 컨테이너 런타임 설정
    #[serde(default)]
    pub runtime: RuntimeConfig,
    /// 리버스 프록시 라우팅 설정
    #[serde(default)]
    pub routing: RoutingConfig,
    /// 사용자별 데이터베이스 설정
    #[serde(default)]
    pub database: DatabaseConfig,
    /// 인스턴스 레코드 저장소 설정
    #[serde(default)]
    pub store: StoreConfig,
    /// 인스턴스 기본값
    #[serde(default)]
    pub instance: InstanceDefaults,
}

impl ScoutpostConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ScoutpostError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, ScoutpostError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ScoutpostError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                ScoutpostError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, ScoutpostError> {
        toml::from_str(toml_str).map_err(|e| {
            ScoutpostError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `SCOUTPOST_{SECTION}_{FIELD}`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "SCOUTPOST_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "SCOUTPOST_GENERAL_LOG_FORMAT");

        // Runtime
        override_string(
            &mut self.runtime.docker_socket,
            "SCOUTPOST_RUNTIME_DOCKER_SOCKET",
        );
        override_string(&mut self.runtime.network, "SCOUTPOST_RUNTIME_NETWORK");
        override_string(&mut self.runtime.image, "SCOUTPOST_RUNTIME_IMAGE");
        override_u16(&mut self.runtime.app_port, "SCOUTPOST_RUNTIME_APP_PORT");
        override_bool(
            &mut self.runtime.publish_port,
            "SCOUTPOST_RUNTIME_PUBLISH_PORT",
        );
        override_string(
            &mut self.runtime.restart_policy,
            "SCOUTPOST_RUNTIME_RESTART_POLICY",
        );
        override_bool(&mut self.runtime.pull_image, "SCOUTPOST_RUNTIME_PULL_IMAGE");
        override_u64(
            &mut self.runtime.stop_grace_secs,
            "SCOUTPOST_RUNTIME_STOP_GRACE_SECS",
        );
        override_u64(
            &mut self.runtime.pull_timeout_secs,
            "SCOUTPOST_RUNTIME_PULL_TIMEOUT_SECS",
        );
        override_u64(
            &mut self.runtime.create_timeout_secs,
            "SCOUTPOST_RUNTIME_CREATE_TIMEOUT_SECS",
        );
        override_u64(
            &mut self.runtime.remove_timeout_secs,
            "SCOUTPOST_RUNTIME_REMOVE_TIMEOUT_SECS",
        );

        // Routing
        override_string(
            &mut self.routing.base_domain,
            "SCOUTPOST_ROUTING_BASE_DOMAIN",
        );
        override_string(
            &mut self.routing.router_prefix,
            "SCOUTPOST_ROUTING_ROUTER_PREFIX",
        );
        override_optional(
            &mut self.routing.entrypoints,
            "SCOUTPOST_ROUTING_ENTRYPOINTS",
        );
        override_optional(
            &mut self.routing.cert_resolver,
            "SCOUTPOST_ROUTING_CERT_RESOLVER",
        );

        // Database
        override_string(
            &mut self.database.connection_template,
            "SCOUTPOST_DATABASE_CONNECTION_TEMPLATE",
        );
        override_string(
            &mut self.database.admin_container,
            "SCOUTPOST_DATABASE_ADMIN_CONTAINER",
        );
        override_string(
            &mut self.database.admin_uri,
            "SCOUTPOST_DATABASE_ADMIN_URI",
        );
        override_string(&mut self.database.shell, "SCOUTPOST_DATABASE_SHELL");
        override_u64(
            &mut self.database.drop_timeout_secs,
            "SCOUTPOST_DATABASE_DROP_TIMEOUT_SECS",
        );

        // Store
        override_string(&mut self.store.path, "SCOUTPOST_STORE_PATH");

        // Instance
        override_usize(
            &mut self.instance.list_limit,
            "SCOUTPOST_INSTANCE_LIST_LIMIT",
        );
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), ScoutpostError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        if self.runtime.network.is_empty() {
            return Err(invalid("runtime.network", "must not be empty".to_owned()));
        }
        if self.runtime.image.is_empty() {
            return Err(invalid("runtime.image", "must not be empty".to_owned()));
        }
        if self.runtime.app_port == 0 {
            return Err(invalid("runtime.app_port", "must be 1-65535".to_owned()));
        }

        let valid_policies = ["always", "unless-stopped", "on-failure", "no"];
        if !valid_policies.contains(&self.runtime.restart_policy.as_str()) {
            return Err(invalid(
                "runtime.restart_policy",
                format!("must be one of: {}", valid_policies.join(", ")),
            ));
        }

        if self.runtime.create_timeout_secs == 0 {
            return Err(invalid(
                "runtime.create_timeout_secs",
                "must be greater than 0".to_owned(),
            ));
        }
        if self.runtime.remove_timeout_secs == 0 {
            return Err(invalid(
                "runtime.remove_timeout_secs",
                "must be greater than 0".to_owned(),
            ));
        }
        if self.runtime.pull_timeout_secs == 0 {
            return Err(invalid(
                "runtime.pull_timeout_secs",
                "must be greater than 0".to_owned(),
            ));
        }
        // stop + 강제 제거가 같은 제거 타임아웃 안에 끝나야 함
        if self.runtime.stop_grace_secs >= self.runtime.remove_timeout_secs {
            return Err(invalid(
                "runtime.stop_grace_secs",
                format!(
                    "must be less than runtime.remove_timeout_secs ({})",
                    self.runtime.remove_timeout_secs
                ),
            ));
        }

        if self.routing.base_domain.is_empty()
            || self.routing.base_domain.starts_with('.')
            || self.routing.base_domain.contains(char::is_whitespace)
        {
            return Err(invalid(
                "routing.base_domain",
                "must be a non-empty domain name".to_owned(),
            ));
        }

        if self.routing.router_prefix.is_empty()
            || !self
                .routing
                .router_prefix
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(invalid(
                "routing.router_prefix",
                "must be non-empty and match [a-z0-9-]".to_owned(),
            ));
        }

        if !self.database.connection_template.contains(DB_PLACEHOLDER) {
            return Err(invalid(
                "database.connection_template",
                format!("must contain the {DB_PLACEHOLDER} placeholder"),
            ));
        }
        if !self.database.admin_uri.starts_with("mongodb://")
            && !self.database.admin_uri.starts_with("mongodb+srv://")
        {
            return Err(invalid(
                "database.admin_uri",
                "must be a mongodb:// or mongodb+srv:// URI".to_owned(),
            ));
        }
        if self.database.drop_timeout_secs == 0 {
            return Err(invalid(
                "database.drop_timeout_secs",
                "must be greater than 0".to_owned(),
            ));
        }

        if self.store.path.is_empty() {
            return Err(invalid("store.path", "must not be empty".to_owned()));
        }

        if self.instance.list_limit == 0 {
            return Err(invalid(
                "instance.list_limit",
                "must be greater than 0".to_owned(),
            ));
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: String) -> ScoutpostError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason,
    }
    .into()
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
        }
    }
}

/// 컨테이너 런타임 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
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
    /// 재시작 정책 (always, unless-stopped, on-failure, no)
    pub restart_policy: String,
    /// 이미지가 없을 때 pull 시도
    pub pull_image: bool,
    /// 정지 유예 시간 (초). 제거 타임아웃보다 짧아야 함
    pub stop_grace_secs: u64,
    /// 이미지 pull 타임아웃 (초). 생성 타임아웃과 별도로 적용
    pub pull_timeout_secs: u64,
    /// 생성 타임아웃 (초)
    pub create_timeout_secs: u64,
    /// 제거 타임아웃 (초)
    pub remove_timeout_secs: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            docker_socket: "/var/run/docker.sock".to_owned(),
            network: "project_nightscout_net".to_owned(),
            image: "nightscout/cgm-remote-monitor:latest".to_owned(),
            app_port: 1337,
            publish_port: true,
            restart_policy: "always".to_owned(),
            pull_image: true,
            stop_grace_secs: 5,
            pull_timeout_secs: 300,
            create_timeout_secs: 30,
            remove_timeout_secs: 10,
        }
    }
}

/// 리버스 프록시 라우팅 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// 사용자 서브도메인이 붙는 기본 도메인
    pub base_domain: String,
    /// 라우터/서비스 이름 접두어
    pub router_prefix: String,
    /// 라우터 entrypoints (선택)
    pub entrypoints: Option<String>,
    /// TLS 인증서 resolver (선택)
    pub cert_resolver: Option<String>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            base_domain: "nst1d.com".to_owned(),
            router_prefix: "ns".to_owned(),
            entrypoints: None,
            cert_resolver: None,
        }
    }
}

/// 사용자별 데이터베이스 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// 인스턴스에 전달되는 연결 문자열 템플릿 (`{db}` 치환)
    pub connection_template: String,
    /// 관리 명령을 실행할 데이터베이스 컨테이너
    pub admin_container: String,
    /// 관리 셸이 접속할 URI (인증 정보 포함 가능)
    pub admin_uri: String,
    /// 데이터베이스 셸 실행 파일
    pub shell: String,
    /// 데이터베이스 삭제 타임아웃 (초)
    pub drop_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            connection_template: "mongodb://mongodb:27017/{db}".to_owned(),
            admin_container: "mongodb".to_owned(),
            admin_uri: "mongodb://localhost:27017/?authSource=admin".to_owned(),
            shell: "mongosh".to_owned(),
            drop_timeout_secs: 10,
        }
    }
}

/// 인스턴스 레코드 저장소 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite 파일 경로 (`:memory:` 허용)
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: "/var/lib/scoutpost/instances.db".to_owned(),
        }
    }
}

/// 인스턴스 기본값
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceDefaults {
    /// 모든 인스턴스에 주입되는 추가 환경변수 (사용자 설정이 덮어씀)
    pub default_env: BTreeMap<String, String>,
    /// 관리자 목록 조회 기본 개수
    pub list_limit: usize,
}

impl Default for InstanceDefaults {
    fn default() -> Self {
        Self {
            default_env: BTreeMap::from([("INSECURE_USE_HTTP".to_owned(), "true".to_owned())]),
            list_limit: 100,
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_optional(target: &mut Option<String>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = if val.is_empty() { None } else { Some(val) };
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_u16(target: &mut u16, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u16>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u16 from env var, ignoring"
            ),
        }
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}
