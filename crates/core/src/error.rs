//! 에러 타입: 도메인별 에러 정의

/// Scoutpost 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum ScoutpostError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 인스턴스 생명주기 에러
    #[error("instance error: {0}")]
    Instance(#[from] InstanceError),

    /// 스토리지 에러
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 인스턴스 생명주기 에러
///
/// Lifecycle failures as seen by callers of the core. `ProvisioningFailed` is
/// the only variant meant to be shown to an end user ("try again later").
#[derive(Debug, thiserror::Error)]
pub enum InstanceError {
    /// Owner identity cannot be embedded in resource names
    #[error("invalid identity '{identity}': {reason}")]
    InvalidIdentity { identity: String, reason: String },

    /// Instance setting rejected before reaching the runtime
    #[error("invalid setting '{key}': {reason}")]
    InvalidSetting { key: String, reason: String },

    /// Status change not allowed by the instance state machine
    #[error("invalid status transition for '{owner}': {from} -> {to}")]
    InvalidTransition {
        owner: String,
        from: String,
        to: String,
    },

    /// Container name already taken (caller skipped `ensure_absent`)
    #[error("container name already in use: {0}")]
    NameConflict(String),

    /// Container engine unreachable or failed; retryable by the caller
    #[error("container runtime error: {0}")]
    Runtime(String),

    /// Provisioning failed; may hide an orphan that needs reconciliation
    #[error("provisioning failed for '{owner}': {reason}")]
    ProvisioningFailed { owner: String, reason: String },

    /// Duplicate record insert or lost compare-and-set
    #[error("record conflict: {0}")]
    RecordConflict(String),

    /// No record for the owner
    #[error("instance not found: {0}")]
    NotFound(String),
}

/// 스토리지 에러
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// 연결 실패
    #[error("connection failed: {0}")]
    Connection(String),

    /// 쿼리 실패
    #[error("query failed: {0}")]
    Query(String),

    /// 논리 데이터베이스 관리 실패
    #[error("database provisioning failed: {0}")]
    Database(String),
}
