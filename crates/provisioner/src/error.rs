//! 프로비저너 에러 타입
//!
//! [`ProvisionerError`]는 인스턴스 생명주기 내부에서 발생하는 모든 에러를 표현합니다.
//! `From<ProvisionerError> for ScoutpostError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 자연스럽게 전파할 수 있습니다.

use scoutpost_core::error::{ConfigError, InstanceError, ScoutpostError, StorageError};

/// 프로비저너 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum ProvisionerError {
    /// 컨테이너 이름이 이미 사용 중 (HTTP 409)
    #[error("container name already in use: {0}")]
    NameConflict(String),

    /// Docker 데몬 연결/호출 실패 또는 타임아웃
    #[error("container runtime error: {0}")]
    Runtime(String),

    /// 생성 실패 (롤백 완료, 또는 `orphaned_container`가 남았을 수 있음)
    #[error("provisioning failed for '{owner}': {reason}")]
    ProvisioningFailed {
        /// 대상 사용자
        owner: String,
        /// 실패 사유
        reason: String,
        /// 롤백에 실패해 남았을 수 있는 컨테이너 이름
        orphaned_container: Option<String>,
    },

    /// 중복 레코드 삽입 또는 상태 compare-and-set 실패
    #[error("record conflict: {0}")]
    RecordConflict(String),

    /// 허용되지 않는 상태 전이
    #[error("invalid status transition for '{owner}': {from} -> {to}")]
    InvalidTransition {
        /// 대상 사용자
        owner: String,
        /// 현재 상태
        from: String,
        /// 요청된 상태
        to: String,
    },

    /// 자원 이름에 쓸 수 없는 식별자
    #[error("invalid identity '{identity}': {reason}")]
    InvalidIdentity {
        /// 입력 식별자
        identity: String,
        /// 거부 사유
        reason: String,
    },

    /// 거부된 인스턴스 설정
    #[error("invalid setting '{key}': {reason}")]
    InvalidSetting {
        /// 설정 키
        key: String,
        /// 거부 사유
        reason: String,
    },

    /// 레코드 없음
    #[error("instance not found: {0}")]
    NotFound(String),

    /// 레코드 저장소 에러
    #[error("store error: {0}")]
    Store(String),

    /// 논리 데이터베이스 관리 에러
    #[error("database error: {0}")]
    Database(String),

    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },
}

impl From<InstanceError> for ProvisionerError {
    fn from(err: InstanceError) -> Self {
        match err {
            InstanceError::InvalidIdentity { identity, reason } => {
                Self::InvalidIdentity { identity, reason }
            }
            InstanceError::InvalidSetting { key, reason } => Self::InvalidSetting { key, reason },
            InstanceError::InvalidTransition { owner, from, to } => {
                Self::InvalidTransition { owner, from, to }
            }
            InstanceError::NameConflict(name) => Self::NameConflict(name),
            InstanceError::Runtime(msg) => Self::Runtime(msg),
            InstanceError::ProvisioningFailed { owner, reason } => Self::ProvisioningFailed {
                owner,
                reason,
                orphaned_container: None,
            },
            InstanceError::RecordConflict(msg) => Self::RecordConflict(msg),
            InstanceError::NotFound(owner) => Self::NotFound(owner),
        }
    }
}

impl From<ProvisionerError> for ScoutpostError {
    fn from(err: ProvisionerError) -> Self {
        match err {
            ProvisionerError::NameConflict(name) => {
                ScoutpostError::Instance(InstanceError::NameConflict(name))
            }
            ProvisionerError::Runtime(msg) => ScoutpostError::Instance(InstanceError::Runtime(msg)),
            ProvisionerError::ProvisioningFailed {
                owner,
                reason,
                orphaned_container,
            } => {
                let reason = match orphaned_container {
                    Some(container) => format!("{reason} (container '{container}' may remain)"),
                    None => reason,
                };
                ScoutpostError::Instance(InstanceError::ProvisioningFailed { owner, reason })
            }
            ProvisionerError::RecordConflict(msg) => {
                ScoutpostError::Instance(InstanceError::RecordConflict(msg))
            }
            ProvisionerError::InvalidTransition { owner, from, to } => {
                ScoutpostError::Instance(InstanceError::InvalidTransition { owner, from, to })
            }
            ProvisionerError::InvalidIdentity { identity, reason } => {
                ScoutpostError::Instance(InstanceError::InvalidIdentity { identity, reason })
            }
            ProvisionerError::InvalidSetting { key, reason } => {
                ScoutpostError::Instance(InstanceError::InvalidSetting { key, reason })
            }
            ProvisionerError::NotFound(owner) => {
                ScoutpostError::Instance(InstanceError::NotFound(owner))
            }
            ProvisionerError::Store(msg) => ScoutpostError::Storage(StorageError::Query(msg)),
            ProvisionerError::Database(msg) => ScoutpostError::Storage(StorageError::Database(msg)),
            ProvisionerError::Config { field, reason } => {
                ScoutpostError::Config(ConfigError::InvalidValue { field, reason })
            }
        }
    }
}

impl ProvisionerError {
    /// 호출자가 나중에 다시 시도해도 되는 에러인지 여부
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Runtime(_) | Self::ProvisioningFailed { .. } | Self::Store(_)
        )
    }
}
