#![doc = include_str!("../README.md")]

pub mod config;
pub mod error;
pub mod metrics;
pub mod naming;
pub mod types;

// --- 주요 타입 re-export ---

// 에러
pub use error::{ConfigError, InstanceError, ScoutpostError, StorageError};

// 설정
pub use config::ScoutpostConfig;

// 이름 규칙
pub use naming::{InstanceNames, slugify, validate_identity};

// 도메인 타입
pub use types::{AccessSecret, InstanceRecord, InstanceSettings, InstanceStatus, KnownSetting};
