//! CLI-specific error types and exit code mapping

use scoutpost_core::error::ScoutpostError;
use scoutpost_provisioner::ProvisionerError;

/// CLI-specific error type.
///
/// Each variant carries enough context for a user-friendly message.
/// The `exit_code()` method maps errors to standard Unix exit codes.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// A subcommand-specific operation failed.
    #[error("{0}")]
    Command(String),

    /// The container runtime did not answer a ping.
    #[error("container runtime not reachable: {0}")]
    RuntimeUnavailable(String),

    /// No instance for the requested owner.
    #[error("no instance for owner '{0}'")]
    NotFound(String),

    /// Reconciliation found drift (the report was already printed).
    #[error("reconciliation found {0} drift finding(s)")]
    Drift(usize),

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (file read, stdout write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapped domain error from scoutpost-core.
    #[error("{0}")]
    Core(#[from] ScoutpostError),

    /// Lifecycle error from scoutpost-provisioner.
    #[error("{0}")]
    Provisioner(#[from] ProvisionerError),
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                              |
    /// |------|--------------------------------------|
    /// | 0    | Success                              |
    /// | 1    | General / command error              |
    /// | 2    | Configuration error                  |
    /// | 3    | Container runtime unreachable        |
    /// | 4    | Instance not found                   |
    /// | 5    | Reconciliation found drift           |
    /// | 10   | IO error                             |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_)
            | Self::Core(ScoutpostError::Config(_))
            | Self::Provisioner(ProvisionerError::Config { .. }) => 2,
            Self::RuntimeUnavailable(_) => 3,
            Self::NotFound(_) | Self::Provisioner(ProvisionerError::NotFound(_)) => 4,
            Self::Drift(_) => 5,
            Self::Io(_) | Self::Core(ScoutpostError::Io(_)) => 10,
            Self::JsonSerialize(_) | Self::Command(_) | Self::Core(_) | Self::Provisioner(_) => 1,
        }
    }

    /// 같은 명령을 나중에 다시 실행하면 성공할 수 있는지 여부
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RuntimeUnavailable(_) => true,
            Self::Provisioner(e) => e.is_retryable(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scoutpost_core::error::ConfigError;

    #[test]
    fn test_exit_code_config_error() {
        let err = CliError::Config("test error".to_owned());
        assert_eq!(err.exit_code(), 2, "config error should return exit code 2");
    }

    #[test]
    fn test_exit_code_core_config_error() {
        let err = CliError::Core(ScoutpostError::Config(ConfigError::FileNotFound {
            path: "scoutpost.toml".to_owned(),
        }));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_exit_code_runtime_unavailable() {
        let err = CliError::RuntimeUnavailable("connection refused".to_owned());
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn test_exit_code_not_found() {
        assert_eq!(CliError::NotFound("alice".to_owned()).exit_code(), 4);
        assert_eq!(
            CliError::Provisioner(ProvisionerError::NotFound("alice".to_owned())).exit_code(),
            4
        );
    }

    #[test]
    fn test_exit_code_drift() {
        let err = CliError::Drift(3);
        assert_eq!(err.exit_code(), 5);
        assert!(err.to_string().contains('3'));
    }

    #[test]
    fn test_exit_code_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = CliError::Io(io_err);
        assert_eq!(err.exit_code(), 10, "io error should return exit code 10");
    }

    #[test]
    fn test_exit_code_provisioning_failure() {
        let err = CliError::Provisioner(ProvisionerError::ProvisioningFailed {
            owner: "alice".to_owned(),
            reason: "image pull failed".to_owned(),
            orphaned_container: None,
        });
        assert_eq!(err.exit_code(), 1);
        assert!(err.to_string().contains("image pull failed"));
    }

    #[test]
    fn test_retryable_errors() {
        assert!(CliError::RuntimeUnavailable("down".to_owned()).is_retryable());
        assert!(CliError::Provisioner(ProvisionerError::Runtime("timeout".to_owned())).is_retryable());
        assert!(!CliError::NotFound("alice".to_owned()).is_retryable());
        assert!(!CliError::Drift(1).is_retryable());
    }

    #[test]
    fn test_exit_code_json_serialize_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{invalid json")
            .expect_err("should fail parsing");
        let err = CliError::JsonSerialize(json_err);
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_error_display_command() {
        let err = CliError::Command("execution failed".to_owned());
        assert_eq!(err.to_string(), "execution failed");
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let cli_err: CliError = io_err.into();
        match cli_err {
            CliError::Io(e) => assert_eq!(e.kind(), std::io::ErrorKind::PermissionDenied),
            _ => panic!("expected Io error variant"),
        }
    }
}
