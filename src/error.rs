//! Error taxonomy shared by every delegate
//!
//! "Not this ecosystem" is never an error: detection returns `Ok(None)`.
//! Everything else surfaces through [`DelegateError`], which carries a
//! user-facing remediation hint and a process exit code for the binary.

use std::path::PathBuf;
use thiserror::Error;

/// Exit code used for defects in the tool itself rather than in user source.
pub const INTERNAL_ERROR_EXIT_CODE: i32 = 2;

#[derive(Debug, Error)]
pub enum DelegateError {
    /// Structural problem in user source
    #[error("{message}")]
    Validation {
        message: String,
        remediation: String,
    },

    /// Declared runtime is not in the supported registry
    #[error("Unsupported runtime '{runtime}'")]
    UnsupportedRuntime {
        runtime: String,
        supported: Vec<String>,
    },

    /// Detector and registry disagree; a bug in this tool
    #[error("Internal error: {0}")]
    InternalConsistency(String),

    /// No discovery strategy produced a build description
    #[error("Failed to discover functions: {message}")]
    Discovery {
        message: String,
        /// Manifest path or introspection URL that was attempted
        attempted: String,
        remediation: String,
    },

    /// A supervised subprocess failed to start or exited unsuccessfully
    #[error("Process '{name}' failed: {message}")]
    Process {
        name: String,
        message: String,
        stderr_tail: Vec<String>,
    },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DelegateError {
    pub fn validation(message: impl Into<String>, remediation: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            remediation: remediation.into(),
        }
    }

    pub fn discovery(
        message: impl Into<String>,
        attempted: impl Into<String>,
        remediation: impl Into<String>,
    ) -> Self {
        Self::Discovery {
            message: message.into(),
            attempted: attempted.into(),
            remediation: remediation.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Recommended next step for the end user
    pub fn remediation(&self) -> String {
        match self {
            DelegateError::Validation { remediation, .. }
            | DelegateError::Discovery { remediation, .. } => remediation.clone(),
            DelegateError::UnsupportedRuntime { supported, .. } => format!(
                "Set the runtime to one of: {}",
                supported.join(", ")
            ),
            DelegateError::InternalConsistency(_) => {
                "This is a bug in rtdelegate. Please report it with the command you ran."
                    .to_string()
            }
            DelegateError::Process { .. } => {
                "Check the process output above, and make sure the project's dependencies are installed."
                    .to_string()
            }
            DelegateError::Io { path, .. } => format!(
                "Make sure {} exists and is readable.",
                path.display()
            ),
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            DelegateError::InternalConsistency(_) => INTERNAL_ERROR_EXIT_CODE,
            _ => 1,
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, DelegateError::InternalConsistency(_))
    }

    /// Full message with troubleshooting hints
    pub fn help_message(&self) -> String {
        let mut message = format!("Error: {}", self);
        if let DelegateError::Discovery { attempted, .. } = self {
            message.push_str(&format!("\nAttempted: {}", attempted));
        }
        if let DelegateError::Process { stderr_tail, .. } = self {
            if !stderr_tail.is_empty() {
                message.push_str("\n\nProcess output (last lines):\n");
                message.push_str(&stderr_tail.join("\n"));
            }
        }
        message.push_str("\n\nHelp: ");
        message.push_str(&self.remediation());
        message
    }
}

pub type Result<T, E = DelegateError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_internal_consistency_is_fatal() {
        let err = DelegateError::InternalConsistency("mismatch".to_string());
        assert!(err.is_fatal());
        assert_eq!(err.exit_code(), INTERNAL_ERROR_EXIT_CODE);
    }

    #[test]
    fn test_validation_help_message() {
        let err = DelegateError::validation(
            "package.json is missing",
            "Run npm init in the functions directory.",
        );
        assert_eq!(err.exit_code(), 1);
        let help = err.help_message();
        assert!(help.contains("package.json is missing"));
        assert!(help.contains("Help: Run npm init"));
    }

    #[test]
    fn test_discovery_help_names_attempted_path() {
        let err = DelegateError::discovery(
            "generator did not produce a manifest",
            "/src/.dart_tool/firebase/functions.yaml",
            "Make sure build_runner is a dev dependency.",
        );
        assert!(err.help_message().contains("/src/.dart_tool/firebase/functions.yaml"));
    }

    #[test]
    fn test_process_help_includes_stderr_tail() {
        let err = DelegateError::Process {
            name: "build_runner".to_string(),
            message: "exited with code 1".to_string(),
            stderr_tail: vec!["boom".to_string()],
        };
        let help = err.help_message();
        assert!(help.contains("Process 'build_runner' failed"));
        assert!(help.contains("boom"));
    }
}
