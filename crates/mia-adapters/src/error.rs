//! Errors raised by adapters and the registry.
//!
//! A tool that ran but did not achieve its effect (a shell command exiting
//! non-zero) reports `success: false` in its result instead.  These errors
//! are for calls that could not be carried out at all.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("no adapter registered as `{adapter_id}`")]
    AdapterNotFound { adapter_id: String },

    #[error("adapter `{adapter_id}` has no tool `{tool_name}`")]
    ToolNotFound {
        adapter_id: String,
        tool_name: String,
    },

    /// Missing or malformed parameters, including paths outside the root.
    #[error("{tool_name}: invalid parameters: {reason}")]
    InvalidParams { tool_name: String, reason: String },

    /// The tool could not do its job, e.g. an edit target that does not
    /// occur in the file.
    #[error("{tool_name} failed: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("timed out after {seconds}s: {reason}")]
    Timeout { seconds: u64, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AdapterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_tool() {
        let err = AdapterError::InvalidParams {
            tool_name: "read_file".into(),
            reason: "missing required string field `path`".into(),
        };
        assert_eq!(
            err.to_string(),
            "read_file: invalid parameters: missing required string field `path`"
        );

        let err = AdapterError::ToolNotFound {
            adapter_id: "files".into(),
            tool_name: "shred".into(),
        };
        assert_eq!(err.to_string(), "adapter `files` has no tool `shred`");
    }

    #[test]
    fn io_errors_pass_through() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: AdapterError = io.into();
        assert_eq!(err.to_string(), "denied");
    }
}
