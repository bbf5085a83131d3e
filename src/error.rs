//! Error types for the Shesha RLM engine

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the engine.
///
/// The policy is: surface to the model whenever the model can act on it
/// (sandbox execution errors and sub-LLM failures become string results
/// handed back into the conversation, never an `Err` here), and surface to
/// the caller only when the control loop itself cannot continue. The
/// variants below are the ones that reach the caller.
#[derive(Error, Debug)]
pub enum Error {
    /// The driver LLM adapter failed. Propagated verbatim; the engine does
    /// not retry driver completions itself (the adapter may retry
    /// transport-level failures internally, see `retry`).
    #[error("driver LLM error: {0}")]
    DriverLlm(String),

    /// HTTP transport failure from the default `HttpDriverLlm`.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error talking to a sandbox subprocess.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The sandbox channel (stdio JSON protocol) produced malformed output
    /// or hit EOF after the engine already attempted one re-read. Fatal to
    /// the in-flight query.
    #[error("sandbox channel error: {0}")]
    SandboxChannel(String),

    /// The sandbox process failed to start, or died outside of the normal
    /// execute/response cycle.
    #[error("sandbox process error: {0}")]
    SandboxProcess(String),

    /// Other errors.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a new driver-LLM error.
    pub fn driver_llm(msg: impl Into<String>) -> Self {
        Error::DriverLlm(msg.into())
    }

    /// Create a new config error.
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a new sandbox channel error.
    pub fn sandbox_channel(msg: impl Into<String>) -> Self {
        Error::SandboxChannel(msg.into())
    }

    /// Create a new sandbox process error.
    pub fn sandbox_process(msg: impl Into<String>) -> Self {
        Error::SandboxProcess(msg.into())
    }

    /// Create a catch-all error.
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_config() {
        let err = Error::config("missing base_url");
        assert!(matches!(err, Error::Config(_)));
        assert_eq!(err.to_string(), "invalid configuration: missing base_url");
    }

    #[test]
    fn test_error_sandbox_channel() {
        let err = Error::sandbox_channel("EOF on stdout");
        assert_eq!(err.to_string(), "sandbox channel error: EOF on stdout");
    }

    #[test]
    fn test_error_sandbox_process() {
        let err = Error::sandbox_process("spawn failed");
        assert!(matches!(err, Error::SandboxProcess(_)));
    }

    #[test]
    fn test_error_from_serde_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn test_result_type_alias() {
        fn _returns_result() -> Result<i32> {
            Ok(42)
        }
        fn _returns_error() -> Result<i32> {
            Err(Error::other("boom"))
        }
        assert!(_returns_result().is_ok());
        assert!(_returns_error().is_err());
    }
}
