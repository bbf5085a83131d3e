//! # Configuration
//!
//! Two layers of configuration: provider/endpoint resolution for the
//! default [`crate::llm::HttpDriverLlm`], and [`EngineConfig`], the
//! forcing function knobs (iteration bound, per-block truncation budget,
//! execute timeout, pool size), exposed with fluent builder ergonomics.
//!
//! ## Environment Variables
//!
//! - `SHESHA_BASE_URL`: Override base URL for any provider
//! - `SHESHA_MODEL`: Override model name (when prefer_env is true)

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::codeblock::DEFAULT_MAX_OUTPUT_CHARS;
use crate::{Error, Result};

// ============================================================================
// PROVIDER ENUM (driver LLM endpoint resolution)
// ============================================================================

/// Supported local/self-hosted OpenAI-compatible LLM server providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    LMStudio,
    Ollama,
    LlamaCpp,
    VLLM,
}

impl Provider {
    pub fn default_url(&self) -> &'static str {
        match self {
            Provider::LMStudio => "http://localhost:1234/v1",
            Provider::Ollama => "http://localhost:11434/v1",
            Provider::LlamaCpp => "http://localhost:8080/v1",
            Provider::VLLM => "http://localhost:8000/v1",
        }
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "lmstudio" | "lm-studio" | "lm_studio" => Ok(Provider::LMStudio),
            "ollama" => Ok(Provider::Ollama),
            "llamacpp" | "llama-cpp" | "llama_cpp" | "llama.cpp" => Ok(Provider::LlamaCpp),
            "vllm" => Ok(Provider::VLLM),
            _ => Err(format!("unknown provider: {s}")),
        }
    }
}

/// Resolve a base URL: env override, then provider default, then fallback,
/// then LM Studio's default.
pub fn get_base_url(provider: Option<Provider>, fallback: Option<&str>) -> String {
    if let Ok(url) = env::var("SHESHA_BASE_URL") {
        return url;
    }
    if let Some(p) = provider {
        return p.default_url().to_string();
    }
    fallback
        .unwrap_or(Provider::LMStudio.default_url())
        .to_string()
}

/// Resolve a model name, optionally preferring the environment variable.
pub fn get_model(fallback: Option<&str>, prefer_env: bool) -> Option<String> {
    if prefer_env {
        if let Ok(model) = env::var("SHESHA_MODEL") {
            return Some(model);
        }
    }
    fallback.map(|s| s.to_string())
}

// ============================================================================
// ENGINE CONFIG (the RLM forcing-function knobs)
// ============================================================================

/// The behavioral knobs that act as forcing functions and must be
/// configurable, not hardcoded: the truncation budget and the iteration
/// bound shape whether the model delegates at all.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Hard cap on driver-LLM completions per query (invariant I4).
    pub max_iterations: u32,
    /// Per-block output truncation budget, in characters.
    pub max_output_chars: usize,
    /// Wall-clock timeout for a single sandbox `execute` call.
    pub execute_timeout: Duration,
    /// Sandbox pool size to pre-warm.
    pub pool_size: usize,
    /// Program used to spawn a sandbox process, e.g. `"python3"`.
    pub sandbox_program: String,
    /// Arguments passed to `sandbox_program` on spawn.
    pub sandbox_args: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            max_output_chars: DEFAULT_MAX_OUTPUT_CHARS,
            execute_timeout: Duration::from_secs(30),
            pool_size: 2,
            sandbox_program: "python3".to_string(),
            sandbox_args: Vec::new(),
        }
    }
}

impl EngineConfig {
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }
}

/// Fluent builder for [`EngineConfig`].
#[derive(Debug, Default)]
pub struct EngineConfigBuilder {
    max_iterations: Option<u32>,
    max_output_chars: Option<usize>,
    execute_timeout: Option<Duration>,
    pool_size: Option<usize>,
    sandbox_program: Option<String>,
    sandbox_args: Option<Vec<String>>,
}

impl EngineConfigBuilder {
    pub fn max_iterations(mut self, n: u32) -> Self {
        self.max_iterations = Some(n);
        self
    }

    pub fn max_output_chars(mut self, n: usize) -> Self {
        self.max_output_chars = Some(n);
        self
    }

    pub fn execute_timeout(mut self, d: Duration) -> Self {
        self.execute_timeout = Some(d);
        self
    }

    pub fn pool_size(mut self, n: usize) -> Self {
        self.pool_size = Some(n);
        self
    }

    pub fn sandbox_program(mut self, program: impl Into<String>) -> Self {
        self.sandbox_program = Some(program.into());
        self
    }

    pub fn sandbox_args(mut self, args: Vec<String>) -> Self {
        self.sandbox_args = Some(args);
        self
    }

    pub fn build(self) -> Result<EngineConfig> {
        let defaults = EngineConfig::default();
        let max_iterations = self.max_iterations.unwrap_or(defaults.max_iterations);
        if max_iterations == 0 {
            return Err(Error::config("max_iterations must be at least 1"));
        }
        Ok(EngineConfig {
            max_iterations,
            max_output_chars: self.max_output_chars.unwrap_or(defaults.max_output_chars),
            execute_timeout: self.execute_timeout.unwrap_or(defaults.execute_timeout),
            pool_size: self.pool_size.unwrap_or(defaults.pool_size),
            sandbox_program: self.sandbox_program.unwrap_or(defaults.sandbox_program),
            sandbox_args: self.sandbox_args.unwrap_or(defaults.sandbox_args),
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_default_urls() {
        assert_eq!(Provider::LMStudio.default_url(), "http://localhost:1234/v1");
        assert_eq!(Provider::Ollama.default_url(), "http://localhost:11434/v1");
    }

    #[test]
    fn test_provider_from_str() {
        assert_eq!("ollama".parse::<Provider>(), Ok(Provider::Ollama));
        assert!("unknown".parse::<Provider>().is_err());
    }

    #[test]
    fn test_engine_config_defaults() {
        let cfg = EngineConfig::builder().build().unwrap();
        assert_eq!(cfg.max_iterations, 10);
        assert_eq!(cfg.max_output_chars, DEFAULT_MAX_OUTPUT_CHARS);
    }

    #[test]
    fn test_engine_config_rejects_zero_iterations() {
        let result = EngineConfig::builder().max_iterations(0).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_engine_config_builder_overrides() {
        let cfg = EngineConfig::builder()
            .max_iterations(3)
            .max_output_chars(500)
            .pool_size(1)
            .build()
            .unwrap();
        assert_eq!(cfg.max_iterations, 3);
        assert_eq!(cfg.max_output_chars, 500);
        assert_eq!(cfg.pool_size, 1);
    }
}
