//! # Shesha RLM
//!
//! A Recursive Language Model (RLM) execution engine: a driver LLM control
//! loop coupled to a sandboxed code interpreter, with prompt-injection
//! boundaries and a structured execution trace.
//!
//! Rather than handing a driver LLM the raw contents of a document
//! collection, [`engine::Engine::query`] hands it a *handle*, a `context`
//! variable inside a sandboxed interpreter, and lets the model write short
//! programs that inspect, slice, summarize, and recursively delegate work
//! to sub-LLM calls via `llm_query`, iterating until it emits a final
//! answer with `FINAL`/`FINAL_VAR`.
//!
//! ## What this crate does not do
//!
//! Document parsing, persistent storage, sandbox image provisioning, and
//! prompt template loading are external collaborators: this crate defines
//! the seams ([`document::ParsedDocument`], [`sandbox::SandboxHandle`],
//! [`prompts::PromptTemplates`]) but does not implement them.
//!
//! ## Example
//!
//! ```rust,no_run
//! use shesha_rlm::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<()> {
//! let driver: Arc<dyn DriverLlm> =
//!     Arc::new(HttpDriverLlm::new("http://localhost:1234/v1", "qwen2.5-32b-instruct")?);
//! let engine = Engine::new(driver, EngineConfig::default(), Arc::new(DefaultTemplates));
//!
//! let docs = vec![ParsedDocument::new("notes.txt", "...", "txt")];
//! let result = engine.query(&docs, "what does this say?").await?;
//! println!("{}", result.answer);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **boundary**: per-query randomized untrusted-content markers.
//! - **prompts**: system prompt, iteration-zero safeguard, context
//!   metadata, code echoes, sub-call prompt assembly.
//! - **codeblock**: fenced-block extraction and output truncation.
//! - **sandbox**: the stdio JSON protocol, a real child-process client, a
//!   bounded pool, and an in-memory test double.
//! - **trace**: the append-only structured execution log.
//! - **message** / **llm**: the driver LLM conversation model and the
//!   default HTTP adapter.
//! - **engine**: the control loop tying all of the above together.
//! - **config**: provider endpoint resolution and engine behavioral knobs.
//! - **error**: the `Error` enum and `Result<T>` alias used throughout.
//! - **retry**: exponential backoff for the HTTP driver adapter.

/// Per-query randomized boundary tokens framing untrusted document and
/// sub-LLM content.
pub mod boundary;

/// Fenced code-block extraction and per-block output truncation.
pub mod codeblock;

/// Provider endpoint resolution and engine behavioral configuration.
pub mod config;

/// The document shape the engine consumes from external storage.
pub mod document;

/// The control loop: `Engine::query`.
pub mod engine;

/// Error types and conversions used across all public APIs.
pub mod error;

/// The driver LLM adapter trait and the default HTTP implementation.
pub mod llm;

/// Conversation messages exchanged with the driver LLM.
pub mod message;

/// Prompt template loading seam and the default prompt assembler.
pub mod prompts;

/// Retry utilities with exponential backoff, used by the HTTP driver
/// adapter for transient transport failures.
pub mod retry;

/// The sandbox subsystem: wire protocol, client, pool, test double.
pub mod sandbox;

/// The append-only structured execution trace.
pub mod trace;

// ============================================================================
// PUBLIC EXPORTS
// ============================================================================

pub use boundary::BoundaryToken;
pub use codeblock::{DEFAULT_MAX_OUTPUT_CHARS, extract_code_blocks, truncate_code_output};
pub use config::{EngineConfig, EngineConfigBuilder, Provider, get_base_url, get_model};
pub use document::ParsedDocument;
pub use engine::{Engine, MAX_ITERATIONS_SENTINEL, QueryResult};
pub use error::{Error, Result};
pub use llm::{DriverLlm, HttpDriverLlm};
pub use message::{LlmCompletion, Message, MessageRole};
pub use prompts::{DefaultTemplates, PromptAssembler, PromptTemplates};
pub use trace::{StepType, Trace, TraceStep, TokenUsage};

/// Test doubles re-exported for downstream integration tests that want to
/// drive [`Engine`] without a real sandbox subprocess. Not behind a
/// feature flag since this crate ships no real interpreter image to test
/// against in the first place.
pub mod testing {
    pub use crate::sandbox::{MockSandbox, MockStep};
}

// ============================================================================
// CONVENIENCE PRELUDE
// ============================================================================

/// The commonly used types for driving a query end to end. Import with
/// `use shesha_rlm::prelude::*;`.
pub mod prelude {
    pub use crate::{
        BoundaryToken, DefaultTemplates, DriverLlm, Engine, EngineConfig, Error, HttpDriverLlm,
        Message, ParsedDocument, PromptAssembler, PromptTemplates, QueryResult, Result, Trace,
    };
}
