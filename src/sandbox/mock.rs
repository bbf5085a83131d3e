//! In-memory sandbox test double.
//!
//! This crate does not ship an interpreter subprocess (sandbox image
//! provisioning is out of scope), so the engine's control flow (iteration
//! bounds, trace pairing, boundary wrapping, truncation) is exercised
//! against this scripted stand-in instead of a real
//! `ChildSandbox`. Kept public under `shesha_rlm::testing` so downstream
//! integration tests (and this crate's own `tests/`) can drive the engine
//! without a real interpreter.

use async_trait::async_trait;
use std::collections::VecDeque;

use super::client::{LlmQueryFuture, SandboxHandle};
use super::protocol::ExecutionResult;
use crate::Result;

/// One scripted response to the next `execute()` call.
pub enum MockStep {
    /// Return this result immediately, no sub-LLM call.
    Result(ExecutionResult),
    /// Raise one `llm_query(instruction, content)` callback, then return
    /// `then` (typically built from the callback's reply).
    Subcall {
        instruction: String,
        content: String,
        then: Box<dyn FnOnce(String) -> ExecutionResult + Send>,
    },
}

/// A scripted [`SandboxHandle`]: each `execute()` call pops the next
/// [`MockStep`] off the front of the script.
pub struct MockSandbox {
    script: VecDeque<MockStep>,
    /// Every `context` string passed to `setup`, for assertions.
    pub setup_context: Vec<String>,
    /// Every `code` string passed to `execute`, in call order.
    pub executed_code: Vec<String>,
}

impl MockSandbox {
    pub fn new(script: Vec<MockStep>) -> Self {
        Self {
            script: script.into(),
            setup_context: Vec::new(),
            executed_code: Vec::new(),
        }
    }

    pub fn ok(stdout: impl Into<String>) -> ExecutionResult {
        ExecutionResult {
            ok: true,
            stdout: stdout.into(),
            stderr: String::new(),
            error: None,
            sentinel: None,
        }
    }

    pub fn final_answer(answer: impl Into<String>) -> ExecutionResult {
        ExecutionResult {
            ok: true,
            stdout: String::new(),
            stderr: String::new(),
            error: None,
            sentinel: Some(super::protocol::Sentinel::Answer(answer.into())),
        }
    }
}

#[async_trait]
impl SandboxHandle for MockSandbox {
    async fn setup(&mut self, context: Vec<String>) -> Result<()> {
        self.setup_context = context;
        Ok(())
    }

    async fn execute(
        &mut self,
        code: &str,
        on_llm_query: &mut (dyn FnMut(String, String) -> LlmQueryFuture + Send),
    ) -> Result<ExecutionResult> {
        self.executed_code.push(code.to_string());
        match self.script.pop_front() {
            Some(MockStep::Result(res)) => Ok(res),
            Some(MockStep::Subcall {
                instruction,
                content,
                then,
            }) => {
                let reply = on_llm_query(instruction, content).await?;
                Ok(then(reply))
            }
            None => Ok(MockSandbox::ok("(no output)")),
        }
    }

    async fn stop(&mut self) {}
}
