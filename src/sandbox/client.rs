//! Sandbox client: one long-lived interpreter process, stdin/stdout as the
//! sole bidirectional channel.
//!
//! Spawn, take `stdin`, write a line, read a
//! `BufReader<ChildStdout>::lines()` loop, collect `stderr` in a
//! background task, but unlike a one-shot "write prompt, close
//! stdin, read until EOF" adapter, this client keeps `stdin` open for
//! the life of the container: the protocol is long-lived and
//! bidirectional, and the interpreter namespace must persist across
//! `execute` calls.

use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::time::{Duration, timeout};

use super::protocol::{ExecutionResult, HostMessage, SandboxEvent, parse_sandbox_line};
use crate::{Error, Result};

/// Abstracts over a real sandbox subprocess and (in tests) a scripted
/// in-memory stand-in, type-erased behind `Arc<dyn Fn(...) -> Pin<Box<dyn
/// Future<...>>>>`. This is what lets the engine's control flow be
/// exercised without a real interpreter subprocess, which this crate does
/// not ship.
#[async_trait]
pub trait SandboxHandle: Send {
    /// Initialize the sandbox's `context` variable with already
    /// boundary-wrapped document strings.
    async fn setup(&mut self, context: Vec<String>) -> Result<()>;

    /// Execute one code block, dispatching any `llm_query` callbacks
    /// raised during execution through `on_llm_query` and writing its
    /// string reply back before resuming the read loop.
    async fn execute(
        &mut self,
        code: &str,
        on_llm_query: &mut (dyn FnMut(String, String) -> LlmQueryFuture + Send),
    ) -> Result<ExecutionResult>;

    /// Tear the sandbox down. Idempotent.
    async fn stop(&mut self);
}

/// Boxed future returned by an `on_llm_query` callback: the engine's
/// sub-LLM dispatch, synchronous from the sandbox's point of view.
pub type LlmQueryFuture =
    std::pin::Pin<Box<dyn std::future::Future<Output = Result<String>> + Send>>;

/// A real sandbox backed by a child process speaking the stdio JSON
/// protocol.
pub struct ChildSandbox {
    child: Child,
    stdin: ChildStdin,
    lines: Lines<BufReader<ChildStdout>>,
    execute_timeout: Duration,
}

impl ChildSandbox {
    /// Spawn `program args...` with piped stdio. The process is expected
    /// to speak the line-delimited JSON protocol immediately, with no
    /// handshake beyond the first `setup` message.
    pub fn spawn(program: &str, args: &[String], execute_timeout: Duration) -> Result<Self> {
        let mut cmd = Command::new(program);
        cmd.args(args);
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::sandbox_process(format!("failed to spawn {program}: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::sandbox_process("failed to capture sandbox stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::sandbox_process("failed to capture sandbox stdout"))?;

        // stderr is drained in the background so the sandbox never blocks
        // on a full pipe; we don't currently surface it anywhere, but
        // draining prevents the classic "child hangs writing to stderr"
        // deadlock.
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut reader = BufReader::new(stderr).lines();
                while let Ok(Some(_)) = reader.next_line().await {}
            });
        }

        let lines = BufReader::new(stdout).lines();

        Ok(Self {
            child,
            stdin,
            lines,
            execute_timeout,
        })
    }

    async fn write_message(&mut self, msg: &HostMessage) -> Result<()> {
        let mut line = serde_json::to_string(msg)?;
        line.push('\n');
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.flush().await?;
        Ok(())
    }

    async fn read_event(&mut self) -> Result<SandboxEvent> {
        match self.lines.next_line().await {
            Ok(Some(line)) => parse_sandbox_line(&line),
            Ok(None) => Err(Error::sandbox_channel("sandbox stdout closed (EOF)")),
            Err(e) => Err(Error::sandbox_channel(format!("read error: {e}"))),
        }
    }

    /// Read lines until one is a terminal execution result, dispatching
    /// any interleaved `llm_query` callbacks. One re-read attempt is made
    /// on a single malformed/EOF line before the channel is considered
    /// fatally broken.
    async fn read_until_result(
        &mut self,
        on_llm_query: &mut (dyn FnMut(String, String) -> LlmQueryFuture + Send),
    ) -> Result<ExecutionResult> {
        let mut retried = false;
        loop {
            let event = match self.read_event().await {
                Ok(ev) => ev,
                Err(e) if !retried => {
                    retried = true;
                    tracing::warn!(error = %e, "sandbox channel error, attempting one re-read");
                    continue;
                }
                Err(e) => return Err(e),
            };

            match event {
                SandboxEvent::Result(res) => return Ok(res),
                SandboxEvent::LlmQuery(req) => {
                    // Sub-LLM calls within one execute are serialized:
                    // the sandbox cannot issue a second llm_query until
                    // this one is resolved, so we simply await here.
                    let reply = on_llm_query(req.instruction, req.content).await?;
                    self.write_message(&HostMessage::LlmResponse { result: reply })
                        .await?;
                }
            }
        }
    }
}

#[async_trait]
impl SandboxHandle for ChildSandbox {
    async fn setup(&mut self, context: Vec<String>) -> Result<()> {
        self.write_message(&HostMessage::Setup { context }).await
    }

    #[tracing::instrument(skip_all, fields(code_len = code.len()))]
    async fn execute(
        &mut self,
        code: &str,
        on_llm_query: &mut (dyn FnMut(String, String) -> LlmQueryFuture + Send),
    ) -> Result<ExecutionResult> {
        tracing::debug!("sending execute to sandbox");
        self.write_message(&HostMessage::Execute { code: code.to_string() })
            .await?;

        match timeout(self.execute_timeout, self.read_until_result(on_llm_query)).await {
            Ok(result) => result,
            Err(_) => {
                // The resource policy terminates the whole container on
                // timeout; the control loop still treats *this* result as
                // recoverable (status=error, loop continues) rather than
                // fatal, a subsequent execute against the now-dead child
                // will naturally surface a fatal SandboxChannel error via
                // the EOF path, see DESIGN.md.
                tracing::warn!(timeout = ?self.execute_timeout, "sandbox execute timed out, killing container");
                let _ = self.child.start_kill();
                Ok(ExecutionResult {
                    ok: false,
                    stdout: String::new(),
                    stderr: String::new(),
                    error: Some(format!(
                        "execution timed out after {:?}",
                        self.execute_timeout
                    )),
                    sentinel: None,
                })
            }
        }
    }

    async fn stop(&mut self) {
        let _ = self.child.start_kill();
        let _ = self.child.wait().await;
    }
}
