//! The control loop: couples a driver LLM conversation to a sandboxed code
//! interpreter, mediates sub-LLM delegations, and produces a [`QueryResult`].
//!
//! This is the largest module in the crate. The control flow is a plain
//! host/sandbox read-execute-dispatch cycle, the same one
//! [`crate::sandbox::client::ChildSandbox`] speaks on the wire, with the
//! driver conversation and trace bookkeeping layered on top.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Mutex;

use crate::boundary::{BoundaryToken, wrap_unless_empty};
use crate::codeblock::{extract_code_blocks, truncate_code_output};
use crate::config::EngineConfig;
use crate::document::ParsedDocument;
use crate::llm::DriverLlm;
use crate::message::Message;
use crate::prompts::PromptAssembler;
use crate::sandbox::{ChildSandbox, Factory, LlmQueryFuture, SandboxHandle, SandboxPool, Sentinel};
use crate::trace::{StepType, Trace, TokenUsage};
use crate::Result;

/// Deterministic answer returned when `max_iterations` is exhausted
/// without a `FINAL`/`FINAL_VAR` (spec invariant I4; `MaxIterationsReached`
/// is non-exceptional).
pub const MAX_ITERATIONS_SENTINEL: &str = "[reached max_iterations without a final answer]";

/// The result of one [`Engine::query`] call.
#[derive(Debug)]
pub struct QueryResult {
    pub answer: String,
    pub trace: Trace,
    pub token_usage: TokenUsage,
    pub execution_time: f64,
}

/// Mutable state shared between the main loop and the sub-LLM callback
/// closures it spawns each iteration. A `tokio::sync::Mutex` rather than a
/// `RefCell`: the callback returns a boxed `'static` future, so it cannot
/// borrow the loop's stack frame directly.
struct QueryState {
    trace: Trace,
    token_usage: TokenUsage,
}

/// The RLM execution engine. Cheap to construct per configuration; holds
/// no per-query state itself, the boundary and iteration counter are
/// query-local, never engine-level, so two queries may run
/// concurrently against one `Engine`).
pub struct Engine {
    driver: Arc<dyn DriverLlm>,
    pool: SandboxPool,
    assembler: PromptAssembler,
    config: EngineConfig,
}

impl Engine {
    /// Build an engine that spawns real [`ChildSandbox`] processes per
    /// `config.sandbox_program`/`sandbox_args`.
    pub fn new(
        driver: Arc<dyn DriverLlm>,
        config: EngineConfig,
        templates: Arc<dyn crate::prompts::PromptTemplates>,
    ) -> Self {
        let program = config.sandbox_program.clone();
        let args = config.sandbox_args.clone();
        let execute_timeout = config.execute_timeout;
        let factory: Factory = Arc::new(move || {
            let sandbox = ChildSandbox::spawn(&program, &args, execute_timeout)?;
            Ok(Box::new(sandbox) as Box<dyn SandboxHandle>)
        });
        Self::with_sandbox_factory(driver, factory, config, templates)
    }

    /// Build an engine around an arbitrary sandbox factory, e.g. one
    /// constructing [`crate::sandbox::MockSandbox`] instances in tests.
    pub fn with_sandbox_factory(
        driver: Arc<dyn DriverLlm>,
        factory: Factory,
        config: EngineConfig,
        templates: Arc<dyn crate::prompts::PromptTemplates>,
    ) -> Self {
        Self {
            driver,
            pool: SandboxPool::new(factory),
            assembler: PromptAssembler::new(templates),
            config,
        }
    }

    /// Eagerly pre-warm the sandbox pool to `config.pool_size`. Optional:
    /// `query` acquires elastically even if this was never called.
    pub async fn start(&self) -> Result<()> {
        self.pool.start(self.config.pool_size).await
    }

    /// Run one RLM query to completion.
    #[tracing::instrument(skip_all, fields(doc_count = documents.len(), question_len = question.len()))]
    pub async fn query(&self, documents: &[ParsedDocument], question: &str) -> Result<QueryResult> {
        let start_time = Instant::now();
        let boundary = BoundaryToken::generate();
        tracing::info!("starting query");

        let state = Arc::new(Mutex::new(QueryState {
            trace: Trace::new(),
            token_usage: TokenUsage::default(),
        }));

        let system_prompt = self.assembler.render_system(&boundary);
        let doc_count = documents.len();
        let total_chars: usize = documents.iter().map(|d| d.char_count).sum();
        let per_doc_sizes: Vec<usize> = documents.iter().map(|d| d.char_count).collect();
        let context_metadata = self
            .assembler
            .render_context_metadata(doc_count, total_chars, &per_doc_sizes);
        let iteration_zero = self.assembler.render_iteration_zero(question);

        let mut messages = vec![
            Message::system(system_prompt),
            Message::assistant(context_metadata),
            Message::user(iteration_zero),
        ];

        let mut sandbox = self.pool.acquire().await?;
        let wrapped_context: Vec<String> = documents
            .iter()
            .map(|d| boundary.wrap(&d.content))
            .collect();

        if let Err(e) = sandbox.setup(wrapped_context).await {
            sandbox.stop().await;
            return Err(e);
        }

        let run_result = self
            .run_loop(&mut messages, &boundary, &state, sandbox.as_mut())
            .await;

        let answer = match run_result {
            Ok(answer) => {
                self.pool.release(sandbox).await;
                answer
            }
            Err(e) => {
                sandbox.stop().await;
                return Err(e);
            }
        };

        // Every subcall closure is scoped to its owning loop iteration and
        // is dropped before the next iteration begins, so by the time
        // `run_loop` returns this `state` arc is the sole owner.
        let state = match Arc::try_unwrap(state) {
            Ok(mutex) => mutex.into_inner(),
            Err(_) => unreachable!("subcall closures must not outlive run_loop"),
        };

        let execution_time = start_time.elapsed().as_secs_f64();
        tracing::info!(execution_time, "query finished");

        Ok(QueryResult {
            answer,
            trace: state.trace,
            token_usage: state.token_usage,
            execution_time,
        })
    }

    /// The main loop proper, returning the final answer string. Any `Err`
    /// returned here is a driver-LLM adapter failure propagated verbatim,
    /// the engine does not retry driver completions itself.
    async fn run_loop(
        &self,
        messages: &mut Vec<Message>,
        boundary: &BoundaryToken,
        state: &Arc<Mutex<QueryState>>,
        sandbox: &mut dyn SandboxHandle,
    ) -> Result<String> {
        let mut iterations_run = 0u32;

        loop {
            if iterations_run >= self.config.max_iterations {
                tracing::warn!(max_iterations = self.config.max_iterations, "max_iterations exhausted without a final answer");
                return Ok(MAX_ITERATIONS_SENTINEL.to_string());
            }
            let iteration = iterations_run;
            iterations_run += 1;
            tracing::debug!(iteration, "requesting driver completion");

            let completion = self.driver.complete(messages).await?;
            {
                let mut s = state.lock().await;
                s.token_usage
                    .add(completion.prompt_tokens, completion.completion_tokens);
                s.trace.add_step(
                    StepType::CodeGenerated,
                    completion.content.clone(),
                    iteration,
                    Some(completion.prompt_tokens + completion.completion_tokens),
                    None,
                );
            }

            let blocks = extract_code_blocks(&completion.content);
            if blocks.is_empty() {
                messages.push(Message::assistant(completion.content));
                messages.push(Message::user(self.assembler.code_required()));
                continue;
            }

            let mut on_llm_query = self.make_subcall_callback(iteration, boundary, state);

            let mut echoes: Vec<(String, String)> = Vec::with_capacity(blocks.len());
            let mut final_answer: Option<String> = None;

            for block in &blocks {
                let exec_start = Instant::now();
                let exec_outcome = sandbox.execute(block, &mut on_llm_query).await;
                let duration_ms = exec_start.elapsed().as_millis() as u64;
                tracing::debug!(iteration, duration_ms, "sandbox execute returned");

                let exec_result = match exec_outcome {
                    Ok(res) => res,
                    Err(e) => {
                        // SandboxChannelError: fatal to this query, but the
                        // model never sees it as an `Err`, it is surfaced
                        // as a terminating answer string instead.
                        tracing::warn!(iteration, error = %e, "sandbox channel error, ending query");
                        let mut s = state.lock().await;
                        s.trace.add_step(
                            StepType::Error,
                            format!("sandbox channel error: {e}"),
                            iteration,
                            None,
                            Some(duration_ms),
                        );
                        return Ok(format!("[fatal: sandbox channel error: {e}]"));
                    }
                };

                let combined = combine_output(&exec_result);
                let truncated = truncate_code_output(&combined, self.config.max_output_chars);

                {
                    let mut s = state.lock().await;
                    s.trace.add_step(
                        StepType::CodeOutput,
                        truncated.clone(),
                        iteration,
                        None,
                        Some(duration_ms),
                    );
                }
                echoes.push((block.clone(), truncated));

                if let Some(sentinel) = exec_result.sentinel {
                    let answer = match sentinel {
                        Sentinel::Answer(answer) => answer,
                        Sentinel::Var { name, value } => {
                            let mut s = state.lock().await;
                            s.trace.add_step(
                                StepType::FinalAnswer,
                                format!("{name} = {value}"),
                                iteration,
                                None,
                                None,
                            );
                            final_answer = Some(value);
                            break;
                        }
                    };
                    let mut s = state.lock().await;
                    s.trace
                        .add_step(StepType::FinalAnswer, answer.clone(), iteration, None, None);
                    final_answer = Some(answer);
                    break;
                }
            }

            if let Some(answer) = final_answer {
                return Ok(answer);
            }

            messages.push(Message::assistant(completion.content));
            for (code, output) in &echoes {
                messages.push(Message::user(self.assembler.format_code_echo(
                    code,
                    output,
                    boundary,
                )));
            }
            messages.push(Message::user(self.assembler.iteration_continue()));
        }
    }

    /// Build the `llm_query` callback for one iteration: wraps `content`,
    /// records SUBCALL_REQUEST, renders the sub-call prompt, calls the
    /// driver LLM with a fresh single-turn conversation, records
    /// SUBCALL_RESPONSE (or ERROR), and returns the reply string.
    fn make_subcall_callback(
        &self,
        iteration: u32,
        boundary: &BoundaryToken,
        state: &Arc<Mutex<QueryState>>,
    ) -> impl FnMut(String, String) -> LlmQueryFuture + Send {
        let driver = Arc::clone(&self.driver);
        let assembler = self.assembler.clone();
        let boundary = boundary.clone();
        let state = Arc::clone(state);

        move |instruction: String, content: String| -> LlmQueryFuture {
            let driver = Arc::clone(&driver);
            let assembler = assembler.clone();
            let boundary = boundary.clone();
            let state = Arc::clone(&state);

            Box::pin(async move {
                let char_count = content.chars().count();
                tracing::debug!(iteration, char_count, "dispatching sub-LLM call");
                {
                    let mut s = state.lock().await;
                    s.trace.add_step(
                        StepType::SubcallRequest,
                        format!("{instruction} ({char_count} chars)"),
                        iteration,
                        None,
                        None,
                    );
                }

                let wrapped = wrap_unless_empty(&content, &boundary);
                let prompt = assembler.render_subcall(&instruction, &wrapped);
                let sub_messages = vec![Message::user(prompt)];

                match driver.complete(&sub_messages).await {
                    Ok(completion) => {
                        let mut s = state.lock().await;
                        s.token_usage
                            .add(completion.prompt_tokens, completion.completion_tokens);
                        s.trace.add_step(
                            StepType::SubcallResponse,
                            completion.content.clone(),
                            iteration,
                            Some(completion.prompt_tokens + completion.completion_tokens),
                            None,
                        );
                        Ok(completion.content)
                    }
                    Err(e) => {
                        let mut s = state.lock().await;
                        s.trace.add_step(
                            StepType::Error,
                            format!("sub-llm call failed: {e}"),
                            iteration,
                            None,
                            None,
                        );
                        // Returned to the sandbox as data, not propagated:
                        // the model is expected to observe and react.
                        Ok(format!("ERROR: sub-llm call failed: {e}"))
                    }
                }
            })
        }
    }
}

/// Build the combined output string from an execution result: stdout,
/// then stderr under a `STDERR:` prefix, then error under an `ERROR:`
/// prefix; `"(no output)"` if all three are empty.
fn combine_output(result: &crate::sandbox::ExecutionResult) -> String {
    let mut combined = String::new();
    combined.push_str(&result.stdout);
    if !result.stderr.is_empty() {
        if !combined.is_empty() {
            combined.push('\n');
        }
        combined.push_str("STDERR:\n");
        combined.push_str(&result.stderr);
    }
    if let Some(err) = &result.error {
        if !combined.is_empty() {
            combined.push('\n');
        }
        combined.push_str("ERROR:\n");
        combined.push_str(err);
    }
    if combined.is_empty() {
        combined.push_str("(no output)");
    }
    combined
}
