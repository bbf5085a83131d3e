//! Append-only trace recorder.
//!
//! Every observable event in a query (driver completions, sandbox
//! executions, sub-LLM delegations, errors, the final answer) passes
//! through a [`Trace`]. No step is ever mutated or removed once appended
//! (invariant I3): the recorder only exposes `add_step` for writes and
//! slice/iterator access for reads.

use std::time::Instant;

/// The kind of event a [`TraceStep`] records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepType {
    CodeGenerated,
    CodeOutput,
    SubcallRequest,
    SubcallResponse,
    Error,
    FinalAnswer,
}

/// One entry in a query's trace.
#[derive(Debug, Clone)]
pub struct TraceStep {
    pub step_type: StepType,
    pub content: String,
    /// Seconds since the owning query's `start_time`.
    pub timestamp: f64,
    pub iteration: u32,
    pub tokens_used: Option<u32>,
    pub duration_ms: Option<u64>,
}

/// Token accounting for a query. Counters are monotonically
/// non-decreasing: every driver completion and every sub-LLM call adds to
/// them, nothing ever subtracts.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }

    /// Accumulate one completion's usage into the running total.
    pub fn add(&mut self, prompt_tokens: u32, completion_tokens: u32) {
        self.prompt_tokens += prompt_tokens;
        self.completion_tokens += completion_tokens;
    }
}

/// Append-only event log for a single query.
#[derive(Debug)]
pub struct Trace {
    steps: Vec<TraceStep>,
    start_time: Instant,
}

impl Trace {
    /// Create an empty trace, anchoring all future `timestamp` values to
    /// now.
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            start_time: Instant::now(),
        }
    }

    /// Append a step, stamping it with the current monotonic wall time
    /// relative to this trace's start.
    pub fn add_step(
        &mut self,
        step_type: StepType,
        content: impl Into<String>,
        iteration: u32,
        tokens_used: Option<u32>,
        duration_ms: Option<u64>,
    ) -> &TraceStep {
        let step = TraceStep {
            step_type,
            content: content.into(),
            timestamp: self.start_time.elapsed().as_secs_f64(),
            iteration,
            tokens_used,
            duration_ms,
        };
        self.steps.push(step);
        self.steps.last().expect("just pushed")
    }

    pub fn steps(&self) -> &[TraceStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TraceStep> {
        self.steps.iter()
    }

    /// I3 (partial, the pairing half): every `SubcallRequest` step is
    /// immediately followed, in insertion order, not necessarily
    /// adjacent, by exactly one `SubcallResponse` or `Error` step with
    /// the same iteration and a later timestamp. Exposed for tests (P7);
    /// the engine itself maintains this by construction.
    pub fn subcalls_paired(&self) -> bool {
        let mut pending: Option<(u32, f64)> = None;
        for step in &self.steps {
            match step.step_type {
                StepType::SubcallRequest => {
                    if pending.is_some() {
                        return false; // two requests without a resolving response
                    }
                    pending = Some((step.iteration, step.timestamp));
                }
                StepType::SubcallResponse | StepType::Error => {
                    if let Some((iter, ts)) = pending {
                        if step.iteration == iter && step.timestamp >= ts {
                            pending = None;
                        }
                    }
                }
                _ => {}
            }
        }
        pending.is_none()
    }
}

impl Default for Trace {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_step_and_read() {
        let mut trace = Trace::new();
        trace.add_step(StepType::CodeGenerated, "print(1)", 0, Some(10), None);
        assert_eq!(trace.len(), 1);
        assert_eq!(trace.steps()[0].step_type, StepType::CodeGenerated);
    }

    /// P8: token usage never decreases.
    #[test]
    fn test_token_usage_monotonic() {
        let mut usage = TokenUsage::default();
        let mut last_total = 0;
        for (p, c) in [(10, 5), (3, 7), (0, 1)] {
            usage.add(p, c);
            assert!(usage.total() >= last_total);
            last_total = usage.total();
        }
        assert_eq!(usage.total(), 26);
    }

    #[test]
    fn test_subcalls_paired_true_on_matched_request_response() {
        let mut trace = Trace::new();
        trace.add_step(StepType::SubcallRequest, "req", 0, None, None);
        trace.add_step(StepType::SubcallResponse, "resp", 0, Some(5), None);
        assert!(trace.subcalls_paired());
    }

    #[test]
    fn test_subcalls_paired_false_on_dangling_request() {
        let mut trace = Trace::new();
        trace.add_step(StepType::SubcallRequest, "req", 0, None, None);
        assert!(!trace.subcalls_paired());
    }

    #[test]
    fn test_subcalls_paired_true_with_error_resolution() {
        let mut trace = Trace::new();
        trace.add_step(StepType::SubcallRequest, "req", 1, None, None);
        trace.add_step(StepType::Error, "sub-llm failed", 1, None, None);
        assert!(trace.subcalls_paired());
    }
}
