//! Wire types for the sandbox stdio protocol.
//!
//! One JSON object per line, UTF-8, in each direction. The sentinel fields
//! (`final_answer`/`final_var`/`final_value`) are the wire shape; once
//! deserialized they are folded into the `Sentinel` sum type.

use serde::{Deserialize, Serialize};

/// One host → sandbox message.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum HostMessage {
    /// Initializes the `context` variable. Every element is already
    /// boundary-wrapped by the caller.
    Setup { context: Vec<String> },
    /// Requests execution of one code block.
    Execute { code: String },
    /// Reply to a sandbox-raised `llm_query`.
    LlmResponse { result: String },
    /// Liveness check.
    Ping,
}

/// A sandbox → host `llm_query` callback request.
#[derive(Debug, Clone, Deserialize)]
pub struct LlmQueryRequest {
    pub instruction: String,
    pub content: String,
}

/// `FINAL` / `FINAL_VAR` sentinel, modeled as a tagged sum type rather
/// than the three loose optional wire fields the prose protocol uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sentinel {
    Answer(String),
    Var { name: String, value: String },
}

/// The execution-result shape as it appears on the wire.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawExecutionResult {
    pub status: String,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub final_answer: Option<String>,
    #[serde(default)]
    pub final_var: Option<String>,
    #[serde(default)]
    pub final_value: Option<String>,
}

/// The classified result of executing one code block.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub ok: bool,
    pub stdout: String,
    pub stderr: String,
    pub error: Option<String>,
    pub sentinel: Option<Sentinel>,
}

impl From<RawExecutionResult> for ExecutionResult {
    fn from(raw: RawExecutionResult) -> Self {
        let sentinel = if let Some(answer) = raw.final_answer {
            Some(Sentinel::Answer(answer))
        } else if let (Some(name), Some(value)) = (raw.final_var, raw.final_value) {
            Some(Sentinel::Var { name, value })
        } else {
            None
        };
        ExecutionResult {
            ok: raw.status == "ok",
            stdout: raw.stdout,
            stderr: raw.stderr,
            error: raw.error,
            sentinel,
        }
    }
}

/// A single line read from the sandbox: either a callback request or a
/// terminal execution result. Distinguishes the two on the `action`
/// field, present only on callback requests.
#[derive(Debug, Clone)]
pub enum SandboxEvent {
    LlmQuery(LlmQueryRequest),
    Result(ExecutionResult),
}

pub fn parse_sandbox_line(line: &str) -> crate::Result<SandboxEvent> {
    let value: serde_json::Value = serde_json::from_str(line)?;
    if value.get("action").and_then(|a| a.as_str()) == Some("llm_query") {
        let req: LlmQueryRequest = serde_json::from_value(value)?;
        Ok(SandboxEvent::LlmQuery(req))
    } else {
        let raw: RawExecutionResult = serde_json::from_value(value)?;
        Ok(SandboxEvent::Result(raw.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_serializes_with_action_tag() {
        let msg = HostMessage::Setup {
            context: vec!["doc1".into()],
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"action\":\"setup\""));
        assert!(json.contains("doc1"));
    }

    #[test]
    fn test_execute_serializes() {
        let msg = HostMessage::Execute {
            code: "print(1)".into(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"action\":\"execute\""));
    }

    #[test]
    fn test_parse_llm_query_line() {
        let line = r#"{"action":"llm_query","instruction":"summarize","content":"abc"}"#;
        match parse_sandbox_line(line).unwrap() {
            SandboxEvent::LlmQuery(req) => {
                assert_eq!(req.instruction, "summarize");
                assert_eq!(req.content, "abc");
            }
            _ => panic!("expected LlmQuery"),
        }
    }

    #[test]
    fn test_parse_result_line_ok() {
        let line = r#"{"status":"ok","stdout":"hi","stderr":""}"#;
        match parse_sandbox_line(line).unwrap() {
            SandboxEvent::Result(res) => {
                assert!(res.ok);
                assert_eq!(res.stdout, "hi");
                assert!(res.sentinel.is_none());
            }
            _ => panic!("expected Result"),
        }
    }

    #[test]
    fn test_parse_result_line_final_answer() {
        let line = r#"{"status":"ok","stdout":"","stderr":"","final_answer":"42"}"#;
        match parse_sandbox_line(line).unwrap() {
            SandboxEvent::Result(res) => {
                assert_eq!(res.sentinel, Some(Sentinel::Answer("42".into())));
            }
            _ => panic!("expected Result"),
        }
    }

    #[test]
    fn test_parse_result_line_final_var() {
        let line = r#"{"status":"ok","stdout":"","stderr":"","final_var":"x","final_value":"7"}"#;
        match parse_sandbox_line(line).unwrap() {
            SandboxEvent::Result(res) => {
                assert_eq!(
                    res.sentinel,
                    Some(Sentinel::Var {
                        name: "x".into(),
                        value: "7".into()
                    })
                );
            }
            _ => panic!("expected Result"),
        }
    }

    #[test]
    fn test_parse_malformed_line_errors() {
        assert!(parse_sandbox_line("not json").is_err());
    }
}
