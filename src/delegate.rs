use std::fmt;
use std::io;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use itertools::Itertools;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::contract::StageResult;
use crate::validation::scalar_text;

pub const DEFAULT_DELEGATE_TIMEOUT: Duration = Duration::from_secs(120);

const MAX_DETAIL_CHARS: usize = 1024;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandLine {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn parse(raw: &str) -> Result<Self, DelegationError> {
        let mut parts = shlex::split(raw.trim())
            .ok_or_else(|| DelegationError::InvalidCommand(raw.to_string()))?
            .into_iter();
        let program = parts
            .next()
            .ok_or_else(|| DelegationError::InvalidCommand(raw.to_string()))?;
        Ok(Self::new(program, parts.collect()))
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.args.is_empty() {
            return write!(f, "{}", self.program);
        }
        write!(f, "{} {}", self.program, self.args.iter().join(" "))
    }
}

#[derive(Debug, Error)]
pub enum DelegationError {
    #[error("invalid_command_line:{0}")]
    InvalidCommand(String),
    #[error("spawn_error:{0}")]
    Spawn(#[source] io::Error),
    #[error("io_error:{0}")]
    Io(#[source] io::Error),
    #[error("timeout after {0:?}")]
    Timeout(Duration),
    #[error("{detail}")]
    Exit { code: Option<i32>, detail: String },
    #[error("invalid_json")]
    InvalidJson,
}

impl DelegationError {
    pub fn reason(&self, tag: &str) -> String {
        match self {
            DelegationError::InvalidJson => format!("{tag}_invalid_json"),
            other => format!("{tag}_failed:{}", cap_detail(&other.to_string())),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, DelegationError::Timeout(_))
    }
}

fn cap_detail(detail: &str) -> String {
    detail.chars().take(MAX_DETAIL_CHARS).collect()
}

#[async_trait]
pub trait Delegate: Send + Sync {
    async fn invoke(
        &self,
        command: &CommandLine,
        request: &Value,
        timeout: Duration,
    ) -> Result<Map<String, Value>, DelegationError>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessDelegate;

#[async_trait]
impl Delegate for ProcessDelegate {
    async fn invoke(
        &self,
        command: &CommandLine,
        request: &Value,
        timeout: Duration,
    ) -> Result<Map<String, Value>, DelegationError> {
        let payload = serde_json::to_vec(request).map_err(|err| DelegationError::Io(err.into()))?;

        let mut child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(DelegationError::Spawn)?;

        // written concurrently so a child that answers before draining stdin
        // cannot stall the wait; a broken pipe just means it stopped reading
        if let Some(mut stdin) = child.stdin.take() {
            tokio::spawn(async move {
                if let Err(err) = stdin.write_all(&payload).await {
                    tracing::debug!("delegate stdin closed early: {}", err);
                }
            });
        }

        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(output) => output.map_err(DelegationError::Io)?,
            Err(_) => {
                tracing::warn!("delegate {} timed out after {:?}", command, timeout);
                return Err(DelegationError::Timeout(timeout));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = [stderr.trim(), stdout.trim()]
                .into_iter()
                .find(|text| !text.is_empty())
                .unwrap_or("unknown_error");
            return Err(DelegationError::Exit {
                code: output.status.code(),
                detail: cap_detail(detail),
            });
        }

        parse_response(&stdout)
    }
}

pub fn parse_response(stdout: &str) -> Result<Map<String, Value>, DelegationError> {
    let stdout = stdout.trim();
    if stdout.is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str::<Value>(stdout) {
        Ok(Value::Object(body)) => Ok(body),
        _ => Err(DelegationError::InvalidJson),
    }
}

// a result that is not skipped must carry spend_bundle_hex
pub fn classify_response(tag: &str, mut body: Map<String, Value>) -> StageResult {
    let status = body
        .remove("status")
        .map(|status| scalar_text(&status))
        .unwrap_or_else(|| "executed".to_string());
    let reason = body
        .remove("reason")
        .map(|reason| scalar_text(&reason))
        .unwrap_or_else(|| format!("{tag}_success"));
    let operation_id = match body.remove("operation_id") {
        None | Some(Value::Null) => None,
        Some(operation_id) => Some(scalar_text(&operation_id)),
    };
    let spend_bundle_hex = match body.remove("spend_bundle_hex") {
        None | Some(Value::Null) => None,
        Some(hex) => Some(scalar_text(&hex).trim().to_string()),
    };

    match spend_bundle_hex {
        _ if status == "skipped" => StageResult::Skipped {
            reason,
            operation_id,
            partial: body,
        },
        Some(spend_bundle_hex) => StageResult::Executed {
            reason,
            operation_id,
            spend_bundle_hex,
        },
        None => StageResult::skipped(format!("{tag}_missing_spend_bundle_hex")),
    }
}
