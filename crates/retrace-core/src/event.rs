//! Wire-level trace events.
//!
//! Every traced invocation produces three events sharing one [`CallId`]:
//! an [`EnterEvent`] when it starts, then a [`CallEvent`] listing its nested
//! invocations and an [`ExitEvent`] with its outcome once it completes. Each
//! event is serialized as one JSON object per log line, tagged by `type`.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::id::{CallId, FnId, Invocation};
use crate::value::TraceValue;

/// A single line of a trace log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TraceEvent {
    Enter(EnterEvent),
    Call(CallEvent),
    Exit(ExitEvent),
}

/// Inputs of an invocation, captured before its body runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnterEvent {
    pub fn_id: FnId,
    pub call_id: CallId,
    pub this_value: TraceValue,
    #[serde(default)]
    pub this_type: String,
    pub args: Vec<TraceValue>,
    /// Parallel to `args`; empty when the instrumenter supplied no types.
    #[serde(default)]
    pub args_types: Vec<String>,
    #[serde(default)]
    pub env: IndexMap<String, TraceValue>,
    /// Same key set as `env`; empty when no types were supplied.
    #[serde(default)]
    pub env_types: IndexMap<String, String>,
}

/// Nested invocations observed during one invocation, in call order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallEvent {
    pub fn_id: FnId,
    pub call_id: CallId,
    pub child_invocations: Vec<Invocation>,
}

/// Result of an invocation plus the post-call state of its free variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExitEvent {
    pub fn_id: FnId,
    pub call_id: CallId,
    pub outcome: Outcome,
    #[serde(default)]
    pub outcome_types: OutcomeTypes,
    #[serde(default)]
    pub env: IndexMap<String, TraceValue>,
    #[serde(default)]
    pub env_types: IndexMap<String, String>,
}

/// How an invocation ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Outcome {
    #[serde(rename = "return")]
    Returned { value: TraceValue },
    #[serde(rename = "throw")]
    Threw { error: TraceValue },
}

/// `[returnType, errorType]` descriptors of an exit event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeTypes(pub String, pub String);

impl TraceEvent {
    pub fn fn_id(&self) -> &FnId {
        match self {
            TraceEvent::Enter(e) => &e.fn_id,
            TraceEvent::Call(e) => &e.fn_id,
            TraceEvent::Exit(e) => &e.fn_id,
        }
    }

    pub fn call_id(&self) -> &CallId {
        match self {
            TraceEvent::Enter(e) => &e.call_id,
            TraceEvent::Call(e) => &e.call_id,
            TraceEvent::Exit(e) => &e.call_id,
        }
    }

    pub fn kind_label(&self) -> &'static str {
        match self {
            TraceEvent::Enter(_) => "enter",
            TraceEvent::Call(_) => "call",
            TraceEvent::Exit(_) => "exit",
        }
    }
}

impl EnterEvent {
    /// Checks the parallel-list and key-set invariants of this event.
    pub fn validate(&self) -> Result<(), CoreError> {
        if !self.args_types.is_empty() && self.args_types.len() != self.args.len() {
            return Err(CoreError::ArgsTypesMismatch {
                call_id: self.call_id.clone(),
                args: self.args.len(),
                types: self.args_types.len(),
            });
        }
        check_env_types(&self.call_id, &self.env, &self.env_types)
    }
}

impl ExitEvent {
    pub fn validate(&self) -> Result<(), CoreError> {
        check_env_types(&self.call_id, &self.env, &self.env_types)
    }
}

impl Outcome {
    pub fn is_throw(&self) -> bool {
        matches!(self, Outcome::Threw { .. })
    }

    /// The returned value, if the invocation returned.
    pub fn returned(&self) -> Option<&TraceValue> {
        match self {
            Outcome::Returned { value } => Some(value),
            Outcome::Threw { .. } => None,
        }
    }

    /// The thrown error, if the invocation threw.
    pub fn thrown(&self) -> Option<&TraceValue> {
        match self {
            Outcome::Threw { error } => Some(error),
            Outcome::Returned { .. } => None,
        }
    }
}

impl OutcomeTypes {
    pub fn new(return_type: impl Into<String>, error_type: impl Into<String>) -> Self {
        OutcomeTypes(return_type.into(), error_type.into())
    }

    pub fn return_type(&self) -> &str {
        &self.0
    }

    pub fn error_type(&self) -> &str {
        &self.1
    }
}

fn check_env_types(
    call_id: &CallId,
    env: &IndexMap<String, TraceValue>,
    env_types: &IndexMap<String, String>,
) -> Result<(), CoreError> {
    if env_types.is_empty() {
        return Ok(());
    }
    let missing: Vec<&str> = env
        .keys()
        .filter(|k| !env_types.contains_key(*k))
        .map(String::as_str)
        .collect();
    let extra: Vec<&str> = env_types
        .keys()
        .filter(|k| !env.contains_key(*k))
        .map(String::as_str)
        .collect();
    if missing.is_empty() && extra.is_empty() {
        return Ok(());
    }
    Err(CoreError::EnvTypesMismatch {
        call_id: call_id.clone(),
        detail: format!(
            "untyped: [{}], unknown: [{}]",
            missing.join(", "),
            extra.join(", ")
        ),
    })
}
