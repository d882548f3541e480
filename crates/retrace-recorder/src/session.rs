//! Recorder session: the live call stack of an instrumented program.
//!
//! The session replaces a process-wide singleton with one owned value that
//! the host creates at start-up and tears down at exit. All operations take
//! `&mut self`; a host tracing from several threads must serialize access
//! itself, and enter/exit pairs must respect LIFO order. Concurrent or
//! re-entrant tracing outside that discipline is not supported.
//!
//! Teardown contract:
//! - [`RecorderSession::shutdown_graceful`] is the best-effort async flush;
//!   failures are logged and swallowed.
//! - [`RecorderSession::finish`] is the guaranteed sync flush; failures
//!   propagate.
//! - Dropping the session flushes whatever is still buffered.

use std::collections::HashMap;

use indexmap::IndexMap;

use retrace_core::{
    CallEvent, CallId, EnterEvent, ExitEvent, FnId, FnKind, Invocation, Outcome, OutcomeTypes,
    ReceiverId, TraceEvent, TraceValue,
};

use crate::config::RecorderConfig;
use crate::error::RecorderError;
use crate::writer::EventBuffer;

/// Arguments of [`RecorderSession::enter`].
#[derive(Debug, Clone)]
pub struct EnterCall {
    pub fn_id: FnId,
    pub kind: FnKind,
    /// Identity of `this`, used to link constructors to later method calls.
    pub receiver: Option<ReceiverId>,
    pub this_value: TraceValue,
    pub this_type: String,
    pub args: Vec<TraceValue>,
    pub args_types: Vec<String>,
    pub env: IndexMap<String, TraceValue>,
    pub env_types: IndexMap<String, String>,
}

impl EnterCall {
    pub fn new(fn_id: impl Into<String>, kind: FnKind) -> Self {
        EnterCall {
            fn_id: FnId::new(fn_id),
            kind,
            receiver: None,
            this_value: TraceValue::Undefined,
            this_type: String::new(),
            args: Vec::new(),
            args_types: Vec::new(),
            env: IndexMap::new(),
            env_types: IndexMap::new(),
        }
    }

    pub fn function(fn_id: impl Into<String>) -> Self {
        Self::new(fn_id, FnKind::Function)
    }

    pub fn method(fn_id: impl Into<String>, receiver: ReceiverId) -> Self {
        Self::new(fn_id, FnKind::Method).with_receiver(receiver)
    }

    pub fn constructor(fn_id: impl Into<String>, receiver: ReceiverId) -> Self {
        Self::new(fn_id, FnKind::Constructor).with_receiver(receiver)
    }

    pub fn with_receiver(mut self, receiver: ReceiverId) -> Self {
        self.receiver = Some(receiver);
        self
    }

    pub fn with_this(mut self, value: TraceValue, ty: impl Into<String>) -> Self {
        self.this_value = value;
        self.this_type = ty.into();
        self
    }

    pub fn with_args(mut self, args: Vec<TraceValue>, types: Vec<String>) -> Self {
        self.args = args;
        self.args_types = types;
        self
    }

    pub fn with_env_entry(
        mut self,
        name: impl Into<String>,
        value: TraceValue,
        ty: impl Into<String>,
    ) -> Self {
        let name = name.into();
        self.env_types.insert(name.clone(), ty.into());
        self.env.insert(name, value);
        self
    }
}

/// Arguments of [`RecorderSession::exit`].
#[derive(Debug, Clone)]
pub struct ExitCall {
    pub fn_id: FnId,
    pub call_id: CallId,
    pub outcome: Outcome,
    pub outcome_types: OutcomeTypes,
    pub env: IndexMap<String, TraceValue>,
    pub env_types: IndexMap<String, String>,
}

impl ExitCall {
    pub fn returned(fn_id: &FnId, call_id: &CallId, value: TraceValue) -> Self {
        Self::with_outcome(fn_id, call_id, Outcome::Returned { value })
    }

    pub fn threw(fn_id: &FnId, call_id: &CallId, error: TraceValue) -> Self {
        Self::with_outcome(fn_id, call_id, Outcome::Threw { error })
    }

    fn with_outcome(fn_id: &FnId, call_id: &CallId, outcome: Outcome) -> Self {
        ExitCall {
            fn_id: fn_id.clone(),
            call_id: call_id.clone(),
            outcome,
            outcome_types: OutcomeTypes::default(),
            env: IndexMap::new(),
            env_types: IndexMap::new(),
        }
    }

    pub fn with_types(mut self, return_type: &str, error_type: &str) -> Self {
        self.outcome_types = OutcomeTypes::new(return_type, error_type);
        self
    }

    pub fn with_env_entry(
        mut self,
        name: impl Into<String>,
        value: TraceValue,
        ty: impl Into<String>,
    ) -> Self {
        let name = name.into();
        self.env_types.insert(name.clone(), ty.into());
        self.env.insert(name, value);
        self
    }
}

/// Owned recording state for one instrumented process.
#[derive(Debug)]
pub struct RecorderSession {
    next_call: u64,
    stack: Vec<Invocation>,
    /// Completed children of every live invocation, in completion order.
    children: HashMap<CallId, Vec<Invocation>>,
    /// Constructor invocation that produced each known receiver.
    constructed: HashMap<ReceiverId, Invocation>,
    buffer: EventBuffer,
}

impl RecorderSession {
    pub fn new(config: RecorderConfig) -> Self {
        RecorderSession {
            next_call: 1,
            stack: Vec::new(),
            children: HashMap::new(),
            constructed: HashMap::new(),
            buffer: EventBuffer::new(config),
        }
    }

    /// A session configured from `RETRACE_*` environment variables.
    pub fn from_env() -> Self {
        Self::new(RecorderConfig::from_env())
    }

    pub fn config(&self) -> &RecorderConfig {
        self.buffer.config()
    }

    /// Number of live (entered, not yet exited) invocations.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Events buffered since the last flush.
    pub fn pending_events(&self) -> Vec<TraceEvent> {
        self.buffer.pending().cloned().collect()
    }

    /// Starts tracking an invocation and buffers its enter event.
    ///
    /// If the threshold flush fails, the invocation is not tracked: the stack
    /// and child lists are restored to their state before the call.
    pub fn enter(&mut self, call: EnterCall) -> Result<CallId, RecorderError> {
        let call_id = CallId::from_counter(self.next_call);
        self.next_call += 1;
        let invocation = Invocation::new(call.fn_id.clone(), call_id.clone());

        let mut initial = Vec::new();
        let mut replaced = None;
        match (call.kind, call.receiver) {
            (FnKind::Constructor, Some(receiver)) => {
                replaced = Some((receiver, self.constructed.insert(receiver, invocation.clone())));
            }
            (FnKind::Method, Some(receiver)) => {
                if let Some(ctor) = self.constructed.get(&receiver) {
                    initial.push(ctor.clone());
                }
            }
            _ => {}
        }
        self.children.insert(call_id.clone(), initial);
        self.stack.push(invocation);

        self.buffer.enqueue(TraceEvent::Enter(EnterEvent {
            fn_id: call.fn_id,
            call_id: call_id.clone(),
            this_value: call.this_value,
            this_type: call.this_type,
            args: call.args,
            args_types: call.args_types,
            env: call.env,
            env_types: call.env_types,
        }));
        if let Err(e) = self.buffer.flush_if_due() {
            self.stack.pop();
            self.children.remove(&call_id);
            match replaced {
                Some((receiver, Some(previous))) => {
                    self.constructed.insert(receiver, previous);
                }
                Some((receiver, None)) => {
                    self.constructed.remove(&receiver);
                }
                None => {}
            }
            return Err(e);
        }
        Ok(call_id)
    }

    /// Completes the innermost invocation and buffers its call and exit events.
    ///
    /// The exiting invocation must be the top of the stack; otherwise the
    /// stack is left untouched and [`RecorderError::StackMismatch`] is
    /// returned. Both events are queued before the threshold flush runs, so
    /// a flush error never separates them; the invocation is complete even
    /// when that error is returned.
    pub fn exit(&mut self, call: ExitCall) -> Result<(), RecorderError> {
        let exiting = Invocation::new(call.fn_id.clone(), call.call_id.clone());
        if self.stack.last() != Some(&exiting) {
            return Err(RecorderError::StackMismatch {
                exiting,
                innermost: self.stack.last().cloned(),
            });
        }
        self.stack.pop();

        let child_invocations = self.children.remove(&call.call_id).unwrap_or_default();
        if let Some(parent) = self.stack.last() {
            self.children
                .entry(parent.call_id.clone())
                .or_default()
                .push(exiting);
        }

        self.buffer.enqueue(TraceEvent::Call(CallEvent {
            fn_id: call.fn_id.clone(),
            call_id: call.call_id.clone(),
            child_invocations,
        }));
        self.buffer.enqueue(TraceEvent::Exit(ExitEvent {
            fn_id: call.fn_id,
            call_id: call.call_id,
            outcome: call.outcome,
            outcome_types: call.outcome_types,
            env: call.env,
            env_types: call.env_types,
        }));
        self.buffer.flush_if_due()?;
        Ok(())
    }

    /// Forgets the constructor recorded for `receiver`.
    ///
    /// Hosts call this once the receiver is unreachable; later methods on a
    /// reused id no longer get the old constructor as a child. Returns
    /// whether a constructor was tracked.
    pub fn release_receiver(&mut self, receiver: ReceiverId) -> bool {
        self.constructed.remove(&receiver).is_some()
    }

    /// Number of receivers whose constructor is still tracked.
    pub fn tracked_receivers(&self) -> usize {
        self.constructed.len()
    }

    /// Writes all buffered events now.
    pub fn flush(&mut self) -> Result<usize, RecorderError> {
        self.buffer.flush_sync()
    }

    /// Best-effort asynchronous flush for graceful termination.
    pub async fn shutdown_graceful(&mut self) {
        if let Err(e) = self.buffer.flush_async().await {
            tracing::warn!(error = %e, "async trace flush failed during shutdown");
        }
    }

    /// Final synchronous flush; the last chance to persist events.
    pub fn finish(mut self) -> Result<(), RecorderError> {
        if self.depth() > 0 {
            tracing::debug!(live = self.depth(), "finishing session with live invocations");
        }
        self.buffer.flush_sync()?;
        Ok(())
    }
}

impl Drop for RecorderSession {
    fn drop(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        if let Err(e) = self.buffer.flush_sync() {
            tracing::warn!(error = %e, "sync trace flush failed while dropping session");
        }
    }
}
