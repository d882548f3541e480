//! Per-invocation call triples.
//!
//! A [`CallTriple`] gathers the enter, call and exit events sharing one
//! [`CallId`]. Any slot may be empty when a log was truncated or only
//! partially flushed.

use crate::error::CoreError;
use crate::event::{CallEvent, EnterEvent, ExitEvent, TraceEvent};
use crate::id::{CallId, FnId, Invocation};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallTriple {
    pub enter: Option<EnterEvent>,
    pub call: Option<CallEvent>,
    pub exit: Option<ExitEvent>,
}

impl CallTriple {
    /// Stores `event` in its slot, replacing any earlier event of the same kind.
    pub fn absorb(&mut self, event: TraceEvent) {
        match event {
            TraceEvent::Enter(e) => self.enter = Some(e),
            TraceEvent::Call(e) => self.call = Some(e),
            TraceEvent::Exit(e) => self.exit = Some(e),
        }
    }

    pub fn call_id(&self) -> Option<&CallId> {
        self.enter
            .as_ref()
            .map(|e| &e.call_id)
            .or_else(|| self.call.as_ref().map(|e| &e.call_id))
            .or_else(|| self.exit.as_ref().map(|e| &e.call_id))
    }

    pub fn fn_id(&self) -> Option<&FnId> {
        self.enter
            .as_ref()
            .map(|e| &e.fn_id)
            .or_else(|| self.call.as_ref().map(|e| &e.fn_id))
            .or_else(|| self.exit.as_ref().map(|e| &e.fn_id))
    }

    /// Nested invocations in call order; empty if no call event was recorded.
    pub fn children(&self) -> &[Invocation] {
        self.call
            .as_ref()
            .map(|c| c.child_invocations.as_slice())
            .unwrap_or(&[])
    }

    /// Checks the per-event invariants and that enter and exit env snapshots
    /// share one key set.
    pub fn validate(&self) -> Result<(), CoreError> {
        if let Some(enter) = &self.enter {
            enter.validate()?;
        }
        if let Some(exit) = &self.exit {
            exit.validate()?;
        }
        if let (Some(enter), Some(exit)) = (&self.enter, &self.exit) {
            let same_keys = enter.env.len() == exit.env.len()
                && enter.env.keys().all(|k| exit.env.contains_key(k));
            if !same_keys {
                return Err(CoreError::EnvKeySetMismatch {
                    call_id: enter.call_id.clone(),
                    enter: join_keys(enter.env.keys()),
                    exit: join_keys(exit.env.keys()),
                });
            }
        }
        Ok(())
    }

    /// Returns the enter event or an [`CoreError::IncompleteTriple`] error.
    pub fn require_enter(&self) -> Result<&EnterEvent, CoreError> {
        self.enter.as_ref().ok_or_else(|| CoreError::IncompleteTriple {
            call_id: self.call_id().cloned().unwrap_or_else(|| CallId::new("?")),
            missing: "enter",
        })
    }
}

fn join_keys<'a>(keys: impl Iterator<Item = &'a String>) -> String {
    keys.map(String::as_str).collect::<Vec<_>>().join(", ")
}
