//! Stable identity newtypes for traced invocations.
//!
//! A [`FnId`] names a traced source function and is produced by the
//! instrumenter; a [`CallId`] names one dynamic invocation within a recording
//! session. Both are distinct newtype wrappers over `String` so that one
//! cannot be used where the other is expected.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Declaring-type segment meaning "free function".
pub const NO_DECLARING_TYPE: &str = "-";

/// Simple name the instrumenter gives to constructors.
pub const CONSTRUCTOR_NAME: &str = "constructor";

/// Stable function identity, opaque outside of [`FnIdParts`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FnId(pub String);

/// Identity of a single dynamic invocation within one recording session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(pub String);

/// Host-supplied identity of a receiver object.
///
/// The recorder uses it to link a constructor invocation to later method
/// calls on the object it produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReceiverId(pub u64);

/// One `{fnId, callId}` pair, as listed in a call event's children.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invocation {
    pub fn_id: FnId,
    pub call_id: CallId,
}

/// What kind of callable an invocation entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FnKind {
    Function,
    Method,
    Constructor,
}

impl FnId {
    pub fn new(raw: impl Into<String>) -> Self {
        FnId(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Splits this id into its structural parts.
    pub fn parts(&self) -> Result<FnIdParts, CoreError> {
        FnIdParts::parse(&self.0)
    }
}

impl CallId {
    pub fn new(raw: impl Into<String>) -> Self {
        CallId(raw.into())
    }

    /// Builds the id for the `n`th invocation of a session.
    pub fn from_counter(n: u64) -> Self {
        CallId(n.to_string())
    }

    /// The session counter this id was built from, if it is numeric.
    pub fn counter(&self) -> Option<u64> {
        self.0.parse().ok()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Invocation {
    pub fn new(fn_id: FnId, call_id: CallId) -> Self {
        Invocation { fn_id, call_id }
    }
}

impl fmt::Display for FnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for ReceiverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.fn_id, self.call_id)
    }
}

/// Structural view of a fnId: `<path>#<DeclaringType|->#<name>#<position>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FnIdParts {
    pub file: String,
    /// `None` for free functions.
    pub declaring_type: Option<String>,
    pub name: String,
    /// Source position (`L<line>C<col>`), empty if the id carried none.
    pub position: String,
}

impl FnIdParts {
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        let mut segments = raw.split('#');
        let (Some(file), Some(declaring), Some(name)) =
            (segments.next(), segments.next(), segments.next())
        else {
            return Err(CoreError::MalformedFnId {
                fn_id: raw.to_string(),
            });
        };
        if declaring.is_empty() || name.is_empty() {
            return Err(CoreError::MalformedFnId {
                fn_id: raw.to_string(),
            });
        }
        let position = segments.collect::<Vec<_>>().join("#");

        Ok(FnIdParts {
            file: file.to_string(),
            declaring_type: (declaring != NO_DECLARING_TYPE).then(|| declaring.to_string()),
            name: name.to_string(),
            position,
        })
    }

    pub fn is_free_function(&self) -> bool {
        self.declaring_type.is_none()
    }

    pub fn is_constructor(&self) -> bool {
        self.declaring_type.is_some() && self.name == CONSTRUCTOR_NAME
    }

    /// Infers the callable kind from the id alone.
    pub fn kind(&self) -> FnKind {
        if self.is_free_function() {
            FnKind::Function
        } else if self.is_constructor() {
            FnKind::Constructor
        } else {
            FnKind::Method
        }
    }
}

/// Replaces every character outside `[A-Za-z0-9._-]` with `_`.
pub fn sanitize_segment(segment: &str) -> String {
    segment
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}
