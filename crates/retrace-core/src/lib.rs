pub mod error;
pub mod event;
pub mod id;
pub mod triple;
pub mod value;

// Re-export commonly used types
pub use error::CoreError;
pub use event::{CallEvent, EnterEvent, ExitEvent, Outcome, OutcomeTypes, TraceEvent};
pub use id::{sanitize_segment, CallId, FnId, FnIdParts, FnKind, Invocation, ReceiverId};
pub use triple::CallTriple;
pub use value::TraceValue;
