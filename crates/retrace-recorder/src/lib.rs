//! Runtime call tracking and durable event logging.
//!
//! A [`RecorderSession`] lives inside the instrumented program. The
//! instrumenter's generated code calls [`RecorderSession::enter`] and
//! [`RecorderSession::exit`] around every traced body; the session keeps the
//! live call stack, attributes completed invocations to their parents, and
//! buffers the resulting events until they are appended to the trace
//! directory.
//!
//! # Modules
//!
//! - [`config`] -- Runtime configuration read from the environment
//! - [`error`] -- RecorderError covering I/O and stack-discipline failures
//! - [`writer`] -- Per-destination event buffers and the two flush paths
//! - [`session`] -- Call-stack tracking and the shutdown contract

pub mod config;
pub mod error;
pub mod session;
pub mod writer;

pub use config::RecorderConfig;
pub use error::RecorderError;
pub use session::{EnterCall, ExitCall, RecorderSession};
pub use writer::EventBuffer;
