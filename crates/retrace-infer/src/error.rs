//! Errors raised while parsing type descriptors.

use thiserror::Error;

/// A descriptor string that does not follow the structural type syntax.
///
/// Callers treat this as "leave the descriptor untouched"; it never aborts
/// narrowing of the surrounding signature.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptorError {
    #[error("unexpected '{found}' at offset {offset}, expected {expected}")]
    UnexpectedToken {
        offset: usize,
        found: String,
        expected: &'static str,
    },

    #[error("unexpected end of descriptor, expected {expected}")]
    UnexpectedEnd { expected: &'static str },

    #[error("unterminated string literal starting at offset {offset}")]
    UnterminatedString { offset: usize },

    #[error("empty descriptor")]
    Empty,
}
