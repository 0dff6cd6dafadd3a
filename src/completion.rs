//! The result of evaluating any expression or statement. Every recursive
//! step in the evaluator must check for a non-`Normal` completion and
//! propagate it immediately rather than continuing to evaluate sibling
//! expressions.

use crate::activation::WeakActivationRef;
use crate::error::RuntimeError;
use crate::value::Value;

pub enum Completion {
    Normal(Value),
    RuntimeError(RuntimeError),
    /// A `^expr` inside a block unwinding toward the activation that was
    /// live when the block was created. Not itself an error: it is
    /// absorbed by the target activation's method call and converted back
    /// into a `Normal` completion there.
    NonLocalReturn { target: WeakActivationRef, value: Value },
}

impl Completion {
    pub fn is_normal(&self) -> bool {
        matches!(self, Completion::Normal(_))
    }

    pub fn into_result(self) -> Result<Value, Completion> {
        match self {
            Completion::Normal(v) => Ok(v),
            other => Err(other),
        }
    }
}

/// Shorthand for the common "evaluate, and if it's not Normal, return that
/// completion from the enclosing function" pattern.
macro_rules! propagate {
    ($completion:expr) => {
        match $completion {
            $crate::completion::Completion::Normal(v) => v,
            other => return other,
        }
    };
}

pub(crate) use propagate;
