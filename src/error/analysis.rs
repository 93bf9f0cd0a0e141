//! This module contains errors pertaining to the abstract interpretation of
//! a method body.

use thiserror::Error;

use crate::error::container;

/// Errors that occur while the interpreter executes a method body.
///
/// None of these are fatal to an enclosing analysis: the driver responds to
/// an interpretation error by clearing the abstract state, marking the
/// current program point unreachable, and resynchronising on the next
/// instruction.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum Error {
    #[error("A stack item at depth {depth:?} was requested but the stack holds {available:?}")]
    StackUnderflow { depth: usize, available: usize },

    #[error("Opcode 0x{opcode:02x} ({name}) is not supported")]
    UnsupportedOpcode { opcode: u8, name: &'static str },

    #[error("Opcode 0x{opcode:02x} ({name}) is missing its {expected} operand")]
    MalformedOperand {
        opcode:   u8,
        name:     &'static str,
        expected: &'static str,
    },

    #[error("Jump table construction did not converge after {iterations} iterations")]
    NonConvergence { iterations: usize },

    #[error("Class {name} was not found in the repository")]
    ClassNotFound { name: String },
}

/// An analysis error with an associated offset in the method body.
pub type LocatedError = container::Located<Error>;

/// A container of analysis errors used for aggregation during a scan.
pub type Errors = container::Errors<LocatedError>;

/// The result type for methods that may fail during interpretation.
pub type Result<T> = std::result::Result<T, LocatedError>;

/// Make it possible to attach offsets to these errors.
impl container::Locatable for Error {
    type Located = LocatedError;

    fn locate(self, pc: u32) -> Self::Located {
        container::Located {
            location: pc,
            payload:  self,
        }
    }
}
