//! This module contains the input data model for the analyzer: dismantled
//! method bodies and the descriptors they reference.
//!
//! Class-file parsing is explicitly not this crate's business. An external
//! dismantler (or the [`builder`] assembler, in tests) produces
//! [`MethodBody`] values; the analyzer only ever walks them.

pub mod builder;
pub mod instruction;
pub mod opcode;
pub mod signature;

use std::rc::Rc;

use serde::{Deserialize, Serialize};

pub use crate::method::{
    builder::BodyBuilder,
    instruction::{ExceptionHandler, Instruction, LocalVariableSlot, Operand},
    signature::MethodSignature,
};

/// A reference to a field, as resolved from the constant pool by the
/// dismantler.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct FieldRef {
    /// The declaring class in slashed form.
    pub class_name: String,

    /// The field name.
    pub name: String,

    /// The field signature.
    pub signature: String,

    /// Whether the field is declared `public`.
    ///
    /// Field summaries are only trusted for non-public fields, whose every
    /// write site is visible to the summary computation.
    pub is_public: bool,
}

impl FieldRef {
    /// Creates a new field reference behind an [`Rc`], the form in which
    /// references are shared between items.
    #[must_use]
    pub fn interned(
        class_name: impl Into<String>,
        name: impl Into<String>,
        signature: impl Into<String>,
        is_public: bool,
    ) -> Rc<Self> {
        Rc::new(Self {
            class_name: class_name.into(),
            name: name.into(),
            signature: signature.into(),
            is_public,
        })
    }
}

impl std::fmt::Display for FieldRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}:{}", self.class_name, self.name, self.signature)
    }
}

/// A reference to a method, as resolved from the constant pool by the
/// dismantler.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct MethodRef {
    /// The declaring class in slashed form.
    pub class_name: String,

    /// The method name, `<init>` for constructors.
    pub name: String,

    /// The method descriptor.
    pub signature: String,
}

impl MethodRef {
    /// Creates a new method reference behind an [`Rc`], the form in which
    /// references are shared between items.
    #[must_use]
    pub fn interned(
        class_name: impl Into<String>,
        name: impl Into<String>,
        signature: impl Into<String>,
    ) -> Rc<Self> {
        Rc::new(Self {
            class_name: class_name.into(),
            name: name.into(),
            signature: signature.into(),
        })
    }

    /// Gets the declaring class in dotted form.
    #[must_use]
    pub fn dotted_class_name(&self) -> String {
        self.class_name.replace('/', ".")
    }
}

impl std::fmt::Display for MethodRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}{}", self.class_name, self.name, self.signature)
    }
}

/// A fully dismantled method body, the unit of analysis.
#[derive(Clone, Debug, PartialEq)]
pub struct MethodBody {
    /// The declaring class in slashed form.
    pub class_name: String,

    /// The method name.
    pub name: String,

    /// The method descriptor.
    pub signature: String,

    /// Whether the method is static (and therefore has no `this`).
    pub is_static: bool,

    /// The instructions in ascending pc order.
    pub instructions: Vec<Instruction>,

    /// The length in bytes of the code array, one past the largest valid
    /// pc.
    pub code_length: u32,

    /// The exception table.
    pub exception_table: Vec<ExceptionHandler>,

    /// The local-variable table, when the class file carries one.
    pub local_variable_table: Vec<LocalVariableSlot>,
}

impl MethodBody {
    /// Gets a `class.name:signature` rendering for diagnostics.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        format!("{}.{}{}", self.class_name, self.name, self.signature)
    }

    /// Looks up the declared signature of `register` at `pc` in the
    /// local-variable table.
    ///
    /// Returns [`None`] when the table is absent or has no live slot for
    /// the register, in which case the caller falls back to
    /// `Ljava/lang/Object;`.
    #[must_use]
    pub fn local_variable_signature(&self, register: u16, pc: u32) -> Option<&str> {
        self.local_variable_table
            .iter()
            .find(|slot| slot.register == register && slot.covers(pc))
            .map(|slot| slot.signature.as_str())
    }

    /// Iterates over the exception handlers whose handler starts at `pc`.
    pub fn handlers_at(&self, pc: u32) -> impl Iterator<Item = &ExceptionHandler> {
        self.exception_table
            .iter()
            .filter(move |handler| handler.handler_pc == pc)
    }

    /// Gets the opcode of the instruction at index `idx`, if there is one.
    #[must_use]
    pub fn opcode_at_index(&self, idx: usize) -> Option<u8> {
        self.instructions.get(idx).map(|insn| insn.opcode)
    }
}
