//! The dismantled-instruction model consumed by the interpreter.
//!
//! Instructions arrive pre-decoded: the external dismantler resolves
//! constant-pool indices, branch offsets and `wide` prefixes, leaving this
//! crate a flat sequence of opcodes with named operands.

use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::method::{FieldRef, MethodRef};

/// One dismantled instruction of a method body.
#[derive(Clone, Debug, PartialEq)]
pub struct Instruction {
    /// The bytecode offset of the instruction.
    pub pc: u32,

    /// The opcode byte, one of the values in [`crate::method::opcode`].
    pub opcode: u8,

    /// The decoded operand, if the opcode takes one.
    pub operand: Operand,
}

impl Instruction {
    /// Creates an operand-less instruction at `pc`.
    #[must_use]
    pub fn bare(pc: u32, opcode: u8) -> Self {
        Self {
            pc,
            opcode,
            operand: Operand::None,
        }
    }

    /// Creates an instruction at `pc` with the provided `operand`.
    #[must_use]
    pub fn with_operand(pc: u32, opcode: u8, operand: Operand) -> Self {
        Self {
            pc,
            opcode,
            operand,
        }
    }
}

/// The decoded operand of an instruction.
///
/// The dismantler is responsible for widening: a `wide`-prefixed load,
/// store, `ret` or `iinc` is delivered as the base opcode with its 16-bit
/// register number already decoded into [`Operand::Register`] or
/// [`Operand::Iinc`].
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Operand {
    /// No operand.
    #[default]
    None,

    /// A local-variable register number.
    Register(u16),

    /// An integer immediate (`bipush`, `sipush`, `ldc` of an int, and the
    /// `newarray` element-type code).
    Int(i32),

    /// A long constant (`ldc2_w`).
    Long(i64),

    /// A float constant (`ldc`/`ldc_w`).
    Float(f32),

    /// A double constant (`ldc2_w`).
    Double(f64),

    /// A string constant (`ldc`/`ldc_w`).
    Str(Rc<str>),

    /// A class constant in slashed form (`ldc` of a class, `new`,
    /// `anewarray`, `checkcast`, `instanceof`).
    Class(String),

    /// A dynamically-computed constant: its name and field signature.
    DynamicConst { name: String, signature: String },

    /// A field reference (`get*`/`put*`).
    Field(Rc<FieldRef>),

    /// A method reference (`invoke{virtual,special,static,interface}`).
    Method(Rc<MethodRef>),

    /// A branch: the signed offset from the branch opcode and the resolved
    /// absolute target.
    Branch { offset: i32, target: u32 },

    /// A switch: the resolved default target and the resolved case targets.
    Switch { default: u32, targets: Vec<u32> },

    /// An `iinc`: the register and the signed increment.
    Iinc { register: u16, amount: i32 },

    /// A `multianewarray`: the array signature and dimension count.
    MultiArray { signature: String, dimensions: u8 },

    /// An `invokedynamic` call site: its name, its signature, and the first
    /// string argument of its bootstrap method, when that argument exists
    /// (the concatenation recipe for `makeConcatWithConstants`).
    Dynamic {
        name:          String,
        signature:     String,
        bootstrap_arg: Option<Rc<str>>,
    },
}

/// A guarded exception region of a method body.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ExceptionHandler {
    /// The first covered pc.
    pub start_pc: u32,

    /// The first pc past the covered range.
    pub end_pc: u32,

    /// The pc at which the handler starts.
    pub handler_pc: u32,

    /// The caught class in slashed form, or [`None`] for a catch-all
    /// (`finally`) handler.
    pub catch_type: Option<String>,
}

impl ExceptionHandler {
    /// Gets the signature of the value on the stack on entry to the
    /// handler.
    #[must_use]
    pub fn caught_signature(&self) -> String {
        self.catch_type.as_ref().map_or_else(
            || crate::constant::JAVA_LANG_THROWABLE.to_string(),
            |name| format!("L{name};"),
        )
    }
}

/// One entry of a method's local-variable table.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct LocalVariableSlot {
    /// The register the variable occupies.
    pub register: u16,

    /// The first pc at which the variable is live.
    pub start_pc: u32,

    /// The length in bytes of the live range.
    pub length: u32,

    /// The declared signature of the variable.
    pub signature: String,
}

impl LocalVariableSlot {
    /// Checks whether the slot is live at `pc`.
    #[must_use]
    pub fn covers(&self, pc: u32) -> bool {
        pc >= self.start_pc && pc < self.start_pc.saturating_add(self.length)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn catch_all_handlers_catch_throwable() {
        let handler = ExceptionHandler {
            start_pc:   0,
            end_pc:     8,
            handler_pc: 12,
            catch_type: None,
        };
        assert_eq!(handler.caught_signature(), "Ljava/lang/Throwable;");

        let typed = ExceptionHandler {
            catch_type: Some("java/io/IOException".into()),
            ..handler
        };
        assert_eq!(typed.caught_signature(), "Ljava/io/IOException;");
    }

    #[test]
    fn local_variable_liveness_is_half_open() {
        let slot = LocalVariableSlot {
            register:  1,
            start_pc:  4,
            length:    6,
            signature: "Ljava/lang/String;".into(),
        };
        assert!(!slot.covers(3));
        assert!(slot.covers(4));
        assert!(slot.covers(9));
        assert!(!slot.covers(10));
    }
}
