//! This library implements an abstract interpreter for JVM bytecode that
//! reconstructs, at every instruction of a method body, the types, known
//! constant values, provenance and semantic labels of every slot on the
//! operand stack and in the local-variable array. It is a _best effort_
//! analysis: malformed input degrades the state instead of failing.
//!
//! Note that this library is not intended to be nor expected to evolve into
//! a bytecode verifier; it happily processes code a real verifier would
//! reject.
//!
//! # How it Works
//!
//! From a very high level, a method is analysed as follows:
//!
//! 1. An external dismantler (or the [`method::BodyBuilder`] assembler)
//!    produces a [`method::MethodBody`]: a flat sequence of opcodes with
//!    their operands decoded.
//! 2. The [`analyzer::Analyzer`] drives the [`interpreter::Interpreter`]
//!    over the instructions in offset order. Branch opcodes record
//!    snapshots of the abstract state at their targets; before each opcode,
//!    recorded snapshots for the current offset are merged into the live
//!    state.
//! 3. For methods with back-edges the scan repeats until the snapshots
//!    stop changing (with a hard iteration cap), so loop-carried state is
//!    fully propagated.
//! 4. A final pass invokes a client-supplied observer after every
//!    instruction with read-only access to the [`value::Item`]s in the
//!    state, which is where bug detectors recognise their patterns.
//! 5. The resulting [`analyzer::JumpInfo`] snapshot can be persisted by an
//!    external analysis cache and used to seed later visits of the same
//!    method.
//!
//! # Basic Usage
//!
//! ```
//! use opcode_stack_analyzer::{
//!     analyzer::Analyzer,
//!     context::{AnalysisContext, Config},
//!     method::{opcode, BodyBuilder},
//! };
//!
//! // static void run() { "ab".length(); }
//! let mut builder = BodyBuilder::new("com/example/Demo", "run", "()V");
//! let body = builder
//!     .static_method()
//!     .ldc_str("ab")
//!     .invoke(opcode::INVOKEVIRTUAL, "java/lang/String", "length", "()I")
//!     .op(opcode::POP)
//!     .op(opcode::RETURN)
//!     .build()
//!     .unwrap();
//!
//! let mut analyzer = Analyzer::new(&body, AnalysisContext::new(Config::default()));
//! let mut length_constant = None;
//! analyzer.analyze_with(|instruction, state| {
//!     if instruction.opcode == opcode::INVOKEVIRTUAL {
//!         length_constant = state.item_at(0).constant().and_then(|c| c.as_i32());
//!     }
//! });
//!
//! // The call folded to the constant length of the string literal.
//! assert_eq!(length_constant, Some(2));
//! ```

#![warn(clippy::all, clippy::cargo, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)] // Allows for better API naming

pub mod analyzer;
pub mod constant;
pub mod context;
pub mod error;
pub mod interpreter;
pub mod method;
pub mod value;

// Re-exports to provide the library interface.
pub use analyzer::{Analyzer, JumpInfo};
pub use context::{AnalysisContext, Config};
