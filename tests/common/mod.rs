//! Shared helpers for the integration tests.
#![allow(dead_code)] // Each test binary uses a different subset.

use std::collections::BTreeMap;

use opcode_stack_analyzer::{
    analyzer::{Analyzer, JumpInfo},
    context::{AnalysisContext, Config},
    method::MethodBody,
    value::Item,
};

/// The machine state observed after each instruction of the final pass.
pub struct Recorded {
    /// The operand stack (bottom first) after the instruction at each pc.
    pub stacks: BTreeMap<u32, Vec<Item>>,

    /// The local registers after the instruction at each pc.
    pub locals: BTreeMap<u32, Vec<Item>>,

    /// Whether each pc was unreachable by fall-through.
    pub top: BTreeMap<u32, bool>,

    /// The final jump-table snapshot.
    pub info: JumpInfo,
}

impl Recorded {
    /// Gets the top of stack after the instruction at `pc`.
    pub fn top_of_stack(&self, pc: u32) -> &Item {
        self.stacks[&pc].last().expect("stack was empty at pc")
    }

    /// Gets local `register` after the instruction at `pc`.
    pub fn local(&self, pc: u32, register: usize) -> &Item {
        &self.locals[&pc][register]
    }
}

/// Installs a log subscriber so that `OCSTACK_DEBUG` runs show the
/// analyzer's diagnostics in test output.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Analyzes `body` under `context` and records the state after every
/// instruction of the final pass.
pub fn record_with(body: &MethodBody, context: AnalysisContext) -> Recorded {
    init_tracing();
    let mut stacks = BTreeMap::new();
    let mut locals = BTreeMap::new();
    let mut top = BTreeMap::new();

    let mut analyzer = Analyzer::new(body, context);
    let info = analyzer.analyze_with(|instruction, state| {
        stacks.insert(instruction.pc, state.stack_items());
        locals.insert(
            instruction.pc,
            (0..state.local_count()).map(|r| state.local_at(r)).collect(),
        );
        top.insert(instruction.pc, state.is_top());
    });

    Recorded {
        stacks,
        locals,
        top,
        info,
    }
}

/// Analyzes `body` under the default configuration.
pub fn record(body: &MethodBody) -> Recorded {
    record_with(body, AnalysisContext::new(Config::default()))
}
