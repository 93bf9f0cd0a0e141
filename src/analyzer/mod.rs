//! This module contains the analysis driver: it runs the abstract machine
//! over a method body until the jump tables stop changing, then makes a
//! final pass during which client detectors observe the state after every
//! instruction.
//!
//! # Iteration
//!
//! A method without back-edges needs a single pass: state only ever flows
//! forward, and every join point has seen all its predecessors by the time
//! it is reached. A loop feeds state backwards, so the driver re-scans the
//! method until no backwards branch changes a recorded snapshot, with a
//! hard cap to bound pathological bytecode. Discovering a previously
//! unseen branch target resets the countdown, since the new target's
//! snapshot has not had a chance to stabilise yet.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    constant::{MAXIMUM_ITERATIONS, SLOW_CONVERGENCE_THRESHOLD},
    context::AnalysisContext,
    interpreter::Interpreter,
    method::{Instruction, MethodBody},
    value::Item,
};

/// A snapshot of the state known to flow into each branch target.
///
/// The snapshot taken after the last iteration is stable, and a client
/// analysis cache can persist it: a later visit of the same method seeded
/// through [`Analyzer::with_jump_info`] converges immediately.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct JumpInfo {
    /// The local-variable snapshot per branch target.
    pub jump_entries: BTreeMap<u32, Vec<Option<Item>>>,

    /// The operand-stack snapshot per branch target reached with a
    /// non-empty stack.
    pub jump_stack_entries: BTreeMap<u32, Vec<Item>>,

    /// Every known branch target.
    pub jump_entry_locations: BTreeSet<u32>,
}

impl JumpInfo {
    /// Gets the first branch target at or after `pc`.
    #[must_use]
    pub fn next_jump(&self, pc: u32) -> Option<u32> {
        self.jump_entry_locations.range(pc..).next().copied()
    }

    /// Checks whether no branch target was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.jump_entry_locations.is_empty()
    }
}

/// The per-method analysis driver.
pub struct Analyzer<'a> {
    body: &'a MethodBody,
    interpreter: Interpreter<'a>,
    iterative: bool,
    seeded: Option<JumpInfo>,
}

impl<'a> Analyzer<'a> {
    /// Creates an analyzer for `body` under the provided `context`.
    #[must_use]
    pub fn new(body: &'a MethodBody, context: AnalysisContext) -> Self {
        let iterative = context.config.iterative;
        let interpreter = Interpreter::new(body, context);
        Self {
            body,
            interpreter,
            iterative,
            seeded: None,
        }
    }

    /// Seeds the analysis with previously computed jump information.
    ///
    /// In iterative mode this is an optimisation; in single-pass mode it is
    /// the only source of join-point state, and is expected to come from
    /// the class file's stack-map attribute.
    #[must_use]
    pub fn with_jump_info(mut self, info: JumpInfo) -> Self {
        self.seeded = Some(info);
        self
    }

    /// Runs the analysis to completion without a detector.
    pub fn analyze(&mut self) -> JumpInfo {
        self.analyze_with(|_, _| {})
    }

    /// Runs the analysis to completion, then makes one more pass in which
    /// `observer` is called after every instruction with read-only access
    /// to the machine state.
    pub fn analyze_with<F>(&mut self, mut observer: F) -> JumpInfo
    where
        F: FnMut(&Instruction, &Interpreter<'a>),
    {
        self.interpreter.reset_for_method_entry();
        if let Some(seed) = &self.seeded {
            self.interpreter.learn_from(seed);
        }

        if self.iterative {
            let mut iteration = 1usize;
            loop {
                self.scan(&mut |_, _| {});
                if self.interpreter.jump_info_changed_by_new_target() {
                    iteration = 1;
                }
                iteration += 1;
                if iteration > MAXIMUM_ITERATIONS {
                    warn!(
                        method = %self.body.qualified_name(),
                        iterations = iteration,
                        code_length = self.body.code_length,
                        "jump tables did not converge, using the last snapshots"
                    );
                    break;
                }
                if !(self.interpreter.jump_info_changed_by_backwards_branch()
                    && self.interpreter.has_backwards_branch())
                {
                    break;
                }
            }
            if (SLOW_CONVERGENCE_THRESHOLD..=MAXIMUM_ITERATIONS).contains(&iteration) {
                info!(
                    method = %self.body.qualified_name(),
                    iterations = iteration,
                    "jump tables converged slowly"
                );
            }
        }

        self.scan(&mut observer);
        self.interpreter.jump_info()
    }

    /// Gets the machine, positioned after whatever was last executed.
    #[must_use]
    pub fn interpreter(&self) -> &Interpreter<'a> {
        &self.interpreter
    }

    fn scan(&mut self, observer: &mut dyn FnMut(&Instruction, &Interpreter<'a>)) {
        self.interpreter.reset_pass();
        for index in 0..self.body.instructions.len() {
            self.interpreter.saw_instruction(index);
            observer(&self.body.instructions[index], &self.interpreter);
        }
    }
}

#[cfg(test)]
mod test {
    use super::JumpInfo;

    #[test]
    fn next_jump_scans_forward() {
        let mut info = JumpInfo::default();
        info.jump_entry_locations.insert(8);
        info.jump_entry_locations.insert(20);
        assert_eq!(info.next_jump(0), Some(8));
        assert_eq!(info.next_jump(8), Some(8));
        assert_eq!(info.next_jump(9), Some(20));
        assert_eq!(info.next_jump(21), None);
    }

    #[test]
    fn jump_info_round_trips_through_serde() {
        let mut info = JumpInfo::default();
        info.jump_entry_locations.insert(4);
        info.jump_entries
            .insert(4, vec![Some(crate::value::Item::with_constant("I", 1)), None]);
        let encoded = serde_json::to_string(&info).expect("serializes");
        let decoded: JumpInfo = serde_json::from_str(&encoded).expect("deserializes");
        assert_eq!(info, decoded);
    }
}
