//! This module contains the abstract machine: the paired operand stack and
//! local-variable array, the jump-entry tables that carry state across
//! control-flow edges, and the per-opcode transfer function.
//!
//! The machine is driven one instruction at a time by the
//! [`crate::analyzer::Analyzer`]. Before each opcode it folds any recorded
//! jump snapshot for the current offset into the live state; after a branch
//! opcode it records an outgoing snapshot at the branch target. Nothing
//! here is path sensitive: a join point sees the pointwise merge of every
//! state that can reach it.

mod arithmetic;
mod invoke;
pub mod locals;
pub mod stack;
mod transfer;

use std::collections::{BTreeMap, BTreeSet};

use itertools::Itertools;
use tracing::{debug, error, trace};

use crate::{
    analyzer::JumpInfo,
    constant::NO_REGISTER,
    context::AnalysisContext,
    error::analysis::Result,
    interpreter::{locals::Locals, stack::Stack},
    method::{opcode, signature::MethodSignature, Instruction, MethodBody},
    value::{Item, SpecialKind},
};

/// The abstract machine for one method body.
///
/// The lifetime of the machine is one method visit: the analyzer resets it
/// on entry, drives it through the instructions (possibly several times,
/// when iterating to a fixed point), and reads the per-pc state out through
/// the accessors while detectors observe.
#[derive(Debug)]
pub struct Interpreter<'a> {
    body: &'a MethodBody,
    context: AnalysisContext,

    stack: Stack,
    locals: Locals,

    /// Whether the current program point is unreachable by fall-through.
    top: bool,

    /// Whether any program point in the current pass turned out to be
    /// unreachable.
    encountered_top: bool,

    /// Whether the current pass saw a branch whose target precedes it.
    backwards_branch: bool,

    /// Whether any transfer of control was seen in the current pass.
    seen_transfer_of_control: bool,

    /// Whether the previous instruction unconditionally left this program
    /// point, so the next one is reachable only through a recorded jump or
    /// an exception edge.
    reach_only_by_branch: bool,

    /// The offsets of exception handlers in this body.
    exception_handlers: BTreeSet<u32>,

    /// Recorded local snapshots per branch target.
    jump_entries: BTreeMap<u32, Vec<Option<Item>>>,

    /// Recorded stack snapshots per branch target, for targets reached with
    /// a non-empty stack.
    jump_stack_entries: BTreeMap<u32, Vec<Item>>,

    /// The set of known branch targets.
    jump_entry_locations: BTreeSet<u32>,

    jump_info_changed_by_backwards_branch: bool,
    jump_info_changed_by_new_target: bool,

    /// State machines recognising `iconst_1; goto +4; iconst_0` (and its
    /// mirror image) so the materialised boolean collapses into a single
    /// could-be-zero int.
    convert_jump_to_one_zero_state: u8,
    convert_jump_to_zero_one_state: u8,

    /// The pc at which a pending nullness-idiom rewrite replaces the top of
    /// stack.
    zero_one_coming: Option<u32>,
    one_means_null: bool,

    /// A register just proven non-negative by an `iflt`/`ifle`; its mirrors
    /// are re-tagged before the next instruction executes.
    register_tested_found_to_be_nonnegative: i32,

    /// The index into `body.instructions` of the instruction currently (or
    /// most recently) being executed.
    current_index: usize,
}

impl<'a> Interpreter<'a> {
    /// Creates a machine for `body`, ready for [`Self::reset_for_method_entry`].
    #[must_use]
    pub fn new(body: &'a MethodBody, context: AnalysisContext) -> Self {
        Self {
            body,
            context,
            stack: Stack::new(),
            locals: Locals::new(),
            top: false,
            encountered_top: false,
            backwards_branch: false,
            seen_transfer_of_control: false,
            reach_only_by_branch: false,
            exception_handlers: BTreeSet::new(),
            jump_entries: BTreeMap::new(),
            jump_stack_entries: BTreeMap::new(),
            jump_entry_locations: BTreeSet::new(),
            jump_info_changed_by_backwards_branch: false,
            jump_info_changed_by_new_target: false,
            convert_jump_to_one_zero_state: 0,
            convert_jump_to_zero_one_state: 0,
            zero_one_coming: None,
            one_means_null: false,
            register_tested_found_to_be_nonnegative: NO_REGISTER,
            current_index: 0,
        }
    }

    /// Resets everything, including the accumulated jump tables, and seeds
    /// the locals for method entry.
    pub fn reset_for_method_entry(&mut self) {
        self.jump_entries.clear();
        self.jump_stack_entries.clear();
        self.jump_entry_locations.clear();
        self.reset_pass();
    }

    /// Resets the per-pass state while keeping the jump tables, so a
    /// further iteration can refine them.
    pub fn reset_pass(&mut self) {
        self.stack.clear();
        self.locals.clear();
        self.top = false;
        self.encountered_top = false;
        self.backwards_branch = false;
        self.seen_transfer_of_control = false;
        self.reach_only_by_branch = false;
        self.jump_info_changed_by_backwards_branch = false;
        self.jump_info_changed_by_new_target = false;
        self.convert_jump_to_one_zero_state = 0;
        self.convert_jump_to_zero_one_state = 0;
        self.zero_one_coming = None;
        self.register_tested_found_to_be_nonnegative = NO_REGISTER;
        self.current_index = 0;

        self.exception_handlers = self
            .body
            .exception_table
            .iter()
            .map(|handler| handler.handler_pc)
            .collect();

        let body = self.body;
        let mut register = 0;
        if !body.is_static {
            let this = Item::initial_argument(format!("L{};", body.class_name), register);
            self.locals.set(register as usize, this);
            register += 1;
        }
        for argument in MethodSignature::new(&body.signature).arguments() {
            let item = Item::initial_argument(argument, register);
            let size = item.size() as i32;
            self.locals.set(register as usize, item);
            register += size;
        }
    }

    /// Pre-seeds the jump tables from a previously computed snapshot, as
    /// handed back by an analysis cache or derived from the class file's
    /// stack-map attribute.
    pub fn learn_from(&mut self, info: &JumpInfo) {
        self.jump_entries = info.jump_entries.clone();
        self.jump_stack_entries = info.jump_stack_entries.clone();
        self.jump_entry_locations = info.jump_entry_locations.clone();
    }

    /// Executes the instruction at `index` in the body, applying the
    /// pre-instruction bookkeeping and recovering from any interpretation
    /// error by degrading to an unreachable state.
    pub fn saw_instruction(&mut self, index: usize) {
        self.current_index = index;
        let instruction = &self.body.instructions[index];

        if opcode::is_register_store(instruction.opcode) {
            if let Some(register) = register_operand(instruction) {
                self.locals.record_update(register as usize, instruction.pc);
            }
        }

        self.precomputation(instruction.pc);

        if self.top {
            self.encountered_top = true;
            return;
        }

        if let Err(located) = self.execute(index) {
            error!(
                pc = instruction.pc,
                opcode = opcode::name(instruction.opcode),
                method = %self.body.qualified_name(),
                error = %located,
                "error processing opcode, clearing state"
            );
            self.stack.clear();
            self.locals.clear();
            self.top = true;
        }

        if self.context.config.debug {
            trace!(
                pc = instruction.pc,
                opcode = opcode::name(instruction.opcode),
                state = %self,
                "after opcode"
            );
        }
    }

    /// Applies the pre-instruction bookkeeping for `pc`: promotes mirrors
    /// of a register just proven non-negative, then folds any recorded
    /// snapshot for the offset into the live state.
    pub fn precomputation(&mut self, pc: u32) {
        if self.register_tested_found_to_be_nonnegative >= 0 {
            let register = self.register_tested_found_to_be_nonnegative;
            for item in self.stack.iter_mut() {
                if item.register_number() == register {
                    *item = item.clone_with_kind(SpecialKind::NON_NEGATIVE);
                }
            }
            for item in self.locals.iter_mut() {
                if item.register_number() == register {
                    *item = item.clone_with_kind(SpecialKind::NON_NEGATIVE);
                }
            }
        }
        self.register_tested_found_to_be_nonnegative = NO_REGISTER;
        self.merge_jumps(pc);
    }

    /// Folds the recorded control-flow information for `pc` into the live
    /// state.
    fn merge_jumps(&mut self, pc: u32) {
        // A pending nullness-idiom rewrite replaces the just-materialised
        // constant wholesale and skips the snapshot merge for this offset.
        if self.zero_one_coming == Some(pc) {
            let _ = self.stack.pop(pc);
            self.top = false;
            let mut item = Item::typed("I");
            item.set_special_kind(if self.one_means_null {
                SpecialKind::NONZERO_MEANS_NULL
            } else {
                SpecialKind::ZERO_MEANS_NULL
            });
            item.set_pc(pc as i32 - 8);
            item.set_could_be_zero(true);
            self.stack.push(item);
            self.zero_one_coming = None;
            debug!(pc, "collapsed nullness idiom");
            return;
        }

        let mut stack_updated = false;
        if !self.top
            && (self.convert_jump_to_one_zero_state == 3
                || self.convert_jump_to_zero_one_state == 3)
        {
            let _ = self.stack.pop(pc);
            let mut item = Item::typed("I");
            item.set_could_be_zero(true);
            self.stack.push(item);
            self.convert_jump_to_one_zero_state = 0;
            self.convert_jump_to_zero_one_state = 0;
            stack_updated = true;
        }

        let jump_entry = if self.jump_entry_locations.contains(&pc) {
            self.jump_entries.get(&pc).cloned()
        } else {
            None
        };

        if let Some(jump_entry) = jump_entry {
            let was_reach_only_by_branch = self.reach_only_by_branch;
            self.reach_only_by_branch = false;
            let jump_stack_entry = self.jump_stack_entries.get(&pc).cloned();

            if self.top {
                self.locals.set_values(jump_entry);
                match jump_stack_entry {
                    Some(snapshot) => self.stack.set_items(snapshot),
                    None => self.stack.clear(),
                }
                self.top = false;
                return;
            }
            if was_reach_only_by_branch {
                self.top = false;
                self.locals.set_values(jump_entry);
                if !stack_updated {
                    match jump_stack_entry {
                        Some(snapshot) => self.stack.set_items(snapshot),
                        None => self.stack.clear(),
                    }
                }
            } else {
                self.top = false;
                merge_local_lists(self.locals.values_mut(), &jump_entry);
                if !stack_updated {
                    if let Some(snapshot) = jump_stack_entry {
                        merge_item_lists(self.stack.items_mut(), &snapshot);
                    }
                }
            }
        } else if self.reach_only_by_branch && !stack_updated {
            self.stack.clear();

            let mut caught: Option<Item> = None;
            if self.exception_handlers.contains(&pc) {
                for handler in self.body.handlers_at(pc) {
                    let item = Item::typed(handler.caught_signature());
                    caught = Some(match caught {
                        Some(existing) => Item::merge(&existing, &item),
                        None => item,
                    });
                }
            }

            if let Some(item) = caught {
                self.stack.push(item);
                self.reach_only_by_branch = false;
                self.top = false;
            } else {
                self.top = true;
            }
        }
    }

    /// Records the state flowing along the branch edge `from` → `target`,
    /// merging with any snapshot already recorded there.
    pub(crate) fn add_jump_value(&mut self, from: u32, target: u32) {
        if from >= target {
            self.backwards_branch = true;
        }
        match self.jump_entries.get_mut(&target) {
            None => {
                if from >= target {
                    self.jump_info_changed_by_backwards_branch = true;
                }
                self.jump_info_changed_by_new_target = true;
                self.jump_entries
                    .insert(target, self.locals.values().to_vec());
                self.jump_entry_locations.insert(target);
                if !self.stack.is_empty() {
                    self.jump_stack_entries
                        .insert(target, self.stack.items().to_vec());
                }
            }
            Some(at_target) => {
                if merge_local_lists(at_target, self.locals.values()) && from >= target {
                    self.jump_info_changed_by_backwards_branch = true;
                }
                if !self.stack.is_empty() {
                    if let Some(stack_at_target) = self.jump_stack_entries.get_mut(&target) {
                        if merge_item_lists(stack_at_target, self.stack.items())
                            && from >= target
                        {
                            self.jump_info_changed_by_backwards_branch = true;
                        }
                    }
                }
            }
        }
    }

    /// Steps the two tiny state machines that recognise a materialised
    /// boolean (`iconst_1; goto +4; iconst_0` and its mirror image), and
    /// the `goto` lookahead for the nullness idiom.
    pub(crate) fn track_idioms(&mut self, instruction: &Instruction) {
        if instruction.opcode == opcode::GOTO {
            self.detect_nullness_idiom(instruction);
        }

        let branch_offset = branch_offset_of(instruction);

        self.convert_jump_to_one_zero_state = match instruction.opcode {
            opcode::ICONST_1 => 1,
            opcode::GOTO if self.convert_jump_to_one_zero_state == 1 && branch_offset == Some(4) => {
                2
            }
            opcode::ICONST_0 if self.convert_jump_to_one_zero_state == 2 => 3,
            _ => 0,
        };
        self.convert_jump_to_zero_one_state = match instruction.opcode {
            opcode::ICONST_0 => 1,
            opcode::GOTO if self.convert_jump_to_zero_one_state == 1 && branch_offset == Some(4) => {
                2
            }
            opcode::ICONST_1 if self.convert_jump_to_zero_one_state == 2 => 3,
            _ => 0,
        };
    }

    /// At a `goto`, checks for the `ifnull/ifnonnull; iconst; goto; iconst`
    /// idiom and schedules the rewrite of the upcoming constant into a
    /// boolean-nullness value.
    fn detect_nullness_idiom(&mut self, instruction: &Instruction) {
        let next_pc = instruction.pc + 3;
        if next_pc >= self.body.code_length {
            return;
        }
        let Some(previous) = self.opcode_before(1) else {
            return;
        };
        let Some(before_previous) = self.opcode_before(2) else {
            return;
        };
        let Some(next) = self.opcode_at_pc(next_pc) else {
            return;
        };

        if matches!(previous, opcode::ICONST_0 | opcode::ICONST_1)
            && matches!(before_previous, opcode::IFNULL | opcode::IFNONNULL)
            && matches!(next, opcode::ICONST_0 | opcode::ICONST_1)
            && previous != next
        {
            let mut one_means_null = previous == opcode::ICONST_0;
            if before_previous != opcode::IFNULL {
                one_means_null = !one_means_null;
            }
            self.one_means_null = one_means_null;
            self.zero_one_coming = Some(next_pc + 1);
            self.convert_jump_to_one_zero_state = 0;
            self.convert_jump_to_zero_one_state = 0;
        }
    }

    /// Gets the opcode `distance` instructions before the current one in
    /// scan order.
    fn opcode_before(&self, distance: usize) -> Option<u8> {
        self.current_index
            .checked_sub(distance)
            .and_then(|index| self.body.opcode_at_index(index))
    }

    /// Gets the opcode of the instruction starting exactly at `pc`.
    fn opcode_at_pc(&self, pc: u32) -> Option<u8> {
        self.body
            .instructions
            .binary_search_by_key(&pc, |insn| insn.pc)
            .ok()
            .and_then(|index| self.body.opcode_at_index(index))
    }

    /// Erases field provenance for `field` from every live item: a store
    /// to the field means values previously loaded from it may be stale.
    pub(crate) fn erase_knowledge_of(&mut self, field: &crate::method::FieldRef) {
        for item in self.stack.iter_mut() {
            if item.field().is_some_and(|f| f.as_ref() == field) {
                item.set_loaded_from_field(None, NO_REGISTER);
            }
        }
        for item in self.locals.iter_mut() {
            if item.field().is_some_and(|f| f.as_ref() == field) {
                item.set_loaded_from_field(None, NO_REGISTER);
            }
        }
    }

    // --- state accessors -------------------------------------------------

    /// Gets the current operand-stack depth.
    #[must_use]
    pub fn stack_depth(&self) -> usize {
        self.stack.depth()
    }

    /// Gets the stack item at `offset` from the top (0 is the top).
    ///
    /// Reading past the bottom yields a logged placeholder item rather than
    /// an error.
    #[must_use]
    pub fn item_at(&self, offset: usize) -> Item {
        self.stack.peek(offset)
    }

    /// Gets the value of local `register`.
    #[must_use]
    pub fn local_at(&self, register: usize) -> Item {
        self.locals.get(register)
    }

    /// Gets the number of registers the local file currently extends to.
    #[must_use]
    pub fn local_count(&self) -> usize {
        self.locals.len()
    }

    /// Gets a copy of the whole stack, bottom first.
    #[must_use]
    pub fn stack_items(&self) -> Vec<Item> {
        self.stack.items().to_vec()
    }

    /// Checks whether the current program point is unreachable by
    /// fall-through.
    #[must_use]
    pub fn is_top(&self) -> bool {
        self.top
    }

    /// Checks whether `pc` is a known branch target.
    #[must_use]
    pub fn is_jump_target(&self, pc: u32) -> bool {
        self.jump_entry_locations.contains(&pc)
    }

    /// Checks whether `pc` is the start of an exception handler.
    #[must_use]
    pub fn is_exception_handler(&self, pc: u32) -> bool {
        self.exception_handlers.contains(&pc)
    }

    /// Checks whether `pc` has an incoming branch with a recorded snapshot.
    #[must_use]
    pub fn has_incoming_branches(&self, pc: u32) -> bool {
        self.jump_entry_locations.contains(&pc) && self.jump_entries.contains_key(&pc)
    }

    /// Gets the pc of the most recent store to `register`.
    #[must_use]
    pub fn last_update(&self, register: usize) -> u32 {
        self.locals.last_update(register)
    }

    /// Gets the number of registers with recorded stores.
    #[must_use]
    pub fn last_update_count(&self) -> usize {
        self.locals.update_count()
    }

    /// For a method-call instruction, gets the item the method is invoked
    /// on (the receiver below the arguments).
    #[must_use]
    pub fn item_method_invoked_on(&self, instruction: &Instruction) -> Option<Item> {
        match instruction.opcode {
            opcode::INVOKEVIRTUAL | opcode::INVOKEINTERFACE | opcode::INVOKESPECIAL => {
                let method = match &instruction.operand {
                    crate::method::Operand::Method(method) => method,
                    _ => return None,
                };
                let arguments = MethodSignature::new(&method.signature).argument_count();
                Some(self.stack.peek(arguments))
            }
            _ => None,
        }
    }

    /// Checks whether any pass over this method saw an unreachable point.
    #[must_use]
    pub fn encountered_top(&self) -> bool {
        self.encountered_top
    }

    /// Checks whether the current pass saw a backwards branch.
    #[must_use]
    pub fn has_backwards_branch(&self) -> bool {
        self.backwards_branch
    }

    pub(crate) fn jump_info_changed_by_backwards_branch(&self) -> bool {
        self.jump_info_changed_by_backwards_branch
    }

    pub(crate) fn jump_info_changed_by_new_target(&self) -> bool {
        self.jump_info_changed_by_new_target
    }

    /// Takes a serialisable snapshot of the accumulated jump tables.
    #[must_use]
    pub fn jump_info(&self) -> JumpInfo {
        JumpInfo {
            jump_entries: self.jump_entries.clone(),
            jump_stack_entries: self.jump_stack_entries.clone(),
            jump_entry_locations: self.jump_entry_locations.clone(),
        }
    }

    pub(crate) fn body(&self) -> &MethodBody {
        self.body
    }

    pub(crate) fn context(&self) -> &AnalysisContext {
        &self.context
    }

    pub(crate) fn stack_mut(&mut self) -> &mut Stack {
        &mut self.stack
    }

    /// Pushes a value of `signature` produced at `pc`, unless the
    /// signature is `V`.
    pub(crate) fn push_by_signature(&mut self, signature: &str, pc: u32) {
        if signature == "V" {
            return;
        }
        let mut item = Item::typed(signature);
        item.set_pc(pc as i32);
        self.stack.push(item);
    }

    /// Pushes a value read from local `register` with the provided static
    /// `signature`.
    pub(crate) fn push_by_local_load(&mut self, signature: &str, register: usize) {
        let old = self.locals.get(register);

        let mut item = old;
        if item.signature() == crate::constant::JAVA_LANG_OBJECT
            && signature != crate::constant::JAVA_LANG_OBJECT
        {
            item = Item::retyped(&item, signature);
        }
        if item.register_number() < 0 {
            item.set_register_number(register as i32);
        }
        self.stack.push(item);
    }

    /// Pops the top of stack into local `register`, invalidating any other
    /// item that still claims to mirror the register.
    pub(crate) fn push_by_local_store(&mut self, register: usize, pc: u32) -> Result<()> {
        let mut item = self.stack.pop(pc)?;
        if item.register_number() != register as i32 {
            clear_register_load(&mut self.stack, &mut self.locals, register as i32);
        }
        if item.register_number() == NO_REGISTER {
            item.set_register_number(register as i32);
        }
        self.set_local(register, item);
        Ok(())
    }

    /// Writes `value` into local `register`. Outside iterative mode, a
    /// store after a transfer of control merges with the previous binding,
    /// approximating the join the missing iteration would have computed.
    pub(crate) fn set_local(&mut self, register: usize, value: Item) {
        let value = if !self.context.config.iterative && self.seen_transfer_of_control {
            match self.locals.get_ref(register) {
                Some(existing) => Item::merge(&value, existing),
                None => value,
            }
        } else {
            value
        };
        self.locals.set(register, value);
    }

    pub(crate) fn set_top(&mut self, top: bool) {
        self.top = top;
    }

    pub(crate) fn set_reach_only_by_branch(&mut self, value: bool) {
        if value {
            self.top = true;
        }
        self.reach_only_by_branch = value;
    }

    pub(crate) fn note_transfer_of_control(&mut self) {
        self.seen_transfer_of_control = true;
    }

    pub(crate) fn set_register_tested_nonnegative(&mut self, register: i32) {
        self.register_tested_found_to_be_nonnegative = register;
    }
}

impl std::fmt::Display for Interpreter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.top {
            return write!(f, "TOP");
        }
        let stack = self.stack.iter().map(ToString::to_string).join(", ");
        let locals = self
            .locals
            .values()
            .iter()
            .map(|local| local.as_ref().map_or_else(|| "_".to_string(), ToString::to_string))
            .join(", ");
        write!(f, "[{stack}] :: [{locals}]")
    }
}

/// Gets the register a load/store-style instruction addresses, from either
/// the explicit operand or the opcode's implicit `_0`‥`_3` form.
pub(crate) fn register_operand(instruction: &Instruction) -> Option<u16> {
    use crate::method::Operand;
    match &instruction.operand {
        Operand::Register(register) => return Some(*register),
        Operand::Iinc { register, .. } => return Some(*register),
        _ => {}
    }
    let opcode = instruction.opcode;
    let implied = match opcode {
        opcode::ILOAD_0..=opcode::ALOAD_3 => (opcode - opcode::ILOAD_0) % 4,
        opcode::ISTORE_0..=opcode::ASTORE_3 => (opcode - opcode::ISTORE_0) % 4,
        _ => return None,
    };
    Some(u16::from(implied))
}

fn branch_offset_of(instruction: &Instruction) -> Option<i32> {
    match instruction.operand {
        crate::method::Operand::Branch { offset, .. } => Some(offset),
        _ => None,
    }
}

/// Invalidates the register mirror of every item claiming `register`,
/// after the register was overwritten by a store.
fn clear_register_load(stack: &mut Stack, locals: &mut Locals, register: i32) {
    let clear = |item: &mut Item| {
        if item.register_number() == register {
            item.set_register_number(NO_REGISTER);
        }
        if item.field_loaded_from_register() == register {
            item.set_field_loaded_from_register(NO_REGISTER);
        }
    };
    stack.iter_mut().for_each(clear);
    locals.iter_mut().for_each(clear);
}

/// Pointwise merge of a locals snapshot into `into`, over the common
/// prefix. Reports whether anything in `into` changed. An unwritten
/// register on either side defers to the written one.
pub(crate) fn merge_local_lists(into: &mut [Option<Item>], from: &[Option<Item>]) -> bool {
    let mut changed = false;
    for (old, new) in into.iter_mut().zip(from.iter()) {
        let merged = match (old.as_ref(), new.as_ref()) {
            (Some(a), Some(b)) => Some(Item::merge(a, b)),
            (None, Some(b)) => Some(b.clone()),
            (existing, None) => existing.cloned(),
        };
        if merged != *old {
            *old = merged;
            changed = true;
        }
    }
    changed
}

/// Pointwise merge of a stack snapshot into `into`, over the common
/// prefix. Reports whether anything in `into` changed. A size mismatch is
/// logged but not fatal; the slots past the common prefix are left
/// untouched.
pub(crate) fn merge_item_lists(into: &mut [Item], from: &[Item]) -> bool {
    if into.len() != from.len() {
        debug!(
            into_len = into.len(),
            from_len = from.len(),
            "merging stacks of mismatched depth"
        );
    }
    let mut changed = false;
    for (old, new) in into.iter_mut().zip(from.iter()) {
        let merged = Item::merge(old, new);
        if merged != *old {
            *old = merged;
            changed = true;
        }
    }
    changed
}
