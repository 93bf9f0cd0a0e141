//! The abstract operand stack.

use tracing::warn;

use crate::{
    constant::STACK_ERROR_SIGNATURE,
    error::analysis::{Error, Result},
    error::container::Locatable,
    value::Item,
};

/// The operand stack of the abstract machine.
///
/// # Indexing
///
/// Offsets into the stack are zero-based from the top: offset 0 is the most
/// recently pushed item. A wide (`long`/`double`) value occupies a single
/// abstract slot; its two-slot nature only matters to the shuffle opcodes,
/// which consult [`Item::size`].
///
/// # Underflow
///
/// The mutating operations take the pc of the instruction being executed
/// and report underflow as an error located there, which the driver turns
/// into a cleared, unreachable state. The read-only accessors used by
/// detectors instead log and return a synthetic placeholder item, because a
/// detector must never be able to crash the analysis with a malformed
/// offset.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Stack {
    items: Vec<Item>,
}

impl Stack {
    /// Creates a new stack without any items on it.
    #[must_use]
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Pushes the provided `item` onto the top of the stack.
    pub fn push(&mut self, item: Item) {
        self.items.push(item);
    }

    /// Pops the top item from the stack, on behalf of the instruction at
    /// `pc`.
    ///
    /// # Errors
    ///
    /// If the stack has no item to pop; the error is located at `pc`.
    pub fn pop(&mut self, pc: u32) -> Result<Item> {
        self.items.pop().ok_or_else(|| {
            Error::StackUnderflow {
                depth:     0,
                available: 0,
            }
            .locate(pc)
        })
    }

    /// Pops `count` items, discarding them, on behalf of the instruction at
    /// `pc`.
    ///
    /// # Errors
    ///
    /// If fewer than `count` items are available; the error is located at
    /// `pc`.
    pub fn pop_n(&mut self, count: usize, pc: u32) -> Result<()> {
        for _ in 0..count {
            self.pop(pc)?;
        }
        Ok(())
    }

    /// Gets the top item without popping it, on behalf of the instruction
    /// at `pc`.
    ///
    /// # Errors
    ///
    /// If the stack is empty; the error is located at `pc`.
    pub fn top(&self, pc: u32) -> Result<&Item> {
        self.items.last().ok_or_else(|| {
            Error::StackUnderflow {
                depth:     0,
                available: 0,
            }
            .locate(pc)
        })
    }

    /// Gets the item at `offset` from the top of the stack, handing out a
    /// logged placeholder when the offset is out of range.
    #[must_use]
    pub fn peek(&self, offset: usize) -> Item {
        self.peek_ref(offset).cloned().unwrap_or_else(|| {
            warn!(
                offset,
                depth = self.items.len(),
                "stack read past the bottom, returning a placeholder"
            );
            Item::typed(STACK_ERROR_SIGNATURE)
        })
    }

    /// Gets a reference to the item at `offset` from the top, or [`None`]
    /// when out of range.
    #[must_use]
    pub fn peek_ref(&self, offset: usize) -> Option<&Item> {
        self.items
            .len()
            .checked_sub(offset + 1)
            .map(|index| &self.items[index])
    }

    /// Gets a mutable reference to the item at `offset` from the top.
    #[must_use]
    pub fn peek_mut(&mut self, offset: usize) -> Option<&mut Item> {
        self.items
            .len()
            .checked_sub(offset + 1)
            .map(|index| &mut self.items[index])
    }

    /// Replaces the item at `offset` from the top with `item`, logging and
    /// doing nothing when the offset is out of range.
    pub fn replace(&mut self, offset: usize, item: Item) {
        match self.items.len().checked_sub(offset + 1) {
            Some(index) => self.items[index] = item,
            None => warn!(
                offset,
                depth = self.items.len(),
                "stack replace past the bottom, ignored"
            ),
        }
    }

    /// Removes every item from the stack.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Gets the current depth of the stack.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.items.len()
    }

    /// Checks if the stack is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterates the items from the bottom of the stack to the top.
    pub fn iter(&self) -> impl Iterator<Item = &Item> {
        self.items.iter()
    }

    /// Iterates the items mutably from the bottom of the stack to the top.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Item> {
        self.items.iter_mut()
    }

    /// Gets the backing items from the bottom of the stack to the top.
    #[must_use]
    pub fn items(&self) -> &[Item] {
        &self.items
    }

    /// Gets the backing items mutably, bottom first.
    pub fn items_mut(&mut self) -> &mut [Item] {
        &mut self.items
    }

    /// Replaces the backing items wholesale, bottom first.
    pub fn set_items(&mut self, items: Vec<Item>) {
        self.items = items;
    }
}

#[cfg(test)]
mod test {
    use super::Stack;
    use crate::{constant::STACK_ERROR_SIGNATURE, value::Item};

    fn stack_of(count: usize) -> Stack {
        let mut stack = Stack::new();
        for i in 0..count {
            stack.push(Item::with_constant("I", i as i32));
        }
        stack
    }

    #[test]
    fn can_push_and_pop_items() -> anyhow::Result<()> {
        let mut stack = stack_of(2);
        assert_eq!(stack.depth(), 2);
        let top = stack.pop(0)?;
        assert!(top.has_constant_i32(1));
        assert_eq!(stack.depth(), 1);

        Ok(())
    }

    #[test]
    fn popping_an_empty_stack_errors_at_the_requesting_pc() {
        let mut stack = Stack::new();
        let error = stack.pop(17).expect_err("popping an empty stack should fail");
        assert_eq!(error.location, 17);
    }

    #[test]
    fn top_reads_without_popping() -> anyhow::Result<()> {
        let stack = stack_of(2);
        assert!(stack.top(0)?.has_constant_i32(1));
        assert_eq!(stack.depth(), 2);

        let empty = Stack::new();
        let error = empty.top(9).expect_err("top of an empty stack should fail");
        assert_eq!(error.location, 9);

        Ok(())
    }

    #[test]
    fn peeking_is_zero_based_from_the_top() {
        let stack = stack_of(3);
        assert!(stack.peek(0).has_constant_i32(2));
        assert!(stack.peek(2).has_constant_i32(0));
    }

    #[test]
    fn peeking_past_the_bottom_yields_a_placeholder() {
        let stack = stack_of(1);
        let placeholder = stack.peek(5);
        assert_eq!(placeholder.signature(), STACK_ERROR_SIGNATURE);
    }

    #[test]
    fn replace_swaps_one_slot_in_place() {
        let mut stack = stack_of(3);
        stack.replace(1, Item::with_constant("I", 42));
        assert!(stack.peek(1).has_constant_i32(42));
        assert_eq!(stack.depth(), 3);

        // Out of range is a no-op.
        stack.replace(9, Item::typed("I"));
        assert_eq!(stack.depth(), 3);
    }

    #[test]
    fn pop_n_honours_the_requested_count() -> anyhow::Result<()> {
        let mut stack = stack_of(3);
        stack.pop_n(2, 0)?;
        assert_eq!(stack.depth(), 1);
        stack.pop_n(2, 4).expect_err("underflow should error");

        Ok(())
    }
}
