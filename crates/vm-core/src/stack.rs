//! Fixed-capacity call stack.

use crate::fault::VmError;

/// Default call stack depth.
pub const DEFAULT_STACK_CAPACITY: usize = 16;

/// Bounded LIFO of return addresses.
///
/// Overflow and underflow are guest faults, never panics.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct ProgramStack {
    slots: Box<[u16]>,
    depth: usize,
}

impl Default for ProgramStack {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_STACK_CAPACITY)
    }
}

impl ProgramStack {
    /// Creates an empty stack holding at most `capacity` entries.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: vec![0; capacity].into_boxed_slice(),
            depth: 0,
        }
    }

    /// Pushes `value`.
    ///
    /// # Errors
    ///
    /// Returns [`VmError::StackOverflow`] when the stack is full.
    pub fn push(&mut self, value: u16) -> Result<(), VmError> {
        let capacity = self.slots.len();
        let slot = self
            .slots
            .get_mut(self.depth)
            .ok_or(VmError::StackOverflow { capacity })?;
        *slot = value;
        self.depth += 1;
        Ok(())
    }

    /// Pops the most recent value.
    ///
    /// # Errors
    ///
    /// Returns [`VmError::StackUnderflow`] when the stack is empty.
    pub fn pop(&mut self) -> Result<u16, VmError> {
        let value = self.top()?;
        self.depth -= 1;
        self.slots[self.depth] = 0;
        Ok(value)
    }

    /// Reads the most recent value without removing it.
    ///
    /// # Errors
    ///
    /// Returns [`VmError::StackUnderflow`] when the stack is empty.
    pub fn top(&self) -> Result<u16, VmError> {
        self.depth
            .checked_sub(1)
            .and_then(|index| self.slots.get(index).copied())
            .ok_or(VmError::StackUnderflow)
    }

    /// Number of stored entries.
    #[must_use]
    pub const fn depth(&self) -> usize {
        self.depth
    }

    /// Maximum number of entries.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Returns true when nothing is stored.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.depth == 0
    }

    /// Returns false when the depth exceeds the capacity, which only a
    /// deserialized stack can do.
    #[must_use]
    pub const fn is_well_formed(&self) -> bool {
        self.depth <= self.slots.len()
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        self.slots.fill(0);
        self.depth = 0;
    }

    /// Stored entries, bottom first.
    #[must_use]
    pub fn as_slice(&self) -> &[u16] {
        &self.slots[..self.depth]
    }
}

#[cfg(test)]
mod tests {
    use super::{ProgramStack, DEFAULT_STACK_CAPACITY};
    use crate::fault::VmError;

    #[test]
    fn seventeenth_push_overflows_then_recovers_after_pop() {
        let mut stack = ProgramStack::default();
        for value in 0..16 {
            stack.push(value).expect("within capacity");
        }
        assert_eq!(
            stack.push(16),
            Err(VmError::StackOverflow {
                capacity: DEFAULT_STACK_CAPACITY,
            })
        );
        assert_eq!(stack.depth(), 16);
        assert_eq!(stack.pop(), Ok(15));
        assert_eq!(stack.push(99), Ok(()));
        assert_eq!(stack.top(), Ok(99));
    }

    #[test]
    fn empty_stack_underflows_on_pop_and_top() {
        let mut stack = ProgramStack::with_capacity(4);
        assert_eq!(stack.pop(), Err(VmError::StackUnderflow));
        assert_eq!(stack.top(), Err(VmError::StackUnderflow));
        assert!(stack.is_empty());
    }

    #[test]
    fn zero_capacity_stack_always_overflows() {
        let mut stack = ProgramStack::with_capacity(0);
        assert_eq!(stack.push(1), Err(VmError::StackOverflow { capacity: 0 }));
    }

    #[test]
    fn entries_keep_push_order_within_capacity() {
        let mut stack = ProgramStack::with_capacity(4);
        stack.push(0x202).expect("fits");
        stack.push(0x304).expect("fits");
        assert_eq!(stack.as_slice(), &[0x202, 0x304]);
        assert_eq!(stack.capacity(), 4);
        assert!(stack.is_well_formed());

        let overfull = ProgramStack {
            slots: vec![0; 1].into_boxed_slice(),
            depth: 2,
        };
        assert!(!overfull.is_well_formed());
    }

    #[test]
    fn clear_empties_without_changing_capacity() {
        let mut stack = ProgramStack::with_capacity(2);
        stack.push(7).expect("fits");
        stack.clear();
        assert!(stack.is_empty());
        assert_eq!(stack.capacity(), 2);
    }
}
