//! Bucketed opcode dispatch.
//!
//! Every operation's match mask shares a common discriminator: the bits set
//! in all of them. Words are bucketed on those bits, and each bucket is
//! scanned widest match first so that an exact form (`00E0`) wins over a
//! catch-all (`0NNN`).

use crate::fault::VmError;
use crate::operation::Operation;

/// Operations grouped by discriminator bits.
pub struct OpTable<A> {
    operations: Vec<Operation<A>>,
    buckets: Vec<Vec<usize>>,
    discriminator: u16,
    shift: u32,
}

impl<A> std::fmt::Debug for OpTable<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpTable")
            .field("operations", &self.operations.len())
            .field("buckets", &self.buckets.len())
            .field("discriminator", &format_args!("{:#06X}", self.discriminator))
            .finish()
    }
}

impl<A> OpTable<A> {
    /// Builds the table. Registration order breaks priority ties.
    #[must_use]
    pub fn new(operations: Vec<Operation<A>>) -> Self {
        let discriminator = if operations.is_empty() {
            0
        } else {
            operations
                .iter()
                .fold(u16::MAX, |acc, op| acc & op.mask().match_mask())
        };
        let shift = if discriminator == 0 {
            0
        } else {
            discriminator.trailing_zeros()
        };

        let mut buckets = vec![Vec::new(); usize::from(discriminator >> shift) + 1];
        for (index, op) in operations.iter().enumerate() {
            buckets[usize::from((op.opcode() & discriminator) >> shift)].push(index);
        }
        for bucket in &mut buckets {
            bucket.sort_by_key(|&index| std::cmp::Reverse(operations[index].mask().priority()));
        }

        Self {
            operations,
            buckets,
            discriminator,
            shift,
        }
    }

    /// Resolves `word` to its operation index and operation.
    #[must_use]
    pub fn lookup(&self, word: u16) -> Option<(usize, &Operation<A>)> {
        self.buckets
            .get(self.bucket_of(word))?
            .iter()
            .map(|&index| (index, &self.operations[index]))
            .find(|(_, op)| op.matches(word))
    }

    /// Like [`OpTable::lookup`], but a miss is a guest fault.
    ///
    /// # Errors
    ///
    /// Returns [`VmError::UnknownOpcode`] when no operation matches `word`.
    pub fn resolve(&self, word: u16) -> Result<(usize, &Operation<A>), VmError> {
        self.lookup(word).ok_or(VmError::UnknownOpcode { word })
    }

    /// Operation at registration `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Operation<A>> {
        self.operations.get(index)
    }

    /// Operations in registration order.
    #[must_use]
    pub fn operations(&self) -> &[Operation<A>] {
        &self.operations
    }

    /// Bits common to every match mask.
    #[must_use]
    pub const fn discriminator(&self) -> u16 {
        self.discriminator
    }

    /// Number of buckets.
    #[must_use]
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Operation indices in scan order for the bucket `word` falls into.
    #[must_use]
    pub fn bucket(&self, word: u16) -> &[usize] {
        self.buckets
            .get(self.bucket_of(word))
            .map_or(&[], Vec::as_slice)
    }

    /// Number of registered operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Returns true when no operation is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    const fn bucket_of(&self, word: u16) -> usize {
        ((word & self.discriminator) >> self.shift) as usize
    }
}
