//! Decoded instructions and the word-keyed decode cache.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::context::Context;
use crate::fault::VmError;
use crate::operation::{CompiledFn, ExecuteFn, Operands};

/// Procedure bound to a decoded instruction.
pub enum Executable<A> {
    /// Generic procedure, called with the decoded operands.
    Generic(ExecuteFn<A>),
    /// Compiled procedure with operands captured.
    Compiled(CompiledFn<A>),
}

impl<A> Clone for Executable<A> {
    fn clone(&self) -> Self {
        match self {
            Self::Generic(execute) => Self::Generic(*execute),
            Self::Compiled(procedure) => Self::Compiled(Rc::clone(procedure)),
        }
    }
}

impl<A> fmt::Debug for Executable<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Generic(_) => f.write_str("Generic"),
            Self::Compiled(_) => f.write_str("Compiled"),
        }
    }
}

/// Decoded instruction: operation, operand values, and bound executable.
pub struct Decoded<A> {
    word: u16,
    operation: usize,
    mnemonic: &'static str,
    operands: Operands,
    executable: Executable<A>,
}

impl<A> fmt::Debug for Decoded<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Decoded")
            .field("word", &format_args!("{:#06X}", self.word))
            .field("operation", &self.operation)
            .field("mnemonic", &self.mnemonic)
            .field("operands", &self.operands)
            .field("executable", &self.executable)
            .finish()
    }
}

impl<A> Decoded<A> {
    /// Bundles a decode result.
    #[must_use]
    pub const fn new(
        word: u16,
        operation: usize,
        mnemonic: &'static str,
        operands: Operands,
        executable: Executable<A>,
    ) -> Self {
        Self {
            word,
            operation,
            mnemonic,
            operands,
            executable,
        }
    }

    /// Instruction word.
    #[must_use]
    pub const fn word(&self) -> u16 {
        self.word
    }

    /// Registration index of the operation in its table.
    #[must_use]
    pub const fn operation(&self) -> usize {
        self.operation
    }

    /// Operation mnemonic.
    #[must_use]
    pub const fn mnemonic(&self) -> &'static str {
        self.mnemonic
    }

    /// Decoded operand values.
    #[must_use]
    pub const fn operands(&self) -> &Operands {
        &self.operands
    }

    /// Bound executable.
    #[must_use]
    pub const fn executable(&self) -> &Executable<A> {
        &self.executable
    }

    /// Returns true when the compiled fast path is bound.
    #[must_use]
    pub const fn is_compiled(&self) -> bool {
        matches!(self.executable, Executable::Compiled(_))
    }

    /// Executes the instruction against `ctx`.
    ///
    /// # Errors
    ///
    /// Propagates the instruction's fault.
    pub fn run(&self, ctx: &mut Context<'_, A>) -> Result<(), VmError> {
        match &self.executable {
            Executable::Generic(execute) => execute(ctx, &self.operands),
            Executable::Compiled(procedure) => procedure(ctx),
        }
    }
}

/// Memoizes word to decoded instruction.
///
/// Decoding is a pure function of the word for a fixed instruction set, so
/// entries never go stale on their own.
pub struct DecodeCache<A> {
    entries: HashMap<u16, Rc<Decoded<A>>>,
}

impl<A> Default for DecodeCache<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> fmt::Debug for DecodeCache<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodeCache")
            .field("entries", &self.entries.len())
            .finish()
    }
}

impl<A> DecodeCache<A> {
    /// Empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Cached decode for `word`.
    #[must_use]
    pub fn get(&self, word: u16) -> Option<Rc<Decoded<A>>> {
        self.entries.get(&word).cloned()
    }

    /// Stores `decoded` under its own word and hands back the shared entry.
    pub fn put(&mut self, decoded: Decoded<A>) -> Rc<Decoded<A>> {
        let entry = Rc::new(decoded);
        self.entries.insert(entry.word(), Rc::clone(&entry));
        entry
    }

    /// Drops the entry for `word`.
    pub fn invalidate(&mut self, word: u16) -> bool {
        self.entries.remove(&word).is_some()
    }

    /// Drops every entry.
    pub fn invalidate_all(&mut self) {
        self.entries.clear();
    }

    /// Returns true when `word` is cached.
    #[must_use]
    pub fn contains(&self, word: u16) -> bool {
        self.entries.contains_key(&word)
    }

    /// Number of cached words.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
