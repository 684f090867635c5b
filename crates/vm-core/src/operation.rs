//! ISA operations: one opcode form, its semantics, and its disassembly.

use std::fmt::{self, Write as _};
use std::rc::Rc;

use crate::arch::Architecture;
use crate::context::Context;
use crate::fault::{MaskError, VmError};
use crate::mask::{OpMask, MAX_OPERANDS};

/// Generic execute procedure: runs against the context with decoded operands.
pub type ExecuteFn<A> = fn(&mut Context<'_, A>, &Operands) -> Result<(), VmError>;

/// Specialised procedure with operand values already bound.
pub type CompiledFn<A> = Rc<dyn Fn(&mut Context<'_, A>) -> Result<(), VmError>>;

/// Produces a [`CompiledFn`] for one set of operand values.
pub type CompileFn<A> = fn(&Operands) -> CompiledFn<A>;

/// Wraps a closure as a [`CompiledFn`].
pub fn compiled<A, F>(procedure: F) -> CompiledFn<A>
where
    F: Fn(&mut Context<'_, A>) -> Result<(), VmError> + 'static,
{
    Rc::new(procedure)
}

/// Operand metadata used by disassembly and tooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum OperandTag {
    /// Register index that the instruction writes.
    Destination,
    /// Register index that the instruction reads.
    ExactRegister,
    /// Bits that are decoded but carry no meaning for this form.
    Unused,
}

/// Right-justified operand values extracted from one instruction word.
///
/// Absent operands read as zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Operands {
    values: [u16; MAX_OPERANDS],
    count: u8,
}

impl Operands {
    /// Builds operands from explicit values.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn new(values: &[u16]) -> Self {
        let mut operands = Self::default();
        for (slot, value) in operands.values.iter_mut().zip(values) {
            *slot = *value;
            operands.count += 1;
        }
        operands
    }

    /// Extracts every operand field of `mask` from `word`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn decode(mask: &OpMask, word: u16) -> Self {
        let mut operands = Self::default();
        for n in 0..MAX_OPERANDS {
            if let Some(value) = mask.decode_operand(word, n) {
                operands.values[n] = value;
                operands.count = (n + 1) as u8;
            }
        }
        operands
    }

    /// Operand `n` as a raw value.
    #[must_use]
    pub fn get(&self, n: usize) -> u16 {
        self.values.get(n).copied().unwrap_or(0)
    }

    /// Operand `n` as a register index.
    #[must_use]
    pub fn reg(&self, n: usize) -> usize {
        usize::from(self.get(n))
    }

    /// Operand `n` truncated to a byte.
    #[must_use]
    pub fn byte(&self, n: usize) -> u8 {
        self.get(n).to_be_bytes()[1]
    }

    /// Number of decoded operands.
    #[must_use]
    pub fn len(&self) -> usize {
        usize::from(self.count)
    }

    /// Returns true when no operand was decoded.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Decoded operand values in order.
    #[must_use]
    pub fn as_slice(&self) -> &[u16] {
        &self.values[..self.len()]
    }
}

/// One instruction of an ISA.
pub struct Operation<A> {
    mnemonic: &'static str,
    opcode: u16,
    mask: OpMask,
    template: &'static str,
    tags: [Option<OperandTag>; MAX_OPERANDS],
    execute: ExecuteFn<A>,
    compile: Option<CompileFn<A>>,
}

impl<A> Clone for Operation<A> {
    fn clone(&self) -> Self {
        Self {
            mnemonic: self.mnemonic,
            opcode: self.opcode,
            mask: self.mask,
            template: self.template,
            tags: self.tags,
            execute: self.execute,
            compile: self.compile,
        }
    }
}

impl<A> fmt::Debug for Operation<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("mnemonic", &self.mnemonic)
            .field("opcode", &format_args!("{:#06X}", self.opcode))
            .field("mask", &self.mask)
            .field("template", &self.template)
            .field("tags", &self.tags)
            .field("compiled", &self.compile.is_some())
            .finish_non_exhaustive()
    }
}

impl<A> Operation<A> {
    /// Registers an operation.
    ///
    /// # Errors
    ///
    /// Returns [`MaskError::OpcodeOutsideMask`] when `opcode` has bits outside
    /// the match mask.
    pub fn new(
        mnemonic: &'static str,
        opcode: u16,
        mask: OpMask,
        template: &'static str,
        execute: ExecuteFn<A>,
    ) -> Result<Self, MaskError> {
        if opcode & !mask.match_mask() != 0 {
            return Err(MaskError::OpcodeOutsideMask {
                opcode,
                mask: mask.match_mask(),
            });
        }
        Ok(Self {
            mnemonic,
            opcode,
            mask,
            template,
            tags: [None; MAX_OPERANDS],
            execute,
            compile: None,
        })
    }

    /// Attaches operand tags, one slot per operand.
    #[must_use]
    pub const fn with_tags(mut self, tags: [Option<OperandTag>; MAX_OPERANDS]) -> Self {
        self.tags = tags;
        self
    }

    /// Attaches a compiled fast path. It must behave exactly like `execute`.
    #[must_use]
    pub const fn with_compile(mut self, compile: CompileFn<A>) -> Self {
        self.compile = Some(compile);
        self
    }

    /// Instruction mnemonic.
    #[must_use]
    pub const fn mnemonic(&self) -> &'static str {
        self.mnemonic
    }

    /// Masked opcode constant.
    #[must_use]
    pub const fn opcode(&self) -> u16 {
        self.opcode
    }

    /// Mask descriptor.
    #[must_use]
    pub const fn mask(&self) -> &OpMask {
        &self.mask
    }

    /// Disassembly template.
    #[must_use]
    pub const fn template(&self) -> &'static str {
        self.template
    }

    /// Tag of operand `n`, if any.
    #[must_use]
    pub fn tag(&self, n: usize) -> Option<OperandTag> {
        self.tags.get(n).copied().flatten()
    }

    /// Index of the operand tagged as destination.
    #[must_use]
    pub fn destination(&self) -> Option<usize> {
        self.tags
            .iter()
            .position(|tag| *tag == Some(OperandTag::Destination))
    }

    /// Returns true when `word` belongs to this operation.
    #[must_use]
    pub const fn matches(&self, word: u16) -> bool {
        self.mask.matches(word, self.opcode)
    }

    /// Extracts this operation's operands from `word`.
    #[must_use]
    pub fn decode(&self, word: u16) -> Operands {
        Operands::decode(&self.mask, word)
    }

    /// Generic execute procedure.
    #[must_use]
    pub const fn execute_fn(&self) -> ExecuteFn<A> {
        self.execute
    }

    /// Runs the generic procedure.
    ///
    /// # Errors
    ///
    /// Propagates whatever fault the instruction raises.
    pub fn execute(&self, ctx: &mut Context<'_, A>, operands: &Operands) -> Result<(), VmError> {
        (self.execute)(ctx, operands)
    }

    /// Returns true when a compiled fast path is registered.
    #[must_use]
    pub const fn has_compile(&self) -> bool {
        self.compile.is_some()
    }

    /// Specialises this operation for fixed operand values.
    #[must_use]
    pub fn compile(&self, operands: &Operands) -> Option<CompiledFn<A>> {
        self.compile.map(|compile| compile(operands))
    }
}

impl<A: Architecture> Operation<A> {
    /// Renders `word` through the disassembly template.
    ///
    /// `{0}`, `{1}` and `{2}` expand to operands. Register-tagged operands use
    /// the architecture's register prefix, untagged ones render as hex
    /// padded to the field width.
    #[must_use]
    pub fn disassemble(&self, word: u16) -> String {
        let operands = self.decode(word);
        let mut out = String::with_capacity(self.template.len() + 8);
        let mut chars = self.template.chars().peekable();

        while let Some(c) = chars.next() {
            if c != '{' {
                out.push(c);
                continue;
            }
            let slot = chars.peek().and_then(|d| d.to_digit(10));
            let Some(n) = slot.map(|d| d as usize).filter(|n| *n < MAX_OPERANDS) else {
                out.push(c);
                continue;
            };
            chars.next();
            if chars.peek() == Some(&'}') {
                chars.next();
                self.render_operand(&mut out, n, operands.get(n));
            } else {
                out.push(c);
                let _ = write!(out, "{n}");
            }
        }
        out
    }

    fn render_operand(&self, out: &mut String, n: usize, value: u16) {
        let _ = match self.tag(n) {
            Some(OperandTag::Destination | OperandTag::ExactRegister) => {
                write!(out, "{}{value:X}", A::REGISTER_PREFIX)
            }
            Some(OperandTag::Unused) => write!(out, "_"),
            None => {
                let digits = self
                    .mask
                    .operand(n)
                    .map_or(1, |field| usize::from(field.width()).div_ceil(4));
                write!(out, "0x{value:0digits$X}")
            }
        };
    }
}
