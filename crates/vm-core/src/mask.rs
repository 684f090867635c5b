//! Instruction bitmask descriptors.
//!
//! An [`OpMask`] pairs the bits that identify an instruction (the match
//! mask) with up to three operand fields. Construction validates the whole
//! set up front so that decode never has to second-guess a mask.

use crate::fault::MaskError;

/// Width of the native instruction word in bits.
pub const WORD_BITS: u32 = u16::BITS;

/// Maximum number of operand fields an instruction can carry.
pub const MAX_OPERANDS: usize = 3;

/// A contiguous-or-not bit selection inside an instruction word, with its
/// precomputed least and most significant set bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BitField {
    mask: u16,
    lsb: u8,
    msb: u8,
}

impl BitField {
    /// Builds a field from a non-zero mask.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn from_mask(mask: u16) -> Option<Self> {
        if mask == 0 {
            return None;
        }
        Some(Self {
            mask,
            lsb: mask.trailing_zeros() as u8,
            msb: (WORD_BITS - 1 - mask.leading_zeros()) as u8,
        })
    }

    /// Raw mask bits.
    #[must_use]
    pub const fn mask(self) -> u16 {
        self.mask
    }

    /// Index of the least significant selected bit.
    #[must_use]
    pub const fn lsb(self) -> u8 {
        self.lsb
    }

    /// Index of the most significant selected bit.
    #[must_use]
    pub const fn msb(self) -> u8 {
        self.msb
    }

    /// Number of bit positions from `lsb` to `msb`, inclusive.
    #[must_use]
    pub const fn width(self) -> u8 {
        self.msb - self.lsb + 1
    }

    /// Extracts the selected bits, right-justified.
    #[must_use]
    pub const fn extract(self, word: u16) -> u16 {
        (word & self.mask) >> self.lsb
    }

    /// Places a right-justified value back under the mask.
    #[must_use]
    pub const fn insert(self, value: u16) -> u16 {
        (value << self.lsb) & self.mask
    }
}

/// Match mask plus operand fields for one instruction form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OpMask {
    matcher: BitField,
    operands: [Option<BitField>; MAX_OPERANDS],
    priority: u8,
}

impl OpMask {
    /// Validates and builds a mask set.
    ///
    /// Masks are taken as `u32` so that bits above the 16-bit word are
    /// reported rather than truncated. Operand masks must be given from most
    /// to least significant.
    ///
    /// # Errors
    ///
    /// Returns a [`MaskError`] when a mask is out of range or empty, when any
    /// two masks overlap, when operands are not strictly ordered by
    /// significance, or when the match mask has zero bit span.
    pub fn new(match_mask: u32, operand_masks: &[u32]) -> Result<Self, MaskError> {
        if operand_masks.len() > MAX_OPERANDS {
            return Err(MaskError::TooManyOperands {
                count: operand_masks.len(),
                max: MAX_OPERANDS,
            });
        }

        let matcher = BitField::from_mask(narrow(match_mask)?).ok_or(MaskError::EmptyMatchMask)?;

        let mut operands: [Option<BitField>; MAX_OPERANDS] = [None; MAX_OPERANDS];
        for (index, raw) in operand_masks.iter().copied().enumerate() {
            let field = BitField::from_mask(narrow(raw)?)
                .ok_or(MaskError::EmptyOperandMask { index })?;

            if field.mask & matcher.mask != 0 {
                return Err(MaskError::Overlap {
                    first: matcher.mask,
                    second: field.mask,
                });
            }
            for earlier in operands.iter().flatten() {
                if earlier.mask & field.mask != 0 {
                    return Err(MaskError::Overlap {
                        first: earlier.mask,
                        second: field.mask,
                    });
                }
            }
            if let Some(previous) = index.checked_sub(1).and_then(|i| operands[i]) {
                if previous.lsb <= field.msb {
                    return Err(MaskError::Misordered {
                        index,
                        mask: field.mask,
                    });
                }
            }
            operands[index] = Some(field);
        }

        let priority = matcher.msb - matcher.lsb;
        if priority == 0 {
            return Err(MaskError::ZeroSpan {
                mask: matcher.mask,
            });
        }

        Ok(Self {
            matcher,
            operands,
            priority,
        })
    }

    /// Bits that identify the instruction.
    #[must_use]
    pub const fn match_mask(&self) -> u16 {
        self.matcher.mask
    }

    /// Least significant bit of the match mask.
    #[must_use]
    pub const fn match_lsb(&self) -> u8 {
        self.matcher.lsb
    }

    /// Most significant bit of the match mask.
    #[must_use]
    pub const fn match_msb(&self) -> u8 {
        self.matcher.msb
    }

    /// Bucket ordering key: `match_msb - match_lsb`, always positive.
    #[must_use]
    pub const fn priority(&self) -> u8 {
        self.priority
    }

    /// Operand field `n` (zero-based), if present.
    #[must_use]
    pub fn operand(&self, n: usize) -> Option<BitField> {
        self.operands.get(n).copied().flatten()
    }

    /// Number of operand fields.
    #[must_use]
    pub fn operand_count(&self) -> usize {
        self.operands.iter().flatten().count()
    }

    /// Extracts operand `n` from `word`, right-justified.
    #[must_use]
    pub fn decode_operand(&self, word: u16, n: usize) -> Option<u16> {
        self.operand(n).map(|field| field.extract(word))
    }

    /// Returns true when the match bits of `word` equal `opcode`.
    #[must_use]
    pub const fn matches(&self, word: u16, opcode: u16) -> bool {
        word & self.matcher.mask == opcode
    }
}

fn narrow(mask: u32) -> Result<u16, MaskError> {
    u16::try_from(mask).map_err(|_| MaskError::OutOfRange { mask })
}
