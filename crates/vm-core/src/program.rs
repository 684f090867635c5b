//! Loaded program image, program sources, and instruction fetch.

use crate::fault::{LoaderError, VmError};

/// Width of one instruction in bytes.
pub const INSTRUCTION_WIDTH: u16 = 2;

/// Largest image a 16-bit program counter can address.
pub const MAX_IMAGE_LEN: usize = 1 << 16;

/// Program source handed to an architecture loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramSource<'a> {
    /// Raw program bytes.
    Bytes(&'a [u8]),
    /// Hex text, whitespace separated, optional `0x` per token.
    Hex(&'a str),
}

impl ProgramSource<'_> {
    /// Short name of the source kind, used in loader errors.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Bytes(_) => "bytes",
            Self::Hex(_) => "hex",
        }
    }

    /// Resolves the source to raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`LoaderError::MalformedHex`] when hex text cannot be parsed.
    pub fn to_bytes(&self) -> Result<Vec<u8>, LoaderError> {
        match self {
            Self::Bytes(bytes) => Ok(bytes.to_vec()),
            Self::Hex(text) => parse_hex(text),
        }
    }
}

/// Parses whitespace separated hex tokens. Each token carries an even number
/// of digits and may start with `0x`.
///
/// # Errors
///
/// Returns [`LoaderError::MalformedHex`] naming the first bad token.
pub fn parse_hex(text: &str) -> Result<Vec<u8>, LoaderError> {
    let mut bytes = Vec::with_capacity(text.len() / 2);
    for (token, raw) in text.split_whitespace().enumerate() {
        let digits = raw
            .strip_prefix("0x")
            .or_else(|| raw.strip_prefix("0X"))
            .unwrap_or(raw);
        if digits.is_empty()
            || digits.len() % 2 != 0
            || !digits.bytes().all(|b| b.is_ascii_hexdigit())
        {
            return Err(LoaderError::MalformedHex { token });
        }
        for start in (0..digits.len()).step_by(2) {
            let byte = u8::from_str_radix(&digits[start..start + 2], 16)
                .map_err(|_| LoaderError::MalformedHex { token })?;
            bytes.push(byte);
        }
    }
    Ok(bytes)
}

/// Loaded byte image. Instructions and data share it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Program {
    image: Vec<u8>,
}

impl Program {
    /// Wraps a loader image, rejecting images the program counter cannot
    /// address.
    ///
    /// # Errors
    ///
    /// Returns [`LoaderError::TooLarge`] above [`MAX_IMAGE_LEN`] bytes.
    pub fn new(image: Vec<u8>) -> Result<Self, LoaderError> {
        if image.len() > MAX_IMAGE_LEN {
            return Err(LoaderError::TooLarge {
                len: image.len(),
                max: MAX_IMAGE_LEN,
            });
        }
        Ok(Self { image })
    }

    /// Wraps an image without a size check.
    #[must_use]
    pub const fn from_image(image: Vec<u8>) -> Self {
        Self { image }
    }

    /// Image length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.image.len()
    }

    /// Returns true for an empty image.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.image.is_empty()
    }

    /// Returns true when a full instruction word is available at `address`.
    #[must_use]
    pub fn can_fetch(&self, address: u16) -> bool {
        usize::from(address) + usize::from(INSTRUCTION_WIDTH) <= self.image.len()
    }

    /// Fetches the big-endian instruction word at `address`.
    ///
    /// # Errors
    ///
    /// Returns [`VmError::FetchOutOfRange`] when fewer than two bytes remain.
    pub fn fetch(&self, address: u16) -> Result<u16, VmError> {
        read_u16_be(&self.image, usize::from(address)).ok_or(VmError::FetchOutOfRange {
            address,
            len: self.image.len(),
        })
    }

    /// Image bytes.
    #[must_use]
    pub fn image(&self) -> &[u8] {
        &self.image
    }

    /// Mutable image bytes, for instructions that write memory.
    #[must_use]
    pub fn image_mut(&mut self) -> &mut [u8] {
        &mut self.image
    }

    /// Consumes the program and returns its image.
    #[must_use]
    pub fn into_image(self) -> Vec<u8> {
        self.image
    }
}

/// Reads a big-endian `u16` at `offset`, if both bytes are present.
#[must_use]
pub fn read_u16_be(bytes: &[u8], offset: usize) -> Option<u16> {
    let end = offset.checked_add(2)?;
    let pair = bytes.get(offset..end)?;
    Some(u16::from_be_bytes([pair[0], pair[1]]))
}
