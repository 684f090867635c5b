use thiserror::Error;

/// Fault classes used to route errors to the party that can act on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum FaultClass {
    /// ISA-authoring bug caught while building masks or operations.
    Construction,
    /// Fault raised by the guest program while stepping.
    Guest,
    /// Program source could not be turned into an image.
    Loader,
    /// Host integration misused the engine API.
    Usage,
}

/// Structural errors raised while constructing an [`crate::OpMask`] or [`crate::Operation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum MaskError {
    /// A mask has bits set above the 16-bit instruction word.
    #[error("mask {mask:#X} exceeds the 16-bit instruction word")]
    OutOfRange {
        /// Offending mask as supplied.
        mask: u32,
    },
    /// The match mask selects no bits.
    #[error("match mask is empty")]
    EmptyMatchMask,
    /// An operand mask selects no bits.
    #[error("operand {index} mask is empty")]
    EmptyOperandMask {
        /// Zero-based operand index.
        index: usize,
    },
    /// More operand masks were supplied than an instruction can carry.
    #[error("{count} operand masks supplied, at most {max} are supported")]
    TooManyOperands {
        /// Number of operand masks supplied.
        count: usize,
        /// Maximum supported operand count.
        max: usize,
    },
    /// Two masks share at least one bit.
    #[error("mask {first:#06X} overlaps mask {second:#06X}")]
    Overlap {
        /// Earlier mask in declaration order.
        first: u16,
        /// Later mask in declaration order.
        second: u16,
    },
    /// An operand mask is not strictly less significant than the one before it.
    #[error("operand {index} mask {mask:#06X} is not below the previous operand")]
    Misordered {
        /// Zero-based operand index.
        index: usize,
        /// Offending operand mask.
        mask: u16,
    },
    /// The match mask spans a single bit, which leaves no positive priority.
    #[error("match mask {mask:#06X} has zero bit span")]
    ZeroSpan {
        /// Offending match mask.
        mask: u16,
    },
    /// The opcode constant has bits outside its match mask.
    #[error("opcode {opcode:#06X} has bits outside match mask {mask:#06X}")]
    OpcodeOutsideMask {
        /// Opcode constant.
        opcode: u16,
        /// Match mask the opcode must fit in.
        mask: u16,
    },
}

/// Errors raised by an architecture loader while producing a program image.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error)]
pub enum LoaderError {
    /// The architecture cannot load this kind of source.
    #[error("{architecture} loader does not support {kind} sources")]
    Unsupported {
        /// Architecture tag of the loader.
        architecture: &'static str,
        /// Kind of source that was offered.
        kind: &'static str,
    },
    /// The source contained no program bytes.
    #[error("program is empty")]
    Empty,
    /// The program does not fit the architecture's program space.
    #[error("program of {len} bytes exceeds the {max}-byte limit")]
    TooLarge {
        /// Program length in bytes.
        len: usize,
        /// Largest accepted program length in bytes.
        max: usize,
    },
    /// Hex text could not be parsed into bytes.
    #[error("malformed hex near token {token}")]
    MalformedHex {
        /// Zero-based index of the whitespace-separated token at fault.
        token: usize,
    },
}

/// Every error the engine can surface to a host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error)]
pub enum VmError {
    /// Operation table could not be built.
    #[error("invalid instruction set: {0}")]
    Construction(#[from] MaskError),
    /// No operation in the table matches the instruction word.
    #[error("unknown opcode {word:#06X}")]
    UnknownOpcode {
        /// Instruction word that failed to decode.
        word: u16,
    },
    /// A push exceeded the call stack capacity.
    #[error("call stack overflow (capacity {capacity})")]
    StackOverflow {
        /// Capacity of the overflowed stack.
        capacity: usize,
    },
    /// A pop or peek found the call stack empty.
    #[error("call stack underflow")]
    StackUnderflow,
    /// Instruction fetch needed bytes beyond the image.
    #[error("fetch at {address:#06X} is outside the {len}-byte image")]
    FetchOutOfRange {
        /// Fetch address.
        address: u16,
        /// Image length in bytes.
        len: usize,
    },
    /// A data access by an instruction fell outside the image.
    #[error("memory access at {address:#06X} is outside the {len}-byte image")]
    MemoryOutOfRange {
        /// First address that could not be accessed.
        address: usize,
        /// Image length in bytes.
        len: usize,
    },
    /// The program counter advanced past the end of the image.
    #[error("program counter {pc:#06X} ran past the {len}-byte image")]
    ProgramOverrun {
        /// Address the advance would reach. May be one past `u16::MAX`.
        pc: usize,
        /// Image length in bytes.
        len: usize,
    },
    /// The architecture loader rejected the program source.
    #[error(transparent)]
    Loader(#[from] LoaderError),
    /// An await was requested while another one is pending.
    #[error("already awaiting event `{pending}`")]
    AlreadyAwaiting {
        /// Event name of the pending await.
        pending: &'static str,
    },
    /// `step` was entered while an instruction was still in flight.
    #[error("step entered while an instruction is in flight")]
    ReentrantStep,
    /// The operation requires a loaded program.
    #[error("no program loaded")]
    NoProgramLoaded,
    /// The architecture does not know this debug option.
    #[error("unknown debug option `{name}`")]
    UnknownDebugOption {
        /// Option name as requested.
        name: String,
    },
    /// Snapshot format version is not understood.
    #[error("snapshot version {found} is not supported (expected {expected})")]
    VersionMismatch {
        /// Version found in the blob.
        found: u16,
        /// Version this build writes.
        expected: u16,
    },
    /// Snapshot was taken on a different architecture.
    #[error("snapshot was taken on `{found}`, this machine is `{expected}`")]
    ArchitectureMismatch {
        /// Architecture tag found in the blob.
        found: String,
        /// Architecture tag of the restoring machine.
        expected: &'static str,
    },
    /// Snapshot bytes are truncated or inconsistent.
    #[error("malformed snapshot: {reason}")]
    MalformedSnapshot {
        /// Short description of the defect.
        reason: &'static str,
    },
}

impl VmError {
    /// Returns the fault class for this error.
    #[must_use]
    pub const fn class(&self) -> FaultClass {
        match self {
            Self::Construction(_) => FaultClass::Construction,
            Self::UnknownOpcode { .. }
            | Self::StackOverflow { .. }
            | Self::StackUnderflow
            | Self::FetchOutOfRange { .. }
            | Self::MemoryOutOfRange { .. }
            | Self::ProgramOverrun { .. } => FaultClass::Guest,
            Self::Loader(_) => FaultClass::Loader,
            Self::AlreadyAwaiting { .. }
            | Self::ReentrantStep
            | Self::NoProgramLoaded
            | Self::UnknownDebugOption { .. }
            | Self::VersionMismatch { .. }
            | Self::ArchitectureMismatch { .. }
            | Self::MalformedSnapshot { .. } => FaultClass::Usage,
        }
    }

    /// Faults the guest program can trigger by itself.
    #[must_use]
    pub const fn is_guest_fault(&self) -> bool {
        matches!(self.class(), FaultClass::Guest)
    }
}

#[cfg(test)]
mod tests {
    use super::{FaultClass, LoaderError, MaskError, VmError};

    #[test]
    fn class_mapping_matches_fault_taxonomy() {
        assert_eq!(
            VmError::Construction(MaskError::EmptyMatchMask).class(),
            FaultClass::Construction
        );
        assert_eq!(
            VmError::UnknownOpcode { word: 0xFFFF }.class(),
            FaultClass::Guest
        );
        assert_eq!(VmError::StackUnderflow.class(), FaultClass::Guest);
        assert_eq!(
            VmError::ProgramOverrun { pc: 2, len: 0 }.class(),
            FaultClass::Guest
        );
        assert_eq!(
            VmError::Loader(LoaderError::Empty).class(),
            FaultClass::Loader
        );
        assert_eq!(VmError::ReentrantStep.class(), FaultClass::Usage);
        assert_eq!(
            VmError::AlreadyAwaiting { pending: "keydown" }.class(),
            FaultClass::Usage
        );
    }

    #[test]
    fn only_guest_faults_report_as_guest() {
        assert!(VmError::StackOverflow { capacity: 16 }.is_guest_fault());
        assert!(!VmError::NoProgramLoaded.is_guest_fault());
        assert!(!VmError::MalformedSnapshot { reason: "truncated" }.is_guest_fault());
    }

    #[test]
    fn mask_errors_convert_into_construction_faults() {
        let err: VmError = MaskError::ZeroSpan { mask: 0x8000 }.into();
        assert_eq!(err, VmError::Construction(MaskError::ZeroSpan { mask: 0x8000 }));
        assert_eq!(
            err.to_string(),
            "invalid instruction set: match mask 0x8000 has zero bit span"
        );
    }

    #[test]
    fn loader_errors_display_transparently() {
        let err: VmError = LoaderError::Unsupported {
            architecture: "chip-8",
            kind: "hex",
        }
        .into();
        assert_eq!(err.to_string(), "chip-8 loader does not support hex sources");
    }
}
