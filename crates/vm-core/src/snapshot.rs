//! Versioned, architecture-tagged machine state.

use crate::fault::VmError;
use crate::program::MAX_IMAGE_LEN;

/// Stable snapshot wire-version identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[repr(u16)]
pub enum SnapshotVersion {
    /// Initial layout.
    V1 = 1,
}

impl SnapshotVersion {
    /// Version written by this build.
    pub const CURRENT: Self = Self::V1;

    /// Converts a wire value to a known version.
    #[must_use]
    pub const fn from_u16(version: u16) -> Option<Self> {
        match version {
            1 => Some(Self::V1),
            _ => None,
        }
    }

    /// Wire value.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }
}

/// Full engine and architecture state, as captured by [`crate::Vm::snapshot`].
///
/// `S` is the architecture's [`crate::Architecture::State`]. The version is
/// kept as its wire value so snapshots from other builds can be read and
/// refused cleanly.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Snapshot<S> {
    /// Snapshot format version, see [`SnapshotVersion`].
    pub version: u16,
    /// Architecture tag of the machine that took the snapshot.
    pub architecture: String,
    /// Program counter.
    pub pc: u16,
    /// Instructions executed since the last reset.
    pub tick_count: u64,
    /// Program image, guest writes included.
    pub image: Vec<u8>,
    /// Architecture state.
    pub state: S,
}

impl<S> Snapshot<S> {
    /// Checks the version, the architecture tag, and the engine fields, in
    /// that order.
    ///
    /// # Errors
    ///
    /// Returns [`VmError::VersionMismatch`], [`VmError::ArchitectureMismatch`],
    /// or [`VmError::MalformedSnapshot`] when the image does not fit a 16-bit
    /// program counter or the PC lies past its end.
    pub fn validate(&self, architecture: &'static str) -> Result<SnapshotVersion, VmError> {
        let version =
            SnapshotVersion::from_u16(self.version).ok_or(VmError::VersionMismatch {
                found: self.version,
                expected: SnapshotVersion::CURRENT.as_u16(),
            })?;
        if self.architecture != architecture {
            return Err(VmError::ArchitectureMismatch {
                found: self.architecture.clone(),
                expected: architecture,
            });
        }
        if self.image.len() > MAX_IMAGE_LEN {
            return Err(VmError::MalformedSnapshot {
                reason: "image exceeds the address space",
            });
        }
        if usize::from(self.pc) > self.image.len() {
            return Err(VmError::MalformedSnapshot {
                reason: "program counter outside image",
            });
        }
        Ok(version)
    }

    /// Converts the architecture state, keeping every engine field.
    #[must_use]
    pub fn map_state<T>(self, convert: impl FnOnce(S) -> T) -> Snapshot<T> {
        Snapshot {
            version: self.version,
            architecture: self.architecture,
            pc: self.pc,
            tick_count: self.tick_count,
            image: self.image,
            state: convert(self.state),
        }
    }
}
