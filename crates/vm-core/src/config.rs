use crate::timing::DEFAULT_CLOCK_SPEED_HZ;

/// Engine configuration for a [`crate::Vm`] instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct VmConfig {
    /// Instruction clock fed to the architecture's divided timers.
    pub clock_speed_hz: u32,
    /// Enables the word-keyed decode cache.
    pub decode_cache: bool,
    /// Binds compiled procedures on first decode. Requires `decode_cache`.
    pub compiled_operations: bool,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            clock_speed_hz: DEFAULT_CLOCK_SPEED_HZ,
            decode_cache: true,
            compiled_operations: true,
        }
    }
}

impl VmConfig {
    /// Plain interpreter: no cache, no compiled procedures.
    #[must_use]
    pub fn interpreted() -> Self {
        Self {
            decode_cache: false,
            compiled_operations: false,
            ..Self::default()
        }
    }

    /// Returns true when compiled procedures will actually be bound.
    #[must_use]
    pub const fn compiles(&self) -> bool {
        self.decode_cache && self.compiled_operations
    }
}
