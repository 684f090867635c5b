/// Number of general-purpose byte registers (`V0..VF`).
pub const REGISTER_COUNT: usize = 16;

/// Index of the flag register `VF`.
pub const FLAG_REGISTER: usize = 0xF;

/// `V0..VF` and the index register `I`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Registers {
    v: [u8; REGISTER_COUNT],
    i: u16,
}

impl Registers {
    /// Reads `Vx`. Only the low nibble of `index` is used.
    #[must_use]
    pub const fn v(&self, index: usize) -> u8 {
        self.v[index & 0xF]
    }

    /// Writes `Vx`. Only the low nibble of `index` is used.
    pub const fn set_v(&mut self, index: usize, value: u8) {
        self.v[index & 0xF] = value;
    }

    /// Reads `VF`.
    #[must_use]
    pub const fn vf(&self) -> u8 {
        self.v[FLAG_REGISTER]
    }

    /// Writes `VF` as 0 or 1.
    pub const fn set_flag(&mut self, set: bool) {
        self.v[FLAG_REGISTER] = set as u8;
    }

    /// Reads `I`.
    #[must_use]
    pub const fn i(&self) -> u16 {
        self.i
    }

    /// Writes `I`.
    pub const fn set_i(&mut self, value: u16) {
        self.i = value;
    }

    /// All `V` registers.
    #[must_use]
    pub const fn v_all(&self) -> &[u8; REGISTER_COUNT] {
        &self.v
    }
}
