/// `8XY6`/`8XYE` shift `VY` into `VX` instead of shifting `VX` in place.
pub const SHIFT_USES_VY: &str = "shift_uses_vy";
/// `FX55`/`FX65` leave `I` pointing past the last register transferred.
pub const LOAD_STORE_INCREMENTS_I: &str = "load_store_increments_i";
/// `BNNN` adds `VX` (X = high nibble of NNN) instead of `V0`.
pub const JUMP_USES_VX: &str = "jump_uses_vx";
/// `8XY1`/`8XY2`/`8XY3` clear `VF`.
pub const LOGIC_RESETS_VF: &str = "logic_resets_vf";

/// Behaviour switches for interpreter variants, exposed as debug options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[allow(clippy::struct_excessive_bools)]
pub struct Quirks {
    /// See [`SHIFT_USES_VY`].
    pub shift_uses_vy: bool,
    /// See [`LOAD_STORE_INCREMENTS_I`].
    pub load_store_increments_i: bool,
    /// See [`JUMP_USES_VX`].
    pub jump_uses_vx: bool,
    /// See [`LOGIC_RESETS_VF`].
    pub logic_resets_vf: bool,
}

impl Quirks {
    /// Every option name, in declaration order.
    pub const NAMES: [&'static str; 4] = [
        SHIFT_USES_VY,
        LOAD_STORE_INCREMENTS_I,
        JUMP_USES_VX,
        LOGIC_RESETS_VF,
    ];

    /// Behaviour of the original COSMAC VIP interpreter.
    #[must_use]
    pub const fn cosmac_vip() -> Self {
        Self {
            shift_uses_vy: true,
            load_store_increments_i: true,
            jump_uses_vx: false,
            logic_resets_vf: true,
        }
    }

    fn flag_mut(&mut self, name: &str) -> Option<&mut bool> {
        match name {
            SHIFT_USES_VY => Some(&mut self.shift_uses_vy),
            LOAD_STORE_INCREMENTS_I => Some(&mut self.load_store_increments_i),
            JUMP_USES_VX => Some(&mut self.jump_uses_vx),
            LOGIC_RESETS_VF => Some(&mut self.logic_resets_vf),
            _ => None,
        }
    }

    /// Reads a quirk by option name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<bool> {
        match name {
            SHIFT_USES_VY => Some(self.shift_uses_vy),
            LOAD_STORE_INCREMENTS_I => Some(self.load_store_increments_i),
            JUMP_USES_VX => Some(self.jump_uses_vx),
            LOGIC_RESETS_VF => Some(self.logic_resets_vf),
            _ => None,
        }
    }

    /// Sets a quirk by option name. Returns the new value, or `None` for an
    /// unknown name.
    pub fn set(&mut self, name: &str, value: bool) -> Option<bool> {
        let flag = self.flag_mut(name)?;
        *flag = value;
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::{Quirks, JUMP_USES_VX};

    #[test]
    fn named_access_reads_and_writes_flags() {
        let mut quirks = Quirks::default();
        assert_eq!(quirks.get(JUMP_USES_VX), Some(false));
        assert_eq!(quirks.set(JUMP_USES_VX, true), Some(true));
        assert!(quirks.jump_uses_vx);
        assert_eq!(quirks.get("wrap_sprites"), None);
        assert_eq!(quirks.set("wrap_sprites", true), None);
    }

    #[test]
    fn every_listed_name_is_readable() {
        let quirks = Quirks::cosmac_vip();
        assert_eq!(quirks.get("jump_uses_vx"), Some(false));
        assert_eq!(quirks.get("logic_resets_vf"), Some(true));
        for name in Quirks::NAMES {
            assert!(quirks.get(name).is_some());
        }
    }
}
