/// Number of keys on the hex keypad.
pub const KEY_COUNT: u8 = 16;

/// Input latch: one bit per key, set while held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Keypad {
    latch: u16,
}

impl Keypad {
    /// Latch bits, key 0 in bit 0.
    #[must_use]
    pub const fn bits(&self) -> u16 {
        self.latch
    }

    /// Marks `key` as held. Only the low nibble is used.
    pub const fn press(&mut self, key: u8) {
        self.latch |= 1 << (key & 0xF);
    }

    /// Marks `key` as released. Only the low nibble is used.
    pub const fn release(&mut self, key: u8) {
        self.latch &= !(1 << (key & 0xF));
    }

    /// Returns true while `key` is held.
    #[must_use]
    pub const fn is_down(&self, key: u8) -> bool {
        self.latch & (1 << (key & 0xF)) != 0
    }

    /// Releases every key.
    pub const fn release_all(&mut self) {
        self.latch = 0;
    }
}
