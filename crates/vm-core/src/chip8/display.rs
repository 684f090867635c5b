//! 64×32 monochrome frame buffer.

/// Display width in pixels.
pub const DISPLAY_WIDTH: usize = 64;

/// Display height in pixels.
pub const DISPLAY_HEIGHT: usize = 32;

/// Frame buffer, one `u64` per row, most significant bit leftmost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Display {
    rows: [u64; DISPLAY_HEIGHT],
}

impl Default for Display {
    fn default() -> Self {
        Self {
            rows: [0; DISPLAY_HEIGHT],
        }
    }
}

impl Display {
    /// Raw rows, top first.
    #[must_use]
    pub const fn rows(&self) -> &[u64; DISPLAY_HEIGHT] {
        &self.rows
    }

    /// Returns true when the pixel at `(x, y)` is lit. Out-of-range reads are dark.
    #[must_use]
    pub fn pixel(&self, x: usize, y: usize) -> bool {
        x < DISPLAY_WIDTH
            && self
                .rows
                .get(y)
                .is_some_and(|row| (row >> (DISPLAY_WIDTH - 1 - x)) & 1 == 1)
    }

    /// Number of lit pixels.
    #[must_use]
    pub fn lit_count(&self) -> u32 {
        self.rows.iter().map(|row| row.count_ones()).sum()
    }

    /// Turns every pixel off.
    pub fn clear(&mut self) {
        self.rows = [0; DISPLAY_HEIGHT];
    }

    /// XORs an 8-pixel-wide sprite at `(x, y)`.
    ///
    /// The origin wraps around the screen, pixels past the right or bottom
    /// edge are clipped. Returns true when any lit pixel was turned off.
    pub fn draw_sprite(&mut self, x: u8, y: u8, sprite: &[u8]) -> bool {
        let x0 = usize::from(x) % DISPLAY_WIDTH;
        let y0 = usize::from(y) % DISPLAY_HEIGHT;
        let mut collision = false;
        for (row, line) in self.rows.iter_mut().skip(y0).zip(sprite) {
            let bits = (u64::from(*line) << (DISPLAY_WIDTH - 8)) >> x0;
            collision |= *row & bits != 0;
            *row ^= bits;
        }
        collision
    }
}
