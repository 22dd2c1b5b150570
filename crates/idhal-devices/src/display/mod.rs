//! Display class drivers.

mod font;
pub mod hd44780;
pub mod ssd1306;

pub use hd44780::Hd44780;
pub use ssd1306::Ssd1306;

use crate::traits::DisplaySpecs;

/// Cursor of a display, in character cells.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cursor {
    pub row: u8,
    pub column: u8,
}

impl Cursor {
    /// The next cell, wrapping to the next row and from the last cell to the first.
    pub fn advance(self, specs: &DisplaySpecs) -> Self {
        if self.column + 1 < specs.h_chars {
            Self {
                row: self.row,
                column: self.column + 1,
            }
        } else {
            Self {
                row: (self.row + 1) % specs.v_chars,
                column: 0,
            }
        }
    }
}
