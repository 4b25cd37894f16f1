//! Braille glyphs for terminal output.
//!
//! Each character cell holds a 2x4 grid of dots, mapped onto the Unicode
//! Braille patterns U+2800 to U+28FF.

pub const DOTS_X: usize = 2;
pub const DOTS_Y: usize = 4;

/// Bit for the dot at column `x`, row `y` of a cell.
/// ```text
/// (0,0) (1,0)   bits: 0x01 0x08
/// (0,1) (1,1)   bits: 0x02 0x10
/// (0,2) (1,2)   bits: 0x04 0x20
/// (0,3) (1,3)   bits: 0x40 0x80
/// ```
pub fn dot_bit(x: usize, y: usize) -> u8 {
    match (x, y) {
        (0, 0) => 0x01,
        (1, 0) => 0x08,
        (0, 1) => 0x02,
        (1, 1) => 0x10,
        (0, 2) => 0x04,
        (1, 2) => 0x20,
        (0, 3) => 0x40,
        (1, 3) => 0x80,
        _ => 0,
    }
}

/// Pattern of one cell; `lit(x, y)` decides each dot
pub fn cell_bits(mut lit: impl FnMut(usize, usize) -> bool) -> u8 {
    let mut bits = 0;
    for y in 0..DOTS_Y {
        for x in 0..DOTS_X {
            if lit(x, y) {
                bits |= dot_bit(x, y);
            }
        }
    }
    bits
}

pub fn glyph(bits: u8) -> char {
    char::from_u32(0x2800 + bits as u32).unwrap_or(' ')
}
