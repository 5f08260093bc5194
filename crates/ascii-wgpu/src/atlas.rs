//! Built-in glyph atlases
//!
//! Atlases are single-row strips of 8x8 glyphs. The composite reads the red
//! channel as glyph coverage: fill glyph `i` sits at x offset `8 * i`, edge
//! direction `d` uses edge glyph `d + 1` (glyph 0 is blank).

use crate::codec::PixelBuffer;

/// Width and height of one glyph tile in pixels
pub const GLYPH_SIZE: u32 = 8;

/// Characters of the fill ramp, darkest first
pub const FILL_RAMP: &str = " .:-=+*#%@";

/// One row per byte, most significant bit on the left
type Glyph = [u8; 8];

const FILL_GLYPHS: [Glyph; 10] = [
    // ' '
    [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00],
    // '.'
    [0x00, 0x00, 0x00, 0x00, 0x00, 0x18, 0x18, 0x00],
    // ':'
    [0x00, 0x18, 0x18, 0x00, 0x00, 0x18, 0x18, 0x00],
    // '-'
    [0x00, 0x00, 0x00, 0x7E, 0x00, 0x00, 0x00, 0x00],
    // '='
    [0x00, 0x00, 0x7E, 0x00, 0x7E, 0x00, 0x00, 0x00],
    // '+'
    [0x00, 0x18, 0x18, 0x7E, 0x18, 0x18, 0x00, 0x00],
    // '*'
    [0x00, 0x66, 0x3C, 0xFF, 0x3C, 0x66, 0x00, 0x00],
    // '#'
    [0x00, 0x66, 0xFF, 0x66, 0x66, 0xFF, 0x66, 0x00],
    // '%'
    [0x00, 0xC6, 0xCC, 0x18, 0x30, 0x66, 0xC6, 0x00],
    // '@'
    [0x3C, 0x66, 0x6E, 0x6E, 0x60, 0x62, 0x3C, 0x00],
];

const EDGE_GLYPHS: [Glyph; 5] = [
    // blank
    [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00],
    // '|'
    [0x18, 0x18, 0x18, 0x18, 0x18, 0x18, 0x18, 0x18],
    // '_'
    [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xFF],
    // '/'
    [0x01, 0x02, 0x04, 0x08, 0x10, 0x20, 0x40, 0x80],
    // '\'
    [0x80, 0x40, 0x20, 0x10, 0x08, 0x04, 0x02, 0x01],
];

/// The 80x8 fill atlas for [`FILL_RAMP`]
pub fn fill_atlas() -> PixelBuffer {
    rasterize(&FILL_GLYPHS)
}

/// The 40x8 edge atlas: blank, vertical, horizontal and the two diagonals
pub fn edge_atlas() -> PixelBuffer {
    rasterize(&EDGE_GLYPHS)
}

fn rasterize(glyphs: &[Glyph]) -> PixelBuffer {
    let width = GLYPH_SIZE * glyphs.len() as u32;
    let mut data = Vec::with_capacity((width * GLYPH_SIZE) as usize);

    for row in 0..GLYPH_SIZE as usize {
        for glyph in glyphs {
            for bit in (0..GLYPH_SIZE).rev() {
                data.push(if glyph[row] >> bit & 1 == 1 { 255 } else { 0 });
            }
        }
    }

    PixelBuffer {
        width,
        height: GLYPH_SIZE,
        channels: 1,
        data,
    }
}
