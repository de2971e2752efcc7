//! Pixel unpacker
//!
//! Wire bytes address the canvas linearly: pixel `p` sits at
//! `(p % width, p / width)` regardless of byte boundaries, so a byte can
//! straddle two rows. Mono bytes carry 8 pixels LSB-first; 4-gray bytes carry
//! 4 pixels, most significant pair first.

use crate::config::ColorDepth;
use crate::error::ProtocolError;
use crate::framebuffer::{Canvas, Color, Framebuffer, Gray};

/// Write cursor for one session, counted in wire bytes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Unpacker {
    cursor: usize,
}

impl Unpacker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Wire bytes a canvas accepts before [`ProtocolError::Overrun`]
    pub fn capacity(canvas: Canvas, depth: ColorDepth) -> usize {
        canvas.pixels().div_ceil(Canvas::pixels_per_byte(depth))
    }

    /// Unpack `residual` into `fb` at the cursor and advance it
    ///
    /// Pixels of the final byte that land past the last row are padding. A
    /// byte that starts past the last pixel is an overrun; bytes before it
    /// have already been written.
    pub fn write(&mut self, fb: &mut Framebuffer, residual: &[u8]) -> Result<usize, ProtocolError> {
        let canvas = fb.canvas();
        let depth = fb.depth();
        let per_byte = Canvas::pixels_per_byte(depth);
        let total = canvas.pixels();
        // Rows that start on a byte boundary let whole bytes be copied
        let aligned = canvas.width as usize % per_byte == 0;

        for &byte in residual {
            let first = self.cursor * per_byte;
            if first >= total {
                log::error!(
                    "Pixel stream overrun at byte {} of a {}x{} canvas",
                    self.cursor,
                    canvas.width,
                    canvas.height
                );
                return Err(ProtocolError::Overrun);
            }

            match (depth, aligned) {
                (ColorDepth::Mono, true) => {
                    fb.write_bytes(self.cursor, &[byte.reverse_bits()]);
                }
                (ColorDepth::Gray4, true) => {
                    fb.write_bytes(self.cursor, &[byte]);
                }
                (ColorDepth::Mono, false) => {
                    for i in 0..8 {
                        let p = first + i;
                        if p >= total {
                            break;
                        }
                        let (x, y) = locate(canvas, p);
                        fb.set_pixel(x, y, Color::from_bit(byte >> i));
                    }
                }
                (ColorDepth::Gray4, false) => {
                    for k in 0..4 {
                        let p = first + k;
                        if p >= total {
                            break;
                        }
                        let (x, y) = locate(canvas, p);
                        fb.set_gray(x, y, Gray::from_bits(byte >> (6 - 2 * k)));
                    }
                }
            }
            self.cursor += 1;
        }

        Ok(self.cursor)
    }
}

fn locate(canvas: Canvas, p: usize) -> (u16, u16) {
    let width = canvas.width as usize;
    ((p % width) as u16, (p / width) as u16)
}
