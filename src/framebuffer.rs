//! Packed framebuffer for one ingestion session
//!
//! Rows are `stride` bytes long and pixels are stored MSB-first, the layout
//! the panel's data transmission commands expect. In mono a set bit is white;
//! in 4-gray every pixel is a two-bit level, white being `0b11`.

use embedded_graphics::{
    pixelcolor::BinaryColor,
    prelude::{DrawTarget, OriginDimensions, Pixel, Size},
};

use crate::config::ColorDepth;
use crate::{HEIGHT, WIDTH};

/// Monochrome pixel value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    Black,
    White,
}

impl Color {
    /// Wire convention: 0 is black, 1 is white
    pub fn from_bit(bit: u8) -> Self {
        if bit & 1 == 0 {
            Color::Black
        } else {
            Color::White
        }
    }

    pub fn bit(self) -> u8 {
        match self {
            Color::Black => 0,
            Color::White => 1,
        }
    }
}

/// Four-level gray as packed by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gray {
    Black = 0b00,
    Dark = 0b01,
    Light = 0b10,
    White = 0b11,
}

impl Gray {
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0b00 => Gray::Black,
            0b01 => Gray::Dark,
            0b10 => Gray::Light,
            _ => Gray::White,
        }
    }
}

impl From<Color> for Gray {
    fn from(color: Color) -> Self {
        match color {
            Color::Black => Gray::Black,
            Color::White => Gray::White,
        }
    }
}

/// Pixel dimensions of the area a session draws into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Canvas {
    pub width: u16,
    pub height: u16,
}

impl Canvas {
    pub const fn new(width: u16, height: u16) -> Self {
        Self { width, height }
    }

    /// The whole 800×480 panel
    pub const fn full() -> Self {
        Self::new(WIDTH, HEIGHT)
    }

    pub fn pixels(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Pixels carried by one byte
    pub fn pixels_per_byte(depth: ColorDepth) -> usize {
        match depth {
            ColorDepth::Mono => 8,
            ColorDepth::Gray4 => 4,
        }
    }

    /// Bytes per packed row, padding bits included
    pub fn stride(&self, depth: ColorDepth) -> usize {
        (self.width as usize).div_ceil(Self::pixels_per_byte(depth))
    }

    pub fn byte_len(&self, depth: ColorDepth) -> usize {
        self.stride(depth) * self.height as usize
    }
}

/// Packed pixel storage sized to a [`Canvas`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Framebuffer {
    canvas: Canvas,
    depth: ColorDepth,
    buf: Vec<u8>,
}

impl Framebuffer {
    /// Allocate a buffer cleared to white
    pub fn new(canvas: Canvas, depth: ColorDepth) -> Self {
        Self {
            canvas,
            depth,
            buf: vec![0xFF; canvas.byte_len(depth)],
        }
    }

    pub fn canvas(&self) -> Canvas {
        self.canvas
    }

    pub fn depth(&self) -> ColorDepth {
        self.depth
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Fill every pixel, padding included, with `color`
    pub fn clear(&mut self, color: Color) {
        let fill = match color {
            Color::Black => 0x00,
            Color::White => 0xFF,
        };
        self.buf.fill(fill);
    }

    fn in_bounds(&self, x: u16, y: u16) -> bool {
        x < self.canvas.width && y < self.canvas.height
    }

    /// Set one pixel; out-of-canvas coordinates are ignored and reported
    pub fn set_pixel(&mut self, x: u16, y: u16, color: Color) -> bool {
        match self.depth {
            ColorDepth::Mono => {
                if !self.in_bounds(x, y) {
                    return false;
                }
                let index = y as usize * self.canvas.stride(self.depth) + x as usize / 8;
                let mask = 0x80 >> (x % 8);
                match color {
                    Color::Black => self.buf[index] &= !mask,
                    Color::White => self.buf[index] |= mask,
                }
                true
            }
            ColorDepth::Gray4 => self.set_gray(x, y, color.into()),
        }
    }

    /// Set one 4-gray pixel; a mono buffer keeps only white vs. non-white
    pub fn set_gray(&mut self, x: u16, y: u16, level: Gray) -> bool {
        match self.depth {
            ColorDepth::Mono => {
                let color = if level == Gray::White {
                    Color::White
                } else {
                    Color::Black
                };
                self.set_pixel(x, y, color)
            }
            ColorDepth::Gray4 => {
                if !self.in_bounds(x, y) {
                    return false;
                }
                let index = y as usize * self.canvas.stride(self.depth) + x as usize / 4;
                let shift = 6 - 2 * (x % 4);
                self.buf[index] = (self.buf[index] & !(0b11 << shift)) | ((level as u8) << shift);
                true
            }
        }
    }

    pub fn pixel(&self, x: u16, y: u16) -> Option<Color> {
        if !self.in_bounds(x, y) {
            return None;
        }
        match self.depth {
            ColorDepth::Mono => {
                let index = y as usize * self.canvas.stride(self.depth) + x as usize / 8;
                Some(Color::from_bit(self.buf[index] >> (7 - x % 8)))
            }
            ColorDepth::Gray4 => self.gray(x, y).map(|level| {
                if level == Gray::White {
                    Color::White
                } else {
                    Color::Black
                }
            }),
        }
    }

    pub fn gray(&self, x: u16, y: u16) -> Option<Gray> {
        if !self.in_bounds(x, y) {
            return None;
        }
        match self.depth {
            ColorDepth::Mono => self.pixel(x, y).map(Gray::from),
            ColorDepth::Gray4 => {
                let index = y as usize * self.canvas.stride(self.depth) + x as usize / 4;
                Some(Gray::from_bits(self.buf[index] >> (6 - 2 * (x % 4))))
            }
        }
    }

    /// Copy already-packed bytes in at `offset`
    ///
    /// Returns `false` and leaves the buffer untouched when the run does not fit.
    pub fn write_bytes(&mut self, offset: usize, bytes: &[u8]) -> bool {
        match offset.checked_add(bytes.len()) {
            Some(end) if end <= self.buf.len() => {
                self.buf[offset..end].copy_from_slice(bytes);
                true
            }
            _ => false,
        }
    }
}

impl OriginDimensions for Framebuffer {
    fn size(&self) -> Size {
        Size::new(self.canvas.width as u32, self.canvas.height as u32)
    }
}

/// `BinaryColor::On` draws black ink, matching the rest of the firmware
impl DrawTarget for Framebuffer {
    type Color = BinaryColor;
    type Error = core::convert::Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            if point.x < 0 || point.y < 0 || point.x > u16::MAX as i32 || point.y > u16::MAX as i32
            {
                continue;
            }
            let color = match color {
                BinaryColor::On => Color::Black,
                BinaryColor::Off => Color::White,
            };
            self.set_pixel(point.x as u16, point.y as u16, color);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_graphics::{
        prelude::*,
        primitives::{PrimitiveStyle, Rectangle},
    };

    #[test]
    fn new_buffer_is_white_and_sized() {
        let fb = Framebuffer::new(Canvas::full(), ColorDepth::Mono);
        assert_eq!(fb.as_bytes().len(), 800 * 480 / 8);
        assert!(fb.as_bytes().iter().all(|&b| b == 0xFF));

        let fb = Framebuffer::new(Canvas::new(30, 40), ColorDepth::Mono);
        assert_eq!(fb.as_bytes().len(), 4 * 40);

        let fb = Framebuffer::new(Canvas::full(), ColorDepth::Gray4);
        assert_eq!(fb.as_bytes().len(), 800 * 480 * 2 / 8);
    }

    #[test]
    fn mono_pixels_are_msb_first() {
        let mut fb = Framebuffer::new(Canvas::new(16, 2), ColorDepth::Mono);
        assert!(fb.set_pixel(0, 0, Color::Black));
        assert!(fb.set_pixel(9, 1, Color::Black));
        assert_eq!(fb.as_bytes(), &[0x7F, 0xFF, 0xFF, 0xBF]);
        assert_eq!(fb.pixel(9, 1), Some(Color::Black));
        assert_eq!(fb.pixel(8, 1), Some(Color::White));

        fb.set_pixel(0, 0, Color::White);
        assert_eq!(fb.as_bytes()[0], 0xFF);
    }

    #[test]
    fn out_of_bounds_pixels_are_ignored() {
        let mut fb = Framebuffer::new(Canvas::new(10, 2), ColorDepth::Mono);
        assert!(!fb.set_pixel(10, 0, Color::Black));
        assert!(!fb.set_pixel(0, 2, Color::Black));
        assert!(fb.as_bytes().iter().all(|&b| b == 0xFF));
        assert_eq!(fb.pixel(10, 0), None);
    }

    #[test]
    fn gray_levels_pack_msb_pair_first() {
        let mut fb = Framebuffer::new(Canvas::new(4, 1), ColorDepth::Gray4);
        fb.set_gray(0, 0, Gray::Black);
        fb.set_gray(1, 0, Gray::Dark);
        fb.set_gray(2, 0, Gray::Light);
        assert_eq!(fb.as_bytes(), &[0b00_01_10_11]);
        assert_eq!(fb.gray(2, 0), Some(Gray::Light));
        assert_eq!(fb.pixel(1, 0), Some(Color::Black));
        assert_eq!(fb.pixel(3, 0), Some(Color::White));
    }

    #[test]
    fn write_bytes_rejects_runs_past_the_end() {
        let mut fb = Framebuffer::new(Canvas::new(16, 1), ColorDepth::Mono);
        assert!(fb.write_bytes(1, &[0x00]));
        assert!(!fb.write_bytes(1, &[0x00, 0x00]));
        assert_eq!(fb.as_bytes(), &[0xFF, 0x00]);
    }

    #[test]
    fn clear_resets_to_baseline() {
        let mut fb = Framebuffer::new(Canvas::new(8, 2), ColorDepth::Mono);
        fb.clear(Color::Black);
        assert_eq!(fb.as_bytes(), &[0x00, 0x00]);
        fb.clear(Color::White);
        assert_eq!(fb.as_bytes(), &[0xFF, 0xFF]);
    }

    #[test]
    fn draw_target_maps_on_to_black() {
        let mut fb = Framebuffer::new(Canvas::new(16, 4), ColorDepth::Mono);
        Rectangle::new(Point::new(0, 1), Size::new(8, 2))
            .into_styled(PrimitiveStyle::with_fill(BinaryColor::On))
            .draw(&mut fb)
            .unwrap();
        assert_eq!(fb.as_bytes(), &[0xFF, 0xFF, 0x00, 0xFF, 0x00, 0xFF, 0xFF, 0xFF]);
    }
}
