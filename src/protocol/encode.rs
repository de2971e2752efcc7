//! Sender-side packing, the inverse of the unpacker

use super::header::{Header, Opcode};
use crate::framebuffer::{Color, Gray};

impl Header {
    /// Wire bytes of this header in the tagged schema
    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![self.opcode.tag(), self.sleep_minutes];
        if let (Opcode::Part, Some(b)) = (self.opcode, self.bbox) {
            out.extend_from_slice(&[b.x, b.y, b.w, b.h]);
        }
        out
    }
}

/// Pack pixels eight to a byte, pixel `i` in bit `i % 8`
pub fn pack_mono(pixels: &[Color]) -> Vec<u8> {
    pixels
        .chunks(8)
        .map(|group| {
            group
                .iter()
                .enumerate()
                .fold(0u8, |byte, (i, color)| byte | (color.bit() << i))
        })
        .collect()
}

/// Pack 4-gray levels four to a byte, first pixel in the top two bits
pub fn pack_gray(levels: &[Gray]) -> Vec<u8> {
    levels
        .chunks(4)
        .map(|group| {
            group
                .iter()
                .enumerate()
                .fold(0u8, |byte, (k, level)| byte | ((*level as u8) << (6 - 2 * k)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::BoundingBox;

    #[test]
    fn header_bytes_match_the_wire_layout() {
        let full = Header {
            opcode: Opcode::Full,
            sleep_minutes: 10,
            bbox: None,
        };
        assert_eq!(full.encode(), vec![0xE9, 0x0A]);

        let part = Header {
            opcode: Opcode::Part,
            sleep_minutes: 5,
            bbox: Some(BoundingBox::new(10, 20, 30, 40)),
        };
        assert_eq!(part.encode(), vec![0xEA, 0x05, 10, 20, 30, 40]);

        assert_eq!(Opcode::Noop.tag(), 0xE8);
    }

    #[test]
    fn mono_packing_is_lsb_first() {
        use Color::{Black as B, White as W};
        assert_eq!(pack_mono(&[W, B, B, B, B, B, B, B]), vec![0x01]);
        assert_eq!(pack_mono(&[B, B, B, B, B, B, B, W, W]), vec![0x80, 0x01]);
    }

    #[test]
    fn gray_packing_is_msb_pair_first() {
        assert_eq!(pack_gray(&[Gray::White]), vec![0b1100_0000]);
        assert_eq!(
            pack_gray(&[Gray::Black, Gray::Dark, Gray::Light, Gray::White]),
            vec![0b0001_1011]
        );
    }
}
