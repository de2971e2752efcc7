//! Wire protocol spoken by the dashboard server
//!
//! ```text
//! byte 0      [7:3] magic 0b11101   [2:0] opcode (0 NOOP, 1 FULL, 2 PART)
//! byte 1      sleep minutes, 1..=240 (anything else means "default")
//! bytes 2..=5 x, y, w, h in pixels, PART only
//! rest        packed pixels, bit i of a byte = pixel i, 0 black / 1 white
//! ```
//!
//! The legacy HTTP revision sends only the sleep byte and always means FULL;
//! see [`crate::config::HeaderSchema`].

mod encode;
mod header;
mod unpack;

pub use encode::{pack_gray, pack_mono};
pub use header::{BoundingBox, Feed, Header, HeaderParser, Opcode, ParseState, MAGIC};
pub use unpack::Unpacker;
