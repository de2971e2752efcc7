//! Incremental header parser
//!
//! The header arrives split across however many chunks the transport
//! produces. The parser keeps the fields it has seen so far and hands back
//! every byte it did not need as residual pixel data.

use embedded_graphics::prelude::{Point, Size};
use embedded_graphics::primitives::Rectangle;

use crate::config::{DecoderConfig, HeaderSchema};
use crate::error::ProtocolError;
use crate::framebuffer::Canvas;
use crate::{HEIGHT, WIDTH};

/// High five bits of the first header byte
pub const MAGIC: u8 = 0b11101;

/// What the stream asks the node to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    /// Nothing changed; just sleep
    Noop = 0,
    /// Whole-panel refresh
    Full = 1,
    /// Refresh of the bounding box only
    Part = 2,
}

impl TryFrom<u8> for Opcode {
    type Error = ProtocolError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Opcode::Noop),
            1 => Ok(Opcode::Full),
            2 => Ok(Opcode::Part),
            other => Err(ProtocolError::UnknownOpcode(other)),
        }
    }
}

impl Opcode {
    /// First header byte for this opcode
    pub fn tag(self) -> u8 {
        (MAGIC << 3) | self as u8
    }
}

/// Sub-rectangle of a partial refresh, in panel pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub x: u8,
    pub y: u8,
    pub w: u8,
    pub h: u8,
}

impl BoundingBox {
    pub fn new(x: u8, y: u8, w: u8, h: u8) -> Self {
        Self { x, y, w, h }
    }

    fn from_fields(fields: [u8; 4]) -> Self {
        let [x, y, w, h] = fields;
        Self { x, y, w, h }
    }

    pub fn canvas(&self) -> Canvas {
        Canvas::new(self.w as u16, self.h as u16)
    }

    /// Panel area covered by the box
    pub fn rectangle(&self) -> Rectangle {
        Rectangle::new(
            Point::new(self.x as i32, self.y as i32),
            Size::new(self.w as u32, self.h as u32),
        )
    }

    /// Non-empty and entirely on the panel
    pub fn validate(&self) -> Result<(), ProtocolError> {
        let fits = self.w > 0
            && self.h > 0
            && self.x as u16 + self.w as u16 <= WIDTH
            && self.y as u16 + self.h as u16 <= HEIGHT;
        if fits {
            Ok(())
        } else {
            Err(ProtocolError::BadBoundingBox {
                x: self.x,
                y: self.y,
                w: self.w,
                h: self.h,
            })
        }
    }
}

/// A fully parsed header; immutable once produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub opcode: Opcode,
    /// Already clamped to the configured default
    pub sleep_minutes: u8,
    /// Present exactly when `opcode` is [`Opcode::Part`]
    pub bbox: Option<BoundingBox>,
}

impl Header {
    /// Canvas the pixel stream fills; `None` for NOOP
    pub fn canvas(&self) -> Option<Canvas> {
        match self.opcode {
            Opcode::Noop => None,
            Opcode::Full => Some(Canvas::full()),
            Opcode::Part => self.bbox.map(|b| b.canvas()),
        }
    }
}

/// Where the parser is between chunks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseState {
    AwaitingTag,
    AwaitingSleep,
    /// Waiting for box byte `n`: 0 x, 1 y, 2 w, 3 h
    AwaitingField(u8),
    Complete,
}

/// Result of one [`HeaderParser::feed`] call
#[derive(Debug, PartialEq, Eq)]
pub struct Feed<'a> {
    /// Header bytes taken from the front of the chunk
    pub consumed: usize,
    /// Everything after the header in this chunk
    pub residual: &'a [u8],
    pub state: ParseState,
    /// Set only by the call that completed the header
    pub header: Option<Header>,
}

#[derive(Debug, Clone)]
pub struct HeaderParser {
    config: DecoderConfig,
    state: ParseState,
    opcode: Opcode,
    sleep_minutes: Option<u8>,
    /// Survives [`HeaderParser::reset`] so a failed stream can still honour it
    last_sleep_minutes: Option<u8>,
    fields: [u8; 4],
    header: Option<Header>,
}

impl HeaderParser {
    pub fn new(config: &DecoderConfig) -> Self {
        let mut parser = Self {
            config: *config,
            state: ParseState::AwaitingTag,
            opcode: Opcode::Full,
            sleep_minutes: None,
            last_sleep_minutes: None,
            fields: [0; 4],
            header: None,
        };
        parser.reset();
        parser
    }

    /// Forget everything and wait for the first header byte again
    pub fn reset(&mut self) {
        self.state = match self.config.schema {
            HeaderSchema::Tagged => ParseState::AwaitingTag,
            HeaderSchema::Legacy => ParseState::AwaitingSleep,
        };
        self.opcode = Opcode::Full;
        self.sleep_minutes = None;
        self.fields = [0; 4];
        self.header = None;
    }

    pub fn state(&self) -> ParseState {
        self.state
    }

    /// The completed header, once there is one
    pub fn header(&self) -> Option<Header> {
        self.header
    }

    /// Clamped sleep minutes as soon as byte 1 has been seen
    pub fn sleep_minutes(&self) -> Option<u8> {
        self.sleep_minutes
    }

    /// Most recent sleep byte seen by this parser, even across resets
    pub fn last_sleep_minutes(&self) -> Option<u8> {
        self.last_sleep_minutes
    }

    /// Consume header bytes from the front of `chunk`
    ///
    /// On error the parser resets itself; the caller decides whether the
    /// stream goes on.
    pub fn feed<'a>(&mut self, chunk: &'a [u8]) -> Result<Feed<'a>, ProtocolError> {
        let mut consumed = 0;
        let mut completed = None;

        while self.state != ParseState::Complete && consumed < chunk.len() {
            let byte = chunk[consumed];
            consumed += 1;
            if let Err(e) = self.step(byte) {
                self.reset();
                return Err(e);
            }
            if self.state == ParseState::Complete {
                completed = self.header;
            }
        }

        Ok(Feed {
            consumed,
            residual: &chunk[consumed..],
            state: self.state,
            header: completed,
        })
    }

    fn step(&mut self, byte: u8) -> Result<(), ProtocolError> {
        match self.state {
            ParseState::AwaitingTag => {
                if byte >> 3 != MAGIC {
                    return Err(ProtocolError::BadMagic(byte));
                }
                self.opcode = Opcode::try_from(byte & 0b111)?;
                self.state = ParseState::AwaitingSleep;
            }
            ParseState::AwaitingSleep => {
                let minutes = self.config.clamp_sleep(byte);
                if minutes != byte {
                    log::warn!(
                        "Sleep of {} minutes out of range, using {}",
                        byte,
                        minutes
                    );
                }
                self.sleep_minutes = Some(minutes);
                self.last_sleep_minutes = Some(minutes);
                if self.opcode == Opcode::Part {
                    self.state = ParseState::AwaitingField(0);
                } else {
                    self.finish(None);
                }
            }
            ParseState::AwaitingField(n) => {
                self.fields[n as usize] = byte;
                if n < 3 {
                    self.state = ParseState::AwaitingField(n + 1);
                } else {
                    let bbox = BoundingBox::from_fields(self.fields);
                    bbox.validate()?;
                    self.finish(Some(bbox));
                }
            }
            ParseState::Complete => {}
        }
        Ok(())
    }

    fn finish(&mut self, bbox: Option<BoundingBox>) {
        let sleep_minutes = self
            .sleep_minutes
            .unwrap_or(self.config.default_sleep_minutes);
        self.header = Some(Header {
            opcode: self.opcode,
            sleep_minutes,
            bbox,
        });
        self.state = ParseState::Complete;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UnknownOpcodePolicy;
    use proptest::prelude::*;

    fn tagged() -> DecoderConfig {
        DecoderConfig::default()
    }

    #[test]
    fn full_header_in_one_chunk() {
        let mut parser = HeaderParser::new(&tagged());
        let feed = parser.feed(&[0xE9, 0x0A, 0xFF, 0x00]).unwrap();
        assert_eq!(feed.consumed, 2);
        assert_eq!(feed.residual, &[0xFF, 0x00]);
        assert_eq!(feed.state, ParseState::Complete);
        assert_eq!(
            feed.header,
            Some(Header {
                opcode: Opcode::Full,
                sleep_minutes: 10,
                bbox: None
            })
        );
    }

    #[test]
    fn partial_header_split_mid_box() {
        let mut parser = HeaderParser::new(&tagged());

        let feed = parser.feed(&[0xEA, 0x05, 10]).unwrap();
        assert_eq!(feed.consumed, 3);
        assert!(feed.residual.is_empty());
        assert_eq!(feed.state, ParseState::AwaitingField(1));
        assert_eq!(feed.header, None);
        assert_eq!(parser.sleep_minutes(), Some(5));

        let feed = parser.feed(&[20, 30]).unwrap();
        assert_eq!(feed.state, ParseState::AwaitingField(3));

        let feed = parser.feed(&[40, 0xAB]).unwrap();
        assert_eq!(feed.consumed, 1);
        assert_eq!(feed.residual, &[0xAB]);
        let header = feed.header.unwrap();
        assert_eq!(header.opcode, Opcode::Part);
        assert_eq!(header.bbox, Some(BoundingBox::new(10, 20, 30, 40)));
        assert_eq!(header.canvas(), Some(Canvas::new(30, 40)));
    }

    #[test]
    fn header_is_emitted_once() {
        let mut parser = HeaderParser::new(&tagged());
        assert!(parser.feed(&[0xE9, 0x0A]).unwrap().header.is_some());
        let feed = parser.feed(&[1, 2, 3]).unwrap();
        assert_eq!(feed.consumed, 0);
        assert_eq!(feed.residual, &[1, 2, 3]);
        assert_eq!(feed.header, None);
        assert!(parser.header().is_some());
    }

    #[test]
    fn noop_has_no_canvas() {
        let mut parser = HeaderParser::new(&tagged());
        let header = parser.feed(&[0xE8, 0x0A]).unwrap().header.unwrap();
        assert_eq!(header.opcode, Opcode::Noop);
        assert_eq!(header.canvas(), None);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut parser = HeaderParser::new(&tagged());
        assert_eq!(parser.feed(&[0x00, 0x0A]), Err(ProtocolError::BadMagic(0x00)));
        assert_eq!(parser.state(), ParseState::AwaitingTag);
    }

    #[test]
    fn unknown_opcode_resets_parser() {
        let config = DecoderConfig {
            unknown_opcode: UnknownOpcodePolicy::SkipChunk,
            ..tagged()
        };
        let mut parser = HeaderParser::new(&config);
        assert_eq!(
            parser.feed(&[0xEB, 0x0A]),
            Err(ProtocolError::UnknownOpcode(3))
        );
        assert_eq!(parser.state(), ParseState::AwaitingTag);
        assert!(parser.feed(&[0xE9, 0x0A]).unwrap().header.is_some());
    }

    #[test]
    fn out_of_range_sleep_uses_default() {
        let mut parser = HeaderParser::new(&tagged());
        let header = parser.feed(&[0xE9, 0]).unwrap().header.unwrap();
        assert_eq!(header.sleep_minutes, 10);

        let config = DecoderConfig {
            default_sleep_minutes: 15,
            ..tagged()
        };
        let mut parser = HeaderParser::new(&config);
        let header = parser.feed(&[0xE9, 241]).unwrap().header.unwrap();
        assert_eq!(header.sleep_minutes, 15);
    }

    #[test]
    fn box_off_the_panel_is_rejected() {
        let mut parser = HeaderParser::new(&tagged());
        assert_eq!(
            parser.feed(&[0xEA, 5, 0, 255, 10, 255]),
            Err(ProtocolError::BadBoundingBox {
                x: 0,
                y: 255,
                w: 10,
                h: 255
            })
        );
        assert_eq!(parser.sleep_minutes(), None);
        assert_eq!(parser.last_sleep_minutes(), Some(5));

        let mut parser = HeaderParser::new(&tagged());
        assert!(matches!(
            parser.feed(&[0xEA, 5, 0, 0, 0, 8]),
            Err(ProtocolError::BadBoundingBox { .. })
        ));
    }

    #[test]
    fn legacy_schema_reads_sleep_only() {
        let config = DecoderConfig {
            schema: HeaderSchema::Legacy,
            default_sleep_minutes: 15,
            ..tagged()
        };
        let mut parser = HeaderParser::new(&config);
        assert_eq!(parser.state(), ParseState::AwaitingSleep);
        let feed = parser.feed(&[30, 0xFF]).unwrap();
        assert_eq!(feed.consumed, 1);
        assert_eq!(
            feed.header,
            Some(Header {
                opcode: Opcode::Full,
                sleep_minutes: 30,
                bbox: None
            })
        );
    }

    #[test]
    fn empty_chunk_changes_nothing() {
        let mut parser = HeaderParser::new(&tagged());
        let feed = parser.feed(&[]).unwrap();
        assert_eq!(feed.consumed, 0);
        assert_eq!(feed.state, ParseState::AwaitingTag);
    }

    fn arb_header() -> impl Strategy<Value = Vec<u8>> {
        prop_oneof![
            (0u8..=255).prop_map(|s| vec![Opcode::Noop.tag(), s]),
            (0u8..=255).prop_map(|s| vec![Opcode::Full.tag(), s]),
            (0u8..=255, 0u8..=255, 0u8..=255, 1u8..=255, 1u8..=225)
                .prop_map(|(s, x, y, w, h)| vec![Opcode::Part.tag(), s, x, y, w, h]),
        ]
    }

    /// Feed `bytes` split at `cuts`, collecting the header and all residual
    fn feed_split(bytes: &[u8], cuts: &[usize]) -> (Option<Header>, Vec<u8>) {
        let mut parser = HeaderParser::new(&tagged());
        let mut header = None;
        let mut residual = Vec::new();
        let mut start = 0;
        let mut bounds: Vec<usize> = cuts.iter().map(|c| c % (bytes.len() + 1)).collect();
        bounds.push(bytes.len());
        bounds.sort_unstable();
        for end in bounds {
            let feed = parser.feed(&bytes[start..end]).unwrap();
            if let Some(h) = feed.header {
                assert!(header.is_none(), "header emitted twice");
                header = Some(h);
            }
            residual.extend_from_slice(feed.residual);
            start = end;
        }
        (header, residual)
    }

    proptest! {
        #[test]
        fn fragmentation_does_not_change_the_header(
            header in arb_header(),
            payload in prop::collection::vec(any::<u8>(), 0..32),
            cuts in prop::collection::vec(any::<usize>(), 0..8),
        ) {
            let mut stream = header.clone();
            stream.extend_from_slice(&payload);

            let (whole, whole_residual) = feed_split(&stream, &[]);
            let (split, split_residual) = feed_split(&stream, &cuts);

            prop_assert!(whole.is_some());
            prop_assert_eq!(whole, split);
            prop_assert_eq!(&whole_residual, &payload);
            prop_assert_eq!(split_residual, payload);
        }
    }
}
