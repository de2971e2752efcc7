//! Refresh dispatcher
//!
//! Owns the header parser, the open session and the panel. Chunks go in
//! through [`RefreshDispatcher::feed`]; the panel is initialized the moment
//! the header is complete and the refresh is committed by
//! [`RefreshDispatcher::finish`].
//!
//! ```text
//! Idle -> HeaderPending -> NoopDone
//!                       -> StreamingFull -> Rendered
//!                       -> StreamingPart -> Rendered
//!         any fatal error -> Aborted
//! ```

use embedded_graphics::{
    mono_font::{ascii::FONT_10X20, MonoTextStyle},
    pixelcolor::BinaryColor,
    prelude::*,
    primitives::{PrimitiveStyle, Rectangle},
    text::{Baseline, Text},
};

use crate::config::{ColorDepth, DecoderConfig, UnknownOpcodePolicy};
use crate::error::{Error, HardwareError, ProtocolError};
use crate::framebuffer::{Canvas, Framebuffer};
use crate::protocol::{Header, HeaderParser, Opcode, Unpacker};
use crate::{HEIGHT, WIDTH};

/// What the dispatcher needs from a panel
///
/// Buffers are packed MSB-first, 1 = white for mono and two bits per pixel
/// for 4-gray, with rows `ceil(width / pixels_per_byte)` bytes long.
pub trait Panel {
    fn init_full(&mut self) -> Result<(), HardwareError>;
    fn init_partial(&mut self) -> Result<(), HardwareError>;
    fn init_gray4(&mut self) -> Result<(), HardwareError>;
    fn display_full(&mut self, buffer: &[u8]) -> Result<(), HardwareError>;
    fn display_partial(&mut self, buffer: &[u8], area: Rectangle) -> Result<(), HardwareError>;
    fn display_gray4(&mut self, buffer: &[u8]) -> Result<(), HardwareError>;
    fn sleep(&mut self) -> Result<(), HardwareError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    /// No stream yet
    Idle,
    /// A stream is open and its header is incomplete
    HeaderPending,
    /// The header said NOOP; nothing will be drawn
    NoopDone,
    StreamingFull,
    StreamingPart,
    /// The panel has been refreshed and put to sleep
    Rendered,
    /// The stream failed; nothing was drawn
    Aborted,
}

/// Framebuffer and cursor of the stream being decoded
#[derive(Debug)]
struct Session {
    header: Header,
    framebuffer: Framebuffer,
    unpacker: Unpacker,
}

pub struct RefreshDispatcher<P> {
    panel: P,
    config: DecoderConfig,
    parser: HeaderParser,
    state: RefreshState,
    session: Option<Session>,
}

impl<P: Panel> RefreshDispatcher<P> {
    pub fn new(panel: P, config: DecoderConfig) -> Self {
        Self {
            panel,
            parser: HeaderParser::new(&config),
            config,
            state: RefreshState::Idle,
            session: None,
        }
    }

    pub fn state(&self) -> RefreshState {
        self.state
    }

    /// Header of the open session
    pub fn header(&self) -> Option<Header> {
        self.session
            .as_ref()
            .map(|s| s.header)
            .or_else(|| self.parser.header())
    }

    pub fn framebuffer(&self) -> Option<&Framebuffer> {
        self.session.as_ref().map(|s| &s.framebuffer)
    }

    /// Wire bytes written into the open session so far
    pub fn cursor(&self) -> usize {
        self.session.as_ref().map_or(0, |s| s.unpacker.cursor())
    }

    pub fn panel(&self) -> &P {
        &self.panel
    }

    pub fn into_panel(self) -> P {
        self.panel
    }

    /// Minutes to sleep after this stream
    ///
    /// The header's value once byte 1 has been seen, even if the stream
    /// failed later; the configured default otherwise.
    pub fn sleep_minutes(&self) -> u8 {
        self.header()
            .map(|h| h.sleep_minutes)
            .or_else(|| self.parser.last_sleep_minutes())
            .unwrap_or(self.config.default_sleep_minutes)
    }

    /// Open a new stream, dropping whatever the previous one left behind
    pub fn begin(&mut self) {
        if self.session.take().is_some() {
            log::debug!("Discarding previous session");
        }
        self.parser.reset();
        self.state = RefreshState::HeaderPending;
    }

    /// Process one chunk of the stream
    ///
    /// Any error returned here has already aborted the stream.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<(), Error> {
        match self.state {
            RefreshState::Idle | RefreshState::Rendered => {
                self.begin();
                self.feed_header(chunk)
            }
            RefreshState::HeaderPending => self.feed_header(chunk),
            RefreshState::StreamingFull | RefreshState::StreamingPart => self.feed_pixels(chunk),
            RefreshState::NoopDone => {
                if !chunk.is_empty() {
                    log::debug!("Ignoring {} bytes after NOOP", chunk.len());
                }
                Ok(())
            }
            RefreshState::Aborted => Ok(()),
        }
    }

    fn feed_header(&mut self, chunk: &[u8]) -> Result<(), Error> {
        let feed = match self.parser.feed(chunk) {
            Ok(feed) => feed,
            Err(ProtocolError::UnknownOpcode(code))
                if self.config.unknown_opcode == UnknownOpcodePolicy::SkipChunk =>
            {
                log::warn!("Unknown opcode {}, skipping the rest of the chunk", code);
                return Ok(());
            }
            Err(e) => return Err(self.fail(e.into())),
        };

        let Some(header) = feed.header else {
            return Ok(());
        };
        let residual = feed.residual;
        if let Err(e) = self.open(header) {
            return Err(self.fail(e));
        }
        if residual.is_empty() {
            Ok(())
        } else {
            self.feed_pixels(residual)
        }
    }

    fn open(&mut self, header: Header) -> Result<(), Error> {
        log::info!(
            "Header {:?}, sleep {} min, box {:?}",
            header.opcode,
            header.sleep_minutes,
            header.bbox
        );
        let (canvas, depth, state) = match (header.opcode, header.bbox) {
            (Opcode::Noop, _) => {
                self.state = RefreshState::NoopDone;
                return Ok(());
            }
            (Opcode::Full, _) => {
                match self.config.depth {
                    ColorDepth::Mono => self.panel.init_full()?,
                    ColorDepth::Gray4 => self.panel.init_gray4()?,
                }
                (Canvas::full(), self.config.depth, RefreshState::StreamingFull)
            }
            (Opcode::Part, Some(bbox)) => {
                self.panel.init_partial()?;
                (bbox.canvas(), ColorDepth::Mono, RefreshState::StreamingPart)
            }
            (Opcode::Part, None) => {
                return Err(ProtocolError::BadBoundingBox {
                    x: 0,
                    y: 0,
                    w: 0,
                    h: 0,
                }
                .into())
            }
        };

        self.session = Some(Session {
            header,
            framebuffer: Framebuffer::new(canvas, depth),
            unpacker: Unpacker::new(),
        });
        self.state = state;
        Ok(())
    }

    fn feed_pixels(&mut self, bytes: &[u8]) -> Result<(), Error> {
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };
        match session.unpacker.write(&mut session.framebuffer, bytes) {
            Ok(_) => Ok(()),
            Err(e) => Err(self.fail(e.into())),
        }
    }

    /// End-of-stream: commit the refresh if one is open
    ///
    /// Returns whether the panel was refreshed.
    pub fn finish(&mut self) -> Result<bool, Error> {
        match self.state {
            RefreshState::HeaderPending => {
                log::warn!("Stream ended before the header was complete");
                self.state = RefreshState::Aborted;
                Ok(false)
            }
            RefreshState::StreamingFull | RefreshState::StreamingPart => match self.render() {
                Ok(()) => {
                    self.state = RefreshState::Rendered;
                    Ok(true)
                }
                Err(e) => Err(self.fail(e.into())),
            },
            RefreshState::NoopDone => {
                log::info!("NOOP, nothing to draw");
                Ok(false)
            }
            RefreshState::Idle | RefreshState::Rendered | RefreshState::Aborted => Ok(false),
        }
    }

    fn render(&mut self) -> Result<(), HardwareError> {
        let Some(session) = self.session.as_ref() else {
            return Ok(());
        };
        let capacity = Unpacker::capacity(session.framebuffer.canvas(), session.framebuffer.depth());
        if session.unpacker.cursor() < capacity {
            log::warn!(
                "Stream ended after {} of {} bytes, rest stays white",
                session.unpacker.cursor(),
                capacity
            );
        }

        let buffer = session.framebuffer.as_bytes();
        match (session.header.bbox, session.framebuffer.depth()) {
            (Some(bbox), _) => self.panel.display_partial(buffer, bbox.rectangle())?,
            (None, ColorDepth::Gray4) => self.panel.display_gray4(buffer)?,
            (None, ColorDepth::Mono) => self.panel.display_full(buffer)?,
        }
        self.panel.sleep()
    }

    /// Abandon the stream without touching the panel
    pub fn abort(&mut self) {
        if self.state != RefreshState::Aborted {
            log::warn!("Aborting stream in state {:?}", self.state);
        }
        self.session = None;
        self.parser.reset();
        self.state = RefreshState::Aborted;
    }

    fn fail(&mut self, error: Error) -> Error {
        log::error!("Stream failed: {}", error);
        self.abort();
        error
    }

    /// Draw a one-line status text in a small window in the middle of the panel
    pub fn show_message(&mut self, text: &str) -> Result<(), Error> {
        let area = message_area(text);
        let mut framebuffer = Framebuffer::new(
            Canvas::new(area.size.width as u16, area.size.height as u16),
            ColorDepth::Mono,
        );

        Rectangle::new(Point::zero(), area.size)
            .into_styled(PrimitiveStyle::with_stroke(BinaryColor::On, 1))
            .draw(&mut framebuffer)
            .unwrap_or_else(|never| match never {});
        Text::with_baseline(
            text,
            Point::new(MESSAGE_MARGIN as i32, MESSAGE_MARGIN as i32 / 2),
            MonoTextStyle::new(&FONT_10X20, BinaryColor::On),
            Baseline::Top,
        )
        .draw(&mut framebuffer)
        .unwrap_or_else(|never| match never {});

        log::info!("Showing message {:?}", text);
        self.panel.init_partial()?;
        self.panel
            .display_partial(framebuffer.as_bytes(), area)?;
        self.panel.sleep()?;
        Ok(())
    }
}

const MESSAGE_MARGIN: u32 = 8;

/// Byte-aligned window centred on the panel that fits `text`
fn message_area(text: &str) -> Rectangle {
    let glyph = FONT_10X20.character_size;
    let text_width = text.chars().count() as u32 * glyph.width;
    let width = (text_width + 2 * MESSAGE_MARGIN).min(WIDTH as u32);
    let width = width.div_ceil(8) * 8;
    let height = glyph.height + MESSAGE_MARGIN;
    let x = (WIDTH as u32 - width) / 2 / 8 * 8;
    let y = (HEIGHT as u32 - height) / 2;
    Rectangle::new(Point::new(x as i32, y as i32), Size::new(width, height))
}
