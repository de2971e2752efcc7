//! epddash: streaming bitmap ingestion for a 7.5" e-paper node
//!
//! The node wakes, pulls one packed bitmap over HTTP or MQTT, paints it and
//! goes back to deep sleep for as long as the server asked. The pipeline
//! never holds the wire stream in memory:
//!
//! 1. a [`transport::ChunkSource`] hands out byte chunks of any size,
//! 1. the [`protocol::HeaderParser`] peels off opcode, sleep time and the
//!    optional partial box,
//! 1. the [`protocol::Unpacker`] writes the remaining bytes straight into a
//!    [`framebuffer::Framebuffer`],
//! 1. the [`dispatch::RefreshDispatcher`] initializes the panel when the
//!    header is known and commits a full or partial refresh at end-of-stream.
//!
//! [`session::ingest`] ties those together and reports how long to sleep.

pub mod config;
pub mod dispatch;
pub mod epd7in5;
pub mod error;
pub mod framebuffer;
pub mod protocol;
pub mod session;
pub mod transport;

pub use config::{ColorDepth, DecoderConfig, HeaderSchema, NodeConfig, UnknownOpcodePolicy};
pub use dispatch::{Panel, RefreshDispatcher, RefreshState};
pub use error::{BusFault, Error, HardwareError, ProtocolError, TransportError};
pub use framebuffer::{Canvas, Color, Framebuffer, Gray};
pub use protocol::{BoundingBox, Header, HeaderParser, Opcode};
pub use session::{ingest, Outcome};

/// Panel width, pixels horizontally
pub const WIDTH: u16 = 800;

/// Panel height, pixels vertically
pub const HEIGHT: u16 = 480;
