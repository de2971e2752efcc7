//! Error taxonomy for the ingestion pipeline
//!
//! Three families, one per boundary: the wire stream, the transport that
//! delivers it, and the panel that renders it. [`Error`] unifies them for
//! callers that only need to know *that* a session failed.

pub use display_interface::DisplayError;
use thiserror::Error;

/// Malformed or oversized stream content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// High five bits of the first byte are not `0b11101`
    #[error("bad magic in header byte 0x{0:02X}")]
    BadMagic(u8),
    /// Low three bits of the first byte select no known opcode
    #[error("unknown opcode {0}")]
    UnknownOpcode(u8),
    /// More pixel data than the open canvas can hold
    #[error("pixel stream overruns the canvas")]
    Overrun,
    /// Partial box is empty or does not fit on the panel
    #[error("bounding box {w}x{h}+{x}+{y} is not drawable")]
    BadBoundingBox { x: u8, y: u8, w: u8, h: u8 },
}

/// The byte source stopped delivering before end-of-stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("transport read timed out")]
    Timeout,
    #[error("transport disconnected")]
    Disconnected,
    /// A fragment arrived at an offset that does not follow the previous one
    #[error("fragment at offset {got}, expected {expected}")]
    Desync { expected: usize, got: usize },
}

/// Panel controller failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HardwareError {
    /// BUSY never released within the configured budget
    #[error("controller still busy after {0} ms")]
    ControllerBusyTimeout(u32),
    #[error("BUSY pin could not be read")]
    BusyPinUnreadable,
    #[error("bus error: {0:?}")]
    Bus(BusFault),
}

/// Which part of the SPI link failed, reduced from [`DisplayError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusFault {
    Write,
    DataCommand,
    ChipSelect,
    Reset,
    Other,
}

impl From<DisplayError> for BusFault {
    fn from(e: DisplayError) -> Self {
        match e {
            DisplayError::BusWriteError => BusFault::Write,
            DisplayError::DCError => BusFault::DataCommand,
            DisplayError::CSError => BusFault::ChipSelect,
            DisplayError::RSError => BusFault::Reset,
            _ => BusFault::Other,
        }
    }
}

impl From<DisplayError> for HardwareError {
    fn from(e: DisplayError) -> Self {
        HardwareError::Bus(e.into())
    }
}

/// Any failure that ends an ingestion session
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Hardware(#[from] HardwareError),
}

impl From<DisplayError> for Error {
    fn from(e: DisplayError) -> Self {
        Error::Hardware(e.into())
    }
}
