//! GPIO wiring of the Waveshare e-Paper ESP32 driver board
//!
//! The panel sits on HSPI; MISO is not connected.

/// GPIO numbers the firmware binds the panel to
pub struct Pins;

impl Pins {
    /// HSPI clock
    pub const SCK: u8 = 13;
    /// HSPI data out
    pub const MOSI: u8 = 14;
    /// HSPI chip select
    pub const CS: u8 = 15;
    /// Controller BUSY output, LOW while a refresh or power step runs
    pub const BSY: u8 = 25;
    /// Active-low controller reset
    pub const RST: u8 = 26;
    /// LOW selects a command byte, HIGH a data byte
    pub const DC: u8 = 27;
}
