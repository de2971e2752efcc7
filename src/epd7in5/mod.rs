//! Waveshare 7.5" V2 e-paper panel (800x480, UC8179 controller)
//!
//! The driver speaks embedded-hal 1.0: an `SpiDevice` for the bus plus the
//! BUSY, DC and RST lines. It never waits on BUSY without a bound; see
//! [`crate::config::BusyPolicy`].
//!
//! ### Usage
//! 1. call one of the `init_*` functions for the waveform you need
//! 1. hand a packed framebuffer to the matching `display_*` function
//! 1. put the controller to sleep with [`driver::Epd7in5V2::sleep`]
//!
//! The refresh dispatcher does all of this through [`crate::dispatch::Panel`].

mod cmd;
mod flag;
pub mod driver;
pub mod interface;
pub mod pins;

pub use driver::Epd7in5V2;
pub use pins::Pins;
