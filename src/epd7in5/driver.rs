//! Waveshare 7.5" V2 driver
//!
//! Three waveforms live in the controller's OTP and are picked at init time:
//!
//! - `init_full()` - power settings, 800x480 resolution, KW mode
//! - `init_partial()` - forced temperature 0x6E, fast partial waveform
//! - `init_gray4()` - forced temperature 0x5F, 4-gray waveform
//!
//! Every refresh ends with `turn_on()`, which starts the update and waits
//! for BUSY within the configured [`BusyPolicy`].
//!
//! ## Polarity
//!
//! Framebuffers are 1 = white. Plane 0x10 takes them as they are and plane
//! 0x13 takes the bitwise inverse, which is what the controller compares
//! against for a full KW refresh.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};
use embedded_hal::spi::SpiDevice;

use embedded_graphics::prelude::{Point, Size};
use embedded_graphics::primitives::Rectangle;

use crate::config::BusyPolicy;
use crate::dispatch::Panel;
use crate::epd7in5::interface::DisplayInterface;
use crate::epd7in5::{cmd::Cmd, flag::Flag};
use crate::error::HardwareError;
use crate::{HEIGHT, WIDTH};

/// Bytes in one full mono plane
pub const PLANE_LEN: usize = WIDTH as usize / 8 * HEIGHT as usize;

/// Driver for the 7.5" V2 (UC8179) panel
pub struct Epd7in5V2<SPI, BSY, DC, RST, DELAY> {
    /// The display interface
    pub interface: DisplayInterface<SPI, BSY, DC, RST, DELAY>,
}

impl<SPI, BSY, DC, RST, DELAY> Epd7in5V2<SPI, BSY, DC, RST, DELAY>
where
    SPI: SpiDevice,
    BSY: InputPin,
    DC: OutputPin,
    RST: OutputPin,
    DELAY: DelayNs,
{
    /// Wrap the peripherals; no command is sent until one of the `init_*` calls
    pub fn new(spi: SPI, busy: BSY, dc: DC, rst: RST, delay: DELAY, busy_policy: BusyPolicy) -> Self {
        let interface = DisplayInterface::new(spi, busy, dc, rst, delay, busy_policy);
        Epd7in5V2 { interface }
    }

    /// Power up with the full-refresh waveform
    pub fn init_full(&mut self) -> Result<(), HardwareError> {
        log::debug!("init full");
        self.interface.reset()?;
        self.interface
            .cmd_with_data(Cmd::POWER_SETTING, &Flag::POWER_SETTING)?;
        self.interface
            .cmd_with_data(Cmd::BOOSTER_SOFT_START, &Flag::BOOSTER_FULL)?;
        self.power_on()?;
        self.interface
            .cmd_with_data(Cmd::PANEL_SETTING, &[Flag::PANEL_KW_OTP])?;
        self.interface
            .cmd_with_data(Cmd::RESOLUTION_SETTING, &Flag::RESOLUTION_800_480)?;
        self.interface
            .cmd_with_data(Cmd::DUAL_SPI, &[Flag::DUAL_SPI_OFF])?;
        self.interface
            .cmd_with_data(Cmd::VCOM_AND_DATA_INTERVAL, &Flag::VCOM_FULL)?;
        self.interface.cmd_with_data(Cmd::TCON_SETTING, &[Flag::TCON])?;
        Ok(())
    }

    /// Power up with the fast partial waveform
    pub fn init_partial(&mut self) -> Result<(), HardwareError> {
        log::debug!("init partial");
        self.interface.reset()?;
        self.interface
            .cmd_with_data(Cmd::PANEL_SETTING, &[Flag::PANEL_KW_OTP])?;
        self.power_on()?;
        self.interface
            .cmd_with_data(Cmd::CASCADE_SETTING, &[Flag::CASCADE_FORCE_TEMP])?;
        self.interface
            .cmd_with_data(Cmd::FORCE_TEMPERATURE, &[Flag::TEMP_PARTIAL])?;
        Ok(())
    }

    /// Power up with the 4-gray waveform
    pub fn init_gray4(&mut self) -> Result<(), HardwareError> {
        log::debug!("init 4-gray");
        self.interface.reset()?;
        self.interface
            .cmd_with_data(Cmd::PANEL_SETTING, &[Flag::PANEL_KW_OTP])?;
        self.interface
            .cmd_with_data(Cmd::VCOM_AND_DATA_INTERVAL, &Flag::VCOM_FULL)?;
        self.power_on()?;
        self.interface
            .cmd_with_data(Cmd::BOOSTER_SOFT_START, &Flag::BOOSTER_GRAY)?;
        self.interface
            .cmd_with_data(Cmd::CASCADE_SETTING, &[Flag::CASCADE_FORCE_TEMP])?;
        self.interface
            .cmd_with_data(Cmd::FORCE_TEMPERATURE, &[Flag::TEMP_GRAY])?;
        Ok(())
    }

    /// Send a whole mono frame and refresh
    pub fn display_full(&mut self, buffer: &[u8]) -> Result<(), HardwareError> {
        log::info!("Full refresh, {} bytes per plane", buffer.len());
        self.interface.cmd(Cmd::DATA_START_TRANSMISSION_1)?;
        self.interface.data_chunked(buffer, false)?;
        self.interface.cmd(Cmd::DATA_START_TRANSMISSION_2)?;
        self.interface.data_chunked(buffer, true)?;
        self.turn_on()
    }

    /// Send a framebuffer covering `area` and refresh only that window
    ///
    /// `buffer` holds `area` row by row, each row starting at the area's own
    /// left edge. The controller window is widened to whole byte columns;
    /// the extra pixels go out white and anything off the panel is dropped.
    pub fn display_partial(&mut self, buffer: &[u8], area: Rectangle) -> Result<(), HardwareError> {
        let Some(window) = Window::new(area) else {
            log::warn!("Partial area {:?} is off the panel", area);
            return Ok(());
        };
        let Window { xs, xe, ys, ye, .. } = window;
        log::info!("Partial refresh x {}..={} y {}..={}", xs, xe, ys, ye);

        self.interface
            .cmd_with_data(Cmd::VCOM_AND_DATA_INTERVAL, &Flag::VCOM_PARTIAL)?;
        self.interface.cmd(Cmd::PARTIAL_IN)?;
        self.interface.cmd_with_data(
            Cmd::PARTIAL_WINDOW,
            &[
                (xs >> 8) as u8,
                xs as u8,
                (xe >> 8) as u8,
                xe as u8,
                (ys >> 8) as u8,
                ys as u8,
                (ye >> 8) as u8,
                ye as u8,
                Flag::PARTIAL_SCAN_INSIDE,
            ],
        )?;
        self.interface.cmd(Cmd::DATA_START_TRANSMISSION_2)?;
        let sent = self
            .interface
            .data_from_iter(window.bytes(buffer, area))?;
        log::debug!("Sent {} window bytes", sent);
        self.turn_on()
    }

    /// Send a 2-bit framebuffer as the two planes of the 4-gray waveform
    pub fn display_gray4(&mut self, buffer: &[u8]) -> Result<(), HardwareError> {
        log::info!("4-gray refresh, {} source bytes", buffer.len());
        self.interface.cmd(Cmd::DATA_START_TRANSMISSION_1)?;
        self.interface.data_from_iter(gray_plane(buffer, old_plane_bit))?;
        self.interface.cmd(Cmd::DATA_START_TRANSMISSION_2)?;
        self.interface.data_from_iter(gray_plane(buffer, new_plane_bit))?;
        self.turn_on()
    }

    /// Wipe the panel to white
    pub fn clear(&mut self) -> Result<(), HardwareError> {
        self.interface.cmd(Cmd::DATA_START_TRANSMISSION_1)?;
        self.interface.data_x_times(Flag::PLANE_WHITE, PLANE_LEN)?;
        self.interface.cmd(Cmd::DATA_START_TRANSMISSION_2)?;
        self.interface.data_x_times(Flag::PLANE_BLACK, PLANE_LEN)?;
        self.turn_on()
    }

    /// Power off and enter deep sleep; only a reset wakes the controller
    pub fn sleep(&mut self) -> Result<(), HardwareError> {
        log::debug!("panel deep sleep");
        self.interface
            .cmd_with_data(Cmd::VCOM_AND_DATA_INTERVAL, &[Flag::VCOM_SLEEP])?;
        self.interface.cmd(Cmd::POWER_OFF)?;
        self.interface.wait_until_idle()?;
        self.interface
            .cmd_with_data(Cmd::DEEP_SLEEP, &[Flag::DEEP_SLEEP_CHECK])?;
        Ok(())
    }

    /// Start the refresh and wait for it to finish
    pub fn turn_on(&mut self) -> Result<(), HardwareError> {
        self.interface.cmd(Cmd::DISPLAY_REFRESH)?;
        self.interface.delay.delay_ms(100);
        self.interface.wait_until_idle()
    }

    fn power_on(&mut self) -> Result<(), HardwareError> {
        self.interface.cmd(Cmd::POWER_ON)?;
        self.interface.delay.delay_ms(100);
        self.interface.wait_until_idle()
    }
}

impl<SPI, BSY, DC, RST, DELAY> Panel for Epd7in5V2<SPI, BSY, DC, RST, DELAY>
where
    SPI: SpiDevice,
    BSY: InputPin,
    DC: OutputPin,
    RST: OutputPin,
    DELAY: DelayNs,
{
    fn init_full(&mut self) -> Result<(), HardwareError> {
        Epd7in5V2::init_full(self)
    }

    fn init_partial(&mut self) -> Result<(), HardwareError> {
        Epd7in5V2::init_partial(self)
    }

    fn init_gray4(&mut self) -> Result<(), HardwareError> {
        Epd7in5V2::init_gray4(self)
    }

    fn display_full(&mut self, buffer: &[u8]) -> Result<(), HardwareError> {
        Epd7in5V2::display_full(self, buffer)
    }

    fn display_partial(&mut self, buffer: &[u8], area: Rectangle) -> Result<(), HardwareError> {
        Epd7in5V2::display_partial(self, buffer, area)
    }

    fn display_gray4(&mut self, buffer: &[u8]) -> Result<(), HardwareError> {
        Epd7in5V2::display_gray4(self, buffer)
    }

    fn sleep(&mut self) -> Result<(), HardwareError> {
        Epd7in5V2::sleep(self)
    }
}

/// Controller window for a pixel area, on byte columns and inside the panel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Window {
    /// The part of the area that is on the panel
    visible: Rectangle,
    xs: u16,
    xe: u16,
    ys: u16,
    ye: u16,
}

impl Window {
    fn new(area: Rectangle) -> Option<Self> {
        let visible = area.intersection(&Rectangle::new(
            Point::zero(),
            Size::new(WIDTH as u32, HEIGHT as u32),
        ));
        if visible.size.width == 0 || visible.size.height == 0 {
            return None;
        }
        let left = visible.top_left.x as u16;
        let right = left + visible.size.width as u16;
        let ys = visible.top_left.y as u16;
        Some(Window {
            visible,
            xs: left / 8 * 8,
            xe: right.div_ceil(8) * 8 - 1,
            ys,
            ye: ys + visible.size.height as u16 - 1,
        })
    }

    /// Bytes per window row
    fn stride(&self) -> usize {
        usize::from(self.xe + 1 - self.xs) / 8
    }

    /// Re-pack `buffer`, laid out over `area`, onto the window's byte columns
    ///
    /// Pixels outside the visible area, and any the buffer is too short
    /// for, are white.
    fn bytes<'a>(self, buffer: &'a [u8], area: Rectangle) -> impl Iterator<Item = u8> + 'a {
        let src_stride = area.size.width.div_ceil(8) as usize;
        let left = self.visible.top_left.x;
        let right = left + self.visible.size.width as i32;
        let origin = area.top_left;

        (self.ys..=self.ye).flat_map(move |y| {
            let src_row = (i32::from(y) - origin.y) as usize;
            (0..self.stride()).map(move |column| {
                (0..8).fold(0u8, |acc, bit| {
                    let x = i32::from(self.xs) + (column * 8 + bit) as i32;
                    let white = if (left..right).contains(&x) {
                        let src_col = (x - origin.x) as usize;
                        buffer
                            .get(src_row * src_stride + src_col / 8)
                            .map_or(1, |b| (b >> (7 - src_col % 8)) & 1)
                    } else {
                        1
                    };
                    (acc << 1) | white
                })
            })
        })
    }
}

// 2-bit level -> bit in plane 0x10: white 0, light 1, dark 0, black 1
fn old_plane_bit(level: u8) -> u8 {
    !level & 1
}

// 2-bit level -> bit in plane 0x13: white 0, light 0, dark 1, black 1
fn new_plane_bit(level: u8) -> u8 {
    !(level >> 1) & 1
}

/// One plane byte per two source bytes, pixels MSB-first
fn gray_plane(buffer: &[u8], bit: fn(u8) -> u8) -> impl Iterator<Item = u8> + '_ {
    buffer.chunks(2).map(move |pair| {
        let byte = pair.iter().fold(0u8, |acc, &src| {
            (0..4).fold(acc, |acc, k| (acc << 1) | bit((src >> (6 - 2 * k)) & 0b11))
        });
        // odd tail: keep the four pixels in the high nibble
        byte << (4 * (2 - pair.len()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ColorDepth;
    use crate::framebuffer::{Color, Framebuffer};
    use crate::protocol::{pack_mono, BoundingBox, Unpacker};
    use core::convert::Infallible;
    use embedded_hal::digital::ErrorType as PinErrorType;
    use embedded_hal::spi::{ErrorType as SpiErrorType, Operation};
    use embedded_hal_mock::eh1::delay::NoopDelay;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Event {
        Cmd(u8),
        Data(Vec<u8>),
    }

    #[derive(Default)]
    struct Bus {
        data_mode: bool,
        events: Vec<Event>,
    }

    type Shared = Rc<RefCell<Bus>>;

    struct FakeSpi(Shared);

    impl SpiErrorType for FakeSpi {
        type Error = Infallible;
    }

    impl SpiDevice for FakeSpi {
        fn transaction(&mut self, operations: &mut [Operation<'_, u8>]) -> Result<(), Infallible> {
            let mut bus = self.0.borrow_mut();
            for op in operations.iter() {
                if let Operation::Write(bytes) = op {
                    if !bus.data_mode {
                        bus.events.extend(bytes.iter().map(|&b| Event::Cmd(b)));
                    } else if let Some(Event::Data(tail)) = bus.events.last_mut() {
                        tail.extend_from_slice(bytes);
                    } else {
                        bus.events.push(Event::Data(bytes.to_vec()));
                    }
                }
            }
            Ok(())
        }
    }

    struct DcPin(Shared);

    impl PinErrorType for DcPin {
        type Error = Infallible;
    }

    impl OutputPin for DcPin {
        fn set_low(&mut self) -> Result<(), Infallible> {
            self.0.borrow_mut().data_mode = false;
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Infallible> {
            self.0.borrow_mut().data_mode = true;
            Ok(())
        }
    }

    struct Idle;

    impl PinErrorType for Idle {
        type Error = Infallible;
    }

    impl InputPin for Idle {
        fn is_high(&mut self) -> Result<bool, Infallible> {
            Ok(true)
        }

        fn is_low(&mut self) -> Result<bool, Infallible> {
            Ok(false)
        }
    }

    impl OutputPin for Idle {
        fn set_low(&mut self) -> Result<(), Infallible> {
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Infallible> {
            Ok(())
        }
    }

    type TestEpd = Epd7in5V2<FakeSpi, Idle, DcPin, Idle, NoopDelay>;

    fn test_epd() -> (TestEpd, Shared) {
        let bus = Shared::default();
        let epd = Epd7in5V2::new(
            FakeSpi(bus.clone()),
            Idle,
            DcPin(bus.clone()),
            Idle,
            NoopDelay::new(),
            BusyPolicy::default(),
        );
        (epd, bus)
    }

    fn commands(bus: &Shared) -> Vec<u8> {
        bus.borrow()
            .events
            .iter()
            .filter_map(|e| match e {
                Event::Cmd(c) => Some(*c),
                Event::Data(_) => None,
            })
            .collect()
    }

    /// Data sent right after command `cmd`
    fn payload(bus: &Shared, cmd: u8) -> Vec<u8> {
        let bus = bus.borrow();
        let at = bus
            .events
            .iter()
            .position(|e| *e == Event::Cmd(cmd))
            .unwrap();
        match bus.events.get(at + 1) {
            Some(Event::Data(d)) => d.clone(),
            _ => Vec::new(),
        }
    }

    #[test]
    fn full_init_follows_the_vendor_order() {
        let (mut epd, bus) = test_epd();
        epd.init_full().unwrap();
        assert_eq!(
            commands(&bus),
            vec![0x01, 0x06, 0x04, 0x00, 0x61, 0x15, 0x50, 0x60]
        );
        assert_eq!(payload(&bus, 0x61), vec![0x03, 0x20, 0x01, 0xE0]);
        assert_eq!(payload(&bus, 0x50), vec![0x10, 0x07]);
    }

    #[test]
    fn partial_and_gray_init_force_their_waveforms() {
        let (mut epd, bus) = test_epd();
        epd.init_partial().unwrap();
        assert_eq!(commands(&bus), vec![0x00, 0x04, 0xE0, 0xE5]);
        assert_eq!(payload(&bus, 0xE5), vec![0x6E]);

        let (mut epd, bus) = test_epd();
        epd.init_gray4().unwrap();
        assert_eq!(commands(&bus), vec![0x00, 0x50, 0x04, 0x06, 0xE0, 0xE5]);
        assert_eq!(payload(&bus, 0x06), vec![0x27, 0x27, 0x18, 0x17]);
        assert_eq!(payload(&bus, 0xE5), vec![0x5F]);
    }

    #[test]
    fn full_frame_sends_the_buffer_then_its_inverse() {
        let (mut epd, bus) = test_epd();
        let frame: Vec<u8> = (0..PLANE_LEN).map(|i| i as u8).collect();
        epd.display_full(&frame).unwrap();

        assert_eq!(commands(&bus), vec![0x10, 0x13, 0x12]);
        assert_eq!(payload(&bus, 0x10), frame);
        let inverted: Vec<u8> = frame.iter().map(|b| !b).collect();
        assert_eq!(payload(&bus, 0x13), inverted);
    }

    #[test]
    fn partial_window_is_in_pixels_on_byte_columns() {
        let (mut epd, bus) = test_epd();
        let bbox = BoundingBox::new(16, 8, 24, 50);
        let frame = vec![0xFF; 3 * 50];
        epd.display_partial(&frame, bbox.rectangle()).unwrap();

        assert_eq!(commands(&bus), vec![0x50, 0x91, 0x90, 0x13, 0x12]);
        assert_eq!(payload(&bus, 0x50), vec![0xA9, 0x07]);
        // x 16..=39, y 8..=57
        assert_eq!(
            payload(&bus, 0x90),
            vec![0, 16, 0, 39, 0, 8, 0, 57, 0x01]
        );
        assert_eq!(payload(&bus, 0x13).len(), 150);
    }

    #[test]
    fn partial_window_is_clipped_to_the_panel() {
        let (mut epd, bus) = test_epd();
        let area = Rectangle::new(Point::new(784, 470), Size::new(32, 20));
        epd.display_partial(&[0xFF; 4 * 20], area).unwrap();
        // x 784..=799, y 470..=479
        assert_eq!(
            payload(&bus, 0x90),
            vec![0x03, 0x10, 0x03, 0x1F, 0x01, 0xD6, 0x01, 0xDF, 0x01]
        );
        assert_eq!(payload(&bus, 0x13), vec![0xFF; 2 * 10]);
    }

    #[test]
    fn area_off_the_panel_sends_nothing() {
        let (mut epd, bus) = test_epd();
        let area = Rectangle::new(Point::new(800, 0), Size::new(8, 8));
        epd.display_partial(&[0x00; 8], area).unwrap();
        assert!(commands(&bus).is_empty());
    }

    #[test]
    fn unaligned_box_is_shifted_onto_byte_columns() {
        let (mut epd, bus) = test_epd();
        let bbox = BoundingBox::new(10, 20, 30, 40);
        // box column 0 black, the rest white
        let mut fb = Framebuffer::new(bbox.canvas(), ColorDepth::Mono);
        let column: Vec<Color> = (0..30 * 40)
            .map(|i| if i % 30 == 0 { Color::Black } else { Color::White })
            .collect();
        Unpacker::new()
            .write(&mut fb, &pack_mono(&column))
            .unwrap();
        epd.display_partial(fb.as_bytes(), bbox.rectangle()).unwrap();

        // x 8..=39, y 20..=59
        assert_eq!(
            payload(&bus, 0x90),
            vec![0, 8, 0, 39, 0, 20, 0, 59, 0x01]
        );
        let window = payload(&bus, 0x13);
        assert_eq!(window.len(), 4 * 40);
        for row in window.chunks(4) {
            // panel x 8 and 9 are lead-in, x 10 is the black column
            assert_eq!(row, [0b1101_1111, 0xFF, 0xFF, 0xFF]);
        }
    }

    #[test]
    fn narrow_box_straddling_a_byte_boundary_gets_two_columns() {
        let (mut epd, bus) = test_epd();
        let area = Rectangle::new(Point::new(6, 0), Size::new(4, 1));
        // four black pixels, padding bits white
        epd.display_partial(&[0b0000_1111], area).unwrap();

        // x 0..=15, y 0..=0
        assert_eq!(payload(&bus, 0x90), vec![0, 0, 0, 15, 0, 0, 0, 0, 0x01]);
        assert_eq!(payload(&bus, 0x13), vec![0b1111_1100, 0b0011_1111]);
    }

    #[test]
    fn gray_planes_split_the_levels() {
        // white, light, dark, black | black, dark, light, white
        let source = [0b1110_0100, 0b0001_1011];
        let old: Vec<u8> = gray_plane(&source, old_plane_bit).collect();
        let new: Vec<u8> = gray_plane(&source, new_plane_bit).collect();
        assert_eq!(old, vec![0b0101_1010]);
        assert_eq!(new, vec![0b0011_1100]);

        let (mut epd, bus) = test_epd();
        epd.display_gray4(&[0xFF; 8]).unwrap();
        assert_eq!(commands(&bus), vec![0x10, 0x13, 0x12]);
        assert_eq!(payload(&bus, 0x10), vec![0x00; 4]);
        assert_eq!(payload(&bus, 0x13), vec![0x00; 4]);
    }

    #[test]
    fn clear_and_sleep() {
        let (mut epd, bus) = test_epd();
        epd.clear().unwrap();
        assert_eq!(payload(&bus, 0x10), vec![0xFF; PLANE_LEN]);
        assert_eq!(payload(&bus, 0x13), vec![0x00; PLANE_LEN]);

        let (mut epd, bus) = test_epd();
        epd.sleep().unwrap();
        assert_eq!(commands(&bus), vec![0x50, 0x02, 0x07]);
        assert_eq!(payload(&bus, 0x07), vec![0xA5]);
    }
}
