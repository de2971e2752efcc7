/// Data bytes that follow the commands in [`super::cmd::Cmd`].
///
/// Values are the vendor's; the comments name what each one selects.
pub struct Flag;
#[allow(missing_docs)]
impl Flag {
    // Power Setting (0x01): VGH=20V, VGL=-20V, VDH=15V, VDL=-15V
    pub const POWER_SETTING: [u8; 4] = [0x07, 0x07, 0x3F, 0x3F];

    // Booster Soft Start (0x06), enhanced drive for full refresh
    pub const BOOSTER_FULL: [u8; 4] = [0x17, 0x17, 0x28, 0x17];
    // Booster Soft Start (0x06) for the 4-gray waveform
    pub const BOOSTER_GRAY: [u8; 4] = [0x27, 0x27, 0x18, 0x17];

    // Panel Setting (0x00): KW mode, LUT from OTP
    pub const PANEL_KW_OTP: u8 = 0x1F;

    // Resolution Setting (0x61): source 800, gate 480
    pub const RESOLUTION_800_480: [u8; 4] = [0x03, 0x20, 0x01, 0xE0];

    // Dual SPI (0x15)
    pub const DUAL_SPI_OFF: u8 = 0x00;

    // VCOM and Data Interval (0x50)
    pub const VCOM_FULL: [u8; 2] = [0x10, 0x07];
    pub const VCOM_PARTIAL: [u8; 2] = [0xA9, 0x07];
    pub const VCOM_SLEEP: u8 = 0xF7;

    // TCON Setting (0x60)
    pub const TCON: u8 = 0x22;

    // Cascade Setting (0xE0): temperature from 0xE5
    pub const CASCADE_FORCE_TEMP: u8 = 0x02;

    // Force Temperature (0xE5) selects the waveform
    pub const TEMP_PARTIAL: u8 = 0x6E;
    pub const TEMP_GRAY: u8 = 0x5F;

    // Partial Window (0x90) trailing byte: scan inside window only
    pub const PARTIAL_SCAN_INSIDE: u8 = 0x01;

    // Deep Sleep (0x07) check code
    pub const DEEP_SLEEP_CHECK: u8 = 0xA5;

    // Plane fill patterns
    pub const PLANE_WHITE: u8 = 0xFF;
    pub const PLANE_BLACK: u8 = 0x00;
}
