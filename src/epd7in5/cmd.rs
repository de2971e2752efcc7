/// Command bytes of the 7.5" V2 controller
pub struct Cmd;
impl Cmd {
    // Init
    pub const PANEL_SETTING: u8 = 0x00;
    pub const POWER_SETTING: u8 = 0x01;
    pub const POWER_ON: u8 = 0x04;
    pub const BOOSTER_SOFT_START: u8 = 0x06;
    pub const DUAL_SPI: u8 = 0x15;
    pub const VCOM_AND_DATA_INTERVAL: u8 = 0x50;
    pub const TCON_SETTING: u8 = 0x60;
    pub const RESOLUTION_SETTING: u8 = 0x61;
    pub const CASCADE_SETTING: u8 = 0xE0;
    pub const FORCE_TEMPERATURE: u8 = 0xE5;

    // Update
    pub const DATA_START_TRANSMISSION_1: u8 = 0x10;
    pub const DATA_START_TRANSMISSION_2: u8 = 0x13;
    pub const DISPLAY_REFRESH: u8 = 0x12;
    pub const PARTIAL_WINDOW: u8 = 0x90;
    pub const PARTIAL_IN: u8 = 0x91;

    // Power down
    pub const POWER_OFF: u8 = 0x02;
    pub const DEEP_SLEEP: u8 = 0x07;
}

/*
Vendor full init order:
0x01 - Power Setting
0x06 - Booster Soft Start
0x04 - Power On (wait for BUSY)
0x00 - Panel Setting
0x61 - Resolution Setting
0x15 - Dual SPI
0x50 - VCOM and Data Interval
0x60 - TCON Setting
*/
