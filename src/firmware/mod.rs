//! ESP-IDF glue: Wi-Fi, the two transports and deep sleep

pub mod http;
pub mod mqtt;
pub mod power;
pub mod wifi;
