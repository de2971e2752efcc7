//! Runtime policy for the decoder and the node
//!
//! Every behavior that differed between firmware revisions (header layout,
//! default sleep, what to do with an unknown opcode) is an explicit field
//! here instead of a per-build accident.

use std::time::Duration;

/// Longest sleep a header may request, in minutes
pub const MAX_SLEEP_MINUTES: u8 = 240;

/// Sleep used when the header is missing, invalid or out of range
pub const DEFAULT_SLEEP_MINUTES: u8 = 10;

/// Layout of the bytes that precede the pixel stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeaderSchema {
    /// `[sleep]` then a full-screen bitmap; the HTTP pull revision
    Legacy,
    /// `[magic|opcode][sleep][x y w h]?`
    #[default]
    Tagged,
}

/// What the header parser does with opcodes 3..=7
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownOpcodePolicy {
    /// Fail the stream; nothing is rendered
    Abort,
    /// Drop the rest of the offending chunk and wait for a fresh header
    #[default]
    SkipChunk,
}

/// Bits per pixel of full-screen sessions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorDepth {
    #[default]
    Mono,
    /// Controller-defined 2-bit packing; partial sessions stay mono
    Gray4,
}

/// Bounded busy-pin polling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusyPolicy {
    pub poll_interval_ms: u32,
    pub timeout_ms: u32,
}

impl Default for BusyPolicy {
    fn default() -> Self {
        // a 4-gray refresh of the 7.5" panel takes well under 20 s
        Self {
            poll_interval_ms: 5,
            timeout_ms: 30_000,
        }
    }
}

/// Decoder and dispatcher policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecoderConfig {
    pub schema: HeaderSchema,
    pub default_sleep_minutes: u8,
    pub unknown_opcode: UnknownOpcodePolicy,
    pub depth: ColorDepth,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            schema: HeaderSchema::Tagged,
            default_sleep_minutes: DEFAULT_SLEEP_MINUTES,
            unknown_opcode: UnknownOpcodePolicy::SkipChunk,
            depth: ColorDepth::Mono,
        }
    }
}

impl DecoderConfig {
    /// Replace 0 and anything above [`MAX_SLEEP_MINUTES`] with the default
    pub fn clamp_sleep(&self, minutes: u8) -> u8 {
        if minutes == 0 || minutes > MAX_SLEEP_MINUTES {
            self.default_sleep_minutes
        } else {
            minutes
        }
    }
}

/// Where the node pulls its image from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportConfig {
    /// GET the bitmap; the body is the stream
    Http { url: String },
    /// Subscribe and take the next retained/published bitmap
    Mqtt { broker: String, topics: Vec<String> },
}

/// Network settings baked in at build time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    pub wifi_ssid: String,
    pub wifi_password: String,
    pub wifi_timeout: Duration,
    pub read_timeout: Duration,
    pub transport: TransportConfig,
    pub decoder: DecoderConfig,
    pub busy: BusyPolicy,
}

/// MQTT topics the dashboard server publishes bitmaps on
pub const MQTT_TOPIC_FULL: &str = "epddash/up/full";
pub const MQTT_TOPIC_PART: &str = "epddash/up/part";

impl NodeConfig {
    /// Build from the `EPD_*` variables `build.rs` lifts out of `.env`
    ///
    /// `EPD_MQTT_HOST` wins over `EPD_IMG_URL` when both are set; the
    /// HTTP revision speaks the legacy header.
    pub fn from_build_env() -> Self {
        Self::from_values(
            option_env!("EPD_WIFI_SSID"),
            option_env!("EPD_WIFI_PASS"),
            option_env!("EPD_IMG_URL"),
            option_env!("EPD_MQTT_HOST"),
            option_env!("EPD_DEFAULT_SLEEP"),
        )
    }

    fn from_values(
        ssid: Option<&str>,
        password: Option<&str>,
        img_url: Option<&str>,
        mqtt_host: Option<&str>,
        default_sleep: Option<&str>,
    ) -> Self {
        let mut decoder = DecoderConfig::default();
        if let Some(minutes) = default_sleep.and_then(|v| v.trim().parse::<u8>().ok()) {
            if (1..=MAX_SLEEP_MINUTES).contains(&minutes) {
                decoder.default_sleep_minutes = minutes;
            }
        }

        let transport = match (mqtt_host, img_url) {
            (Some(host), _) if !host.is_empty() => TransportConfig::Mqtt {
                broker: format!("mqtt://{}:1883", host),
                topics: vec![MQTT_TOPIC_FULL.to_string(), MQTT_TOPIC_PART.to_string()],
            },
            (_, url) => {
                decoder.schema = HeaderSchema::Legacy;
                TransportConfig::Http {
                    url: url.unwrap_or("http://epddash.local:3000/r").to_string(),
                }
            }
        };

        Self {
            wifi_ssid: ssid.unwrap_or_default().to_string(),
            wifi_password: password.unwrap_or_default().to_string(),
            wifi_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(20),
            transport,
            decoder,
            busy: BusyPolicy::default(),
        }
    }
}
