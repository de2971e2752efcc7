#[cfg(target_os = "espidf")]
mod firmware;

#[cfg(target_os = "espidf")]
fn main() -> anyhow::Result<()> {
    use anyhow::Context;
    use epddash::config::{NodeConfig, TransportConfig};
    use epddash::epd7in5::{Epd7in5V2, Pins};
    use epddash::transport::{MqttSource, PollingSource};
    use epddash::{ingest, RefreshDispatcher};
    use esp_idf_svc::hal::delay::Delay;
    use esp_idf_svc::hal::gpio;
    use esp_idf_svc::hal::peripherals::Peripherals;
    use esp_idf_svc::hal::prelude::*;
    use esp_idf_svc::hal::spi;

    use firmware::http::HttpBody;
    use firmware::mqtt::MqttLink;
    use firmware::power::{deep_sleep, woke_from_timer};
    use firmware::wifi::{WifiManager, WifiNetwork};

    // It is necessary to call this function once. Otherwise some patches to the runtime
    // implemented by esp-idf-sys might not link properly. See https://github.com/esp-rs/esp-idf-template/issues/71
    esp_idf_svc::sys::link_patches();

    // Bind the log crate to the ESP Logging facilities
    esp_idf_svc::log::EspLogger::initialize_default();
    log::info!("Booting...");

    let config = NodeConfig::from_build_env();
    let peripherals = Peripherals::take().context("Could not take peripherals")?;
    let pins = peripherals.pins;

    log::info!(
        "Panel on SCK {} MOSI {} CS {}, BUSY {} RST {} DC {}",
        Pins::SCK,
        Pins::MOSI,
        Pins::CS,
        Pins::BSY,
        Pins::RST,
        Pins::DC
    );
    let spi = spi::SpiDeviceDriver::new_single(
        peripherals.spi2,
        pins.gpio13,                    // SCK - Pins::SCK
        pins.gpio14,                    // MOSI - Pins::MOSI
        Option::<gpio::AnyIOPin>::None, // the panel never talks back
        Some(pins.gpio15),              // CS - Pins::CS
        &spi::SpiDriverConfig::new(),
        &spi::SpiConfig::new().baudrate(4.MHz().into()),
    )
    .context("Could not create SPI device driver")?;

    let mut panel = Epd7in5V2::new(
        spi,
        gpio::PinDriver::input(pins.gpio25)?,  // Pins::BSY
        gpio::PinDriver::output(pins.gpio27)?, // Pins::DC
        gpio::PinDriver::output(pins.gpio26)?, // Pins::RST
        Delay::default(),
        config.busy,
    );
    if !woke_from_timer() {
        log::info!("Cold boot, wiping the panel");
        if let Err(e) = panel
            .init_full()
            .and_then(|_| panel.clear())
            .and_then(|_| panel.sleep())
        {
            log::error!("Panel wipe failed: {}", e);
        }
    }
    let mut dispatcher = RefreshDispatcher::new(panel, config.decoder);

    let mut wifi = WifiManager::new(peripherals.modem, config.wifi_timeout)?;
    let network = WifiNetwork::new(&config.wifi_ssid, &config.wifi_password);
    if let Err(e) = wifi.connect(&network) {
        log::error!("WiFi connection failed: {:#}", e);
        if let Err(e) = dispatcher.show_message("WiFi connection failed") {
            log::error!("Could not show the failure on the panel: {}", e);
        }
        deep_sleep(config.decoder.default_sleep_minutes);
    }

    let outcome = match &config.transport {
        TransportConfig::Http { url } => match HttpBody::get(url, config.read_timeout) {
            Ok(body) => {
                let mut source = PollingSource::new(body, config.read_timeout);
                Some(ingest(&mut source, &mut dispatcher))
            }
            Err(e) => {
                log::error!("Failed to download image: {:#}", e);
                None
            }
        },
        TransportConfig::Mqtt { broker, topics } => {
            match MqttLink::connect(broker, topics, config.wifi_timeout) {
                Ok(link) => {
                    let mut source =
                        MqttSource::new(link.fragments, topics.clone(), config.read_timeout);
                    Some(ingest(&mut source, &mut dispatcher))
                }
                Err(e) => {
                    log::error!("MQTT unavailable: {:#}", e);
                    None
                }
            }
        }
    };

    let sleep_minutes = match outcome {
        Some(outcome) => {
            if let Some(e) = &outcome.error {
                log::error!("Stream failed: {}", e);
            } else if outcome.rendered {
                log::info!("Image rendered.");
            }
            outcome.sleep_minutes
        }
        None => config.decoder.default_sleep_minutes,
    };

    wifi.disconnect();
    deep_sleep(sleep_minutes)
}

/// Host build: replay a captured stream file through the decoder
#[cfg(not(target_os = "espidf"))]
fn main() -> anyhow::Result<()> {
    use anyhow::Context;
    use epddash::transport::{SliceSource, CHUNK_LEN};
    use epddash::{ingest, DecoderConfig, HardwareError, Panel, RefreshDispatcher};
    use embedded_graphics::primitives::Rectangle;

    /// Prints what a real panel would be asked to do
    struct PrintPanel;

    impl Panel for PrintPanel {
        fn init_full(&mut self) -> Result<(), HardwareError> {
            println!("init full");
            Ok(())
        }

        fn init_partial(&mut self) -> Result<(), HardwareError> {
            println!("init partial");
            Ok(())
        }

        fn init_gray4(&mut self) -> Result<(), HardwareError> {
            println!("init 4-gray");
            Ok(())
        }

        fn display_full(&mut self, buffer: &[u8]) -> Result<(), HardwareError> {
            println!("display full, {} bytes", buffer.len());
            Ok(())
        }

        fn display_partial(&mut self, buffer: &[u8], area: Rectangle) -> Result<(), HardwareError> {
            println!(
                "display partial at {:?} size {:?}, {} bytes",
                area.top_left,
                area.size,
                buffer.len()
            );
            Ok(())
        }

        fn display_gray4(&mut self, buffer: &[u8]) -> Result<(), HardwareError> {
            println!("display 4-gray, {} bytes", buffer.len());
            Ok(())
        }

        fn sleep(&mut self) -> Result<(), HardwareError> {
            println!("sleep");
            Ok(())
        }
    }

    let path = std::env::args()
        .nth(1)
        .context("usage: epddash <captured-stream>")?;
    let data = std::fs::read(&path).with_context(|| format!("Reading {}", path))?;

    let mut dispatcher = RefreshDispatcher::new(PrintPanel, DecoderConfig::default());
    let outcome = ingest(&mut SliceSource::new(&data, CHUNK_LEN), &mut dispatcher);
    println!(
        "rendered: {}, sleep: {} min, error: {:?}",
        outcome.rendered, outcome.sleep_minutes, outcome.error
    );
    Ok(())
}
