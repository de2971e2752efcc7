use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use embedded_svc::wifi::{AuthMethod, ClientConfiguration, Configuration};
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::hal::modem::Modem;
use esp_idf_svc::nvs::{EspNvsPartition, NvsDefault};
use esp_idf_svc::wifi::{BlockingWifi, EspWifi};
use log::{info, warn};

#[derive(Debug)]
pub struct WifiNetwork<'a> {
    pub ssid: &'a str,
    pub password: &'a str,
    pub auth_method: AuthMethod,
}

impl<'a> WifiNetwork<'a> {
    pub fn new(ssid: &'a str, password: &'a str) -> Self {
        let auth_method = if password.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        };
        Self {
            ssid,
            password,
            auth_method,
        }
    }
}

/// Station-mode Wi-Fi with a hard deadline on association
pub struct WifiManager<'a> {
    wifi: BlockingWifi<EspWifi<'a>>,
    timeout: Duration,
}

impl<'a> WifiManager<'a> {
    pub fn new(modem: Modem, timeout: Duration) -> Result<Self> {
        let sys_loop = EspSystemEventLoop::take()?;
        let nvs = EspNvsPartition::<NvsDefault>::take()?;

        let wifi = BlockingWifi::wrap(EspWifi::new(modem, sys_loop.clone(), Some(nvs))?, sys_loop)?;
        Ok(Self { wifi, timeout })
    }

    /// Associate and wait for an address, giving up after the timeout
    pub fn connect(&mut self, network: &WifiNetwork<'_>) -> Result<()> {
        if network.ssid.is_empty() {
            bail!("No Wi-Fi SSID configured");
        }
        info!("Connecting to Wi-Fi network {}", network.ssid);

        let wifi_config = Configuration::Client(ClientConfiguration {
            ssid: network
                .ssid
                .try_into()
                .map_err(|_| anyhow::anyhow!("SSID too long"))?,
            password: network
                .password
                .try_into()
                .map_err(|_| anyhow::anyhow!("Password too long"))?,
            auth_method: network.auth_method,
            ..Default::default()
        });

        self.wifi.set_configuration(&wifi_config)?;
        self.wifi.start()?;
        // non-blocking connect so the deadline is ours
        self.wifi.wifi_mut().connect()?;

        let started = Instant::now();
        while !self.wifi.is_connected()? {
            if started.elapsed() >= self.timeout {
                warn!("Wi-Fi not connected after {:?}", self.timeout);
                bail!("Wi-Fi connection to {} timed out", network.ssid);
            }
            std::thread::sleep(Duration::from_millis(500));
        }
        self.wifi.wait_netif_up()?;

        info!("IP: {}", self.get_ip_info()?.ip);
        Ok(())
    }

    pub fn get_ip_info(&self) -> Result<esp_idf_svc::ipv4::IpInfo> {
        self.wifi
            .wifi()
            .sta_netif()
            .get_ip_info()
            .context("Reading station IP info")
    }

    /// Drop the association before deep sleep
    pub fn disconnect(&mut self) {
        if let Err(e) = self.wifi.disconnect() {
            warn!("Wi-Fi disconnect failed: {}", e);
        }
        if let Err(e) = self.wifi.stop() {
            warn!("Wi-Fi stop failed: {}", e);
        }
    }
}
