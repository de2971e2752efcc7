use std::time::Duration;

use anyhow::{bail, Context, Result};
use esp_idf_svc::http::client::{Configuration as HttpConfiguration, EspHttpConnection};
use esp_idf_svc::http::Method;

use epddash::transport::StreamReader;
use epddash::TransportError;

/// An open HTTP GET response body
///
/// The ESP client reads blockingly with its own timeout, so `available`
/// pulls the next block and reports its size.
pub struct HttpBody {
    conn: EspHttpConnection,
    content_length: Option<usize>,
    block: Vec<u8>,
    start: usize,
    open: bool,
}

impl HttpBody {
    pub fn get(url: &str, timeout: Duration) -> Result<Self> {
        let mut conn = EspHttpConnection::new(&HttpConfiguration {
            timeout: Some(timeout),
            ..Default::default()
        })?;

        log::info!("Requesting image from: {}", url);
        conn.initiate_request(Method::Get, url, &[])
            .context("Sending request")?;
        conn.initiate_response().context("Reading response headers")?;

        let status = conn.status();
        log::info!("HTTP GET response: {}", status);
        if !(200..300).contains(&status) {
            bail!("Image request failed with HTTP {}", status);
        }
        let content_length = conn
            .header("Content-Length")
            .and_then(|v| v.trim().parse().ok());

        Ok(Self {
            conn,
            content_length,
            block: vec![0; epddash::transport::CHUNK_LEN],
            start: 0,
            open: true,
        })
    }

    fn buffered(&self) -> usize {
        self.block.len() - self.start
    }
}

impl StreamReader for HttpBody {
    fn connected(&self) -> bool {
        self.open
    }

    fn available(&mut self) -> usize {
        if self.buffered() == 0 && self.open {
            self.block.resize(epddash::transport::CHUNK_LEN, 0);
            match self.conn.read(&mut self.block) {
                Ok(0) => {
                    self.open = false;
                    self.block.clear();
                }
                Ok(n) => self.block.truncate(n),
                Err(e) => {
                    log::error!("HTTP read failed: {}", e);
                    self.open = false;
                    self.block.clear();
                }
            }
            self.start = 0;
        }
        self.buffered()
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let n = buf.len().min(self.buffered());
        buf[..n].copy_from_slice(&self.block[self.start..self.start + n]);
        self.start += n;
        Ok(n)
    }

    fn content_length(&self) -> Option<usize> {
        self.content_length
    }
}
