//! Display interface using SPI
use crate::config::BusyPolicy;
use crate::error::HardwareError;
use display_interface::DisplayError;
use embedded_hal::{
    delay::DelayNs,
    digital::{InputPin, OutputPin},
    spi::SpiDevice,
};

/// Bytes handed to the SPI driver per write when streaming a plane
pub(crate) const CHUNK_SIZE: usize = 64;

/// The connection to the controller: SPI plus the three control lines
pub struct DisplayInterface<SPI, BSY, DC, RST, DELAY> {
    /// SPI device
    spi: SPI,
    /// Low while the controller is busy
    busy: BSY,
    /// Data/Command Control Pin (High for data, Low for command)
    dc: DC,
    /// Pin for Reseting
    rst: RST,
    pub(crate) delay: DELAY,
    busy_policy: BusyPolicy,
}

impl<SPI, BSY, DC, RST, DELAY> DisplayInterface<SPI, BSY, DC, RST, DELAY> {
    pub fn new(spi: SPI, busy: BSY, dc: DC, rst: RST, delay: DELAY, busy_policy: BusyPolicy) -> Self {
        DisplayInterface {
            spi,
            busy,
            dc,
            rst,
            delay,
            busy_policy,
        }
    }

    /// Give the peripherals back, e.g. before deep sleep
    pub fn release(self) -> (SPI, BSY, DC, RST, DELAY) {
        (self.spi, self.busy, self.dc, self.rst, self.delay)
    }
}

impl<SPI, BSY, DC, RST, DELAY> DisplayInterface<SPI, BSY, DC, RST, DELAY>
where
    SPI: SpiDevice,
    BSY: InputPin,
    DC: OutputPin,
    RST: OutputPin,
    DELAY: DelayNs,
{
    /// Basic function for sending commands
    pub(crate) fn cmd(&mut self, command: u8) -> Result<(), DisplayError> {
        // low for commands
        self.dc.set_low().map_err(|_| DisplayError::DCError)?;

        match self.spi.write(&[command]) {
            Ok(_) => Ok(()),
            Err(e) => {
                log::error!("SPI write error for command 0x{:02X}: {:?}", command, e);
                Err(DisplayError::BusWriteError)
            }
        }
    }

    /// Basic function for sending an array of u8-values of data over spi
    pub(crate) fn data(&mut self, data: &[u8]) -> Result<(), DisplayError> {
        // high for data
        self.dc.set_high().map_err(|_| DisplayError::DCError)?;
        self.spi
            .write(data)
            .map_err(|_| DisplayError::BusWriteError)
    }

    /// Basic function for sending a command and the data belonging to it.
    pub(crate) fn cmd_with_data(&mut self, command: u8, data: &[u8]) -> Result<(), DisplayError> {
        self.cmd(command)?;
        self.data(data)
    }

    /// Stream `data` in SPI-sized pieces, optionally inverting every byte
    pub(crate) fn data_chunked(&mut self, data: &[u8], invert: bool) -> Result<(), DisplayError> {
        self.dc.set_high().map_err(|_| DisplayError::DCError)?;

        let mut scratch = [0u8; CHUNK_SIZE];
        for chunk in data.chunks(CHUNK_SIZE) {
            let out = &mut scratch[..chunk.len()];
            out.copy_from_slice(chunk);
            if invert {
                out.iter_mut().for_each(|b| *b = !*b);
            }
            self.spi
                .write(out)
                .map_err(|_| DisplayError::BusWriteError)?;
        }
        Ok(())
    }

    /// Stream bytes produced on the fly, e.g. a converted plane
    pub(crate) fn data_from_iter<I>(&mut self, bytes: I) -> Result<usize, DisplayError>
    where
        I: IntoIterator<Item = u8>,
    {
        self.dc.set_high().map_err(|_| DisplayError::DCError)?;

        let mut scratch = [0u8; CHUNK_SIZE];
        let mut filled = 0;
        let mut sent = 0;
        for byte in bytes {
            scratch[filled] = byte;
            filled += 1;
            if filled == CHUNK_SIZE {
                self.spi
                    .write(&scratch)
                    .map_err(|_| DisplayError::BusWriteError)?;
                sent += filled;
                filled = 0;
            }
        }
        if filled > 0 {
            self.spi
                .write(&scratch[..filled])
                .map_err(|_| DisplayError::BusWriteError)?;
            sent += filled;
        }
        Ok(sent)
    }

    /// Basic function for sending the same byte of data (one u8) multiple times over spi
    /// Used for setting one color for the whole frame
    pub(crate) fn data_x_times(&mut self, val: u8, repetitions: usize) -> Result<(), DisplayError> {
        // high for data
        self.dc.set_high().map_err(|_| DisplayError::DCError)?;

        let buffer = [val; CHUNK_SIZE];
        let full_chunks = repetitions / CHUNK_SIZE;
        let remainder = repetitions % CHUNK_SIZE;

        for _ in 0..full_chunks {
            self.spi
                .write(&buffer)
                .map_err(|_| DisplayError::BusWriteError)?;
        }
        if remainder > 0 {
            self.spi
                .write(&buffer[0..remainder])
                .map_err(|_| DisplayError::BusWriteError)?;
        }

        log::debug!("Completed sending {} bytes of 0x{:02X}", repetitions, val);
        Ok(())
    }

    /// Wait for the BUSY line to go HIGH, polling within the configured budget
    pub(crate) fn wait_until_idle(&mut self) -> Result<(), HardwareError> {
        let BusyPolicy {
            poll_interval_ms,
            timeout_ms,
        } = self.busy_policy;
        let mut waited = 0u32;

        loop {
            match self.busy.is_high() {
                Ok(true) => break,
                Ok(false) => {}
                Err(_) => {
                    log::error!("Error reading BUSY pin state");
                    return Err(HardwareError::BusyPinUnreadable);
                }
            }
            if waited >= timeout_ms {
                log::error!("BUSY still low after {} ms, giving up", waited);
                return Err(HardwareError::ControllerBusyTimeout(waited));
            }
            self.delay.delay_ms(poll_interval_ms);
            waited = waited.saturating_add(poll_interval_ms);
        }

        log::debug!("Controller idle after {} ms", waited);
        Ok(())
    }

    /// Resets the device with the vendor reset pulse
    pub(crate) fn reset(&mut self) -> Result<(), DisplayError> {
        self.rst.set_high().map_err(|_| DisplayError::RSError)?;
        self.delay.delay_ms(20);
        self.rst.set_low().map_err(|_| DisplayError::RSError)?;
        self.delay.delay_ms(2);
        self.rst.set_high().map_err(|_| DisplayError::RSError)?;
        self.delay.delay_ms(20);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal_mock::eh1::delay::NoopDelay;
    use embedded_hal_mock::eh1::digital::{
        Mock as PinMock, State as PinState, Transaction as PinTransaction,
    };
    use embedded_hal_mock::eh1::spi::Mock as SpiMock;

    type MockInterface = DisplayInterface<SpiMock<u8>, PinMock, PinMock, PinMock, NoopDelay>;

    fn interface(busy: &[PinTransaction], policy: BusyPolicy) -> MockInterface {
        DisplayInterface::new(
            SpiMock::new(&[]),
            PinMock::new(busy),
            PinMock::new(&[]),
            PinMock::new(&[]),
            NoopDelay::new(),
            policy,
        )
    }

    fn finish(iface: MockInterface) {
        let (mut spi, mut busy, mut dc, mut rst, _) = iface.release();
        spi.done();
        busy.done();
        dc.done();
        rst.done();
    }

    #[test]
    fn idle_after_a_few_polls() {
        let expectations = [
            PinTransaction::get(PinState::Low),
            PinTransaction::get(PinState::Low),
            PinTransaction::get(PinState::High),
        ];
        let mut iface = interface(&expectations, BusyPolicy::default());
        assert_eq!(iface.wait_until_idle(), Ok(()));
        finish(iface);
    }

    #[test]
    fn busy_forever_times_out() {
        let policy = BusyPolicy {
            poll_interval_ms: 10,
            timeout_ms: 30,
        };
        // polls at 0, 10, 20 and 30 ms, then gives up
        let expectations = vec![PinTransaction::get(PinState::Low); 4];
        let mut iface = interface(&expectations, policy);
        assert_eq!(
            iface.wait_until_idle(),
            Err(HardwareError::ControllerBusyTimeout(30))
        );
        finish(iface);
    }
}
