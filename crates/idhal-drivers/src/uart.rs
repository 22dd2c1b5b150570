//! UART driver.
//!
//! Receptions are bounded by a per-ID timeout measured on a [`Clock`]. The
//! receive buffer carries a two-byte header holding the number of bytes
//! received, MSB-first, followed by the payload:
//!
//! ```text
//! buffer: [ count_hi | count_lo | payload[0] ... payload[length - 1] ]
//! ```
//!
//! A read with `length == UART_ABORT_RECEPTION` cancels whatever is pending.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use idhal_core::config::{UART_ABORT_RECEPTION, UART_HEADER_LEN, UART_MAX_ID};
use idhal_core::{HalError, PeripheralClass, Registry, ResourceConfig, Result, SlotState};

use crate::traits::{Clock, SystemClock, UartTransport};

/// UART peripheral instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum UartPeripheral {
    Uart1,
    Uart2,
    Uart3,
    Uart6,
}

/// UART peripherals with their routed RX/TX pins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum UartPort {
    /// USART1, RX PA10, TX PA9.
    Uart1Pa10Pa9,
    /// USART2, RX PD6, TX PD5.
    Uart2Pd6Pd5,
    /// USART2, RX PA3, TX PA2.
    Uart2Pa3Pa2,
    /// USART3, RX PD9, TX PD8.
    Uart3Pd9Pd8,
    /// USART6, RX PC7, TX PC6.
    Uart6Pc7Pc6,
}

impl UartPort {
    pub fn peripheral(self) -> UartPeripheral {
        match self {
            Self::Uart1Pa10Pa9 => UartPeripheral::Uart1,
            Self::Uart2Pd6Pd5 | Self::Uart2Pa3Pa2 => UartPeripheral::Uart2,
            Self::Uart3Pd9Pd8 => UartPeripheral::Uart3,
            Self::Uart6Pc7Pc6 => UartPeripheral::Uart6,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UartBaudRate {
    Bps9600,
    Bps19200,
    Bps57600,
    Bps115200,
    Bps230400,
    Bps460800,
    Bps921600,
}

impl UartBaudRate {
    pub fn bps(self) -> u32 {
        match self {
            Self::Bps9600 => 9_600,
            Self::Bps19200 => 19_200,
            Self::Bps57600 => 57_600,
            Self::Bps115200 => 115_200,
            Self::Bps230400 => 230_400,
            Self::Bps460800 => 460_800,
            Self::Bps921600 => 921_600,
        }
    }
}

/// Binding of a UART ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UartParameters {
    pub port: UartPort,
    pub baud_rate: UartBaudRate,
    /// Longest a read may wait for its bytes.
    pub reception_timeout_ms: u32,
}

impl ResourceConfig for UartParameters {
    const CLASS: PeripheralClass = PeripheralClass::Uart;

    fn validate(&self) -> Result<()> {
        if self.reception_timeout_ms == 0 {
            return Err(HalError::invalid_parameter(
                "UART reception timeout must be greater than zero",
            ));
        }
        Ok(())
    }

    fn conflicts_with(&self, other: &Self) -> bool {
        self.port.peripheral() == other.port.peripheral()
    }
}

/// UART driver context.
#[derive(Debug)]
pub struct UartDriver<T, C = SystemClock, const N: usize = UART_MAX_ID> {
    registry: Registry<UartParameters, (), N>,
    transport: T,
    clock: C,
}

impl<T: UartTransport, const N: usize> UartDriver<T, SystemClock, N> {
    pub fn new(transport: T) -> Self {
        Self::with_clock(transport, SystemClock::new())
    }
}

impl<T: UartTransport, C: Clock, const N: usize> UartDriver<T, C, N> {
    pub fn with_clock(transport: T, clock: C) -> Self {
        Self {
            registry: Registry::new(),
            transport,
            clock,
        }
    }

    /// Bind `id` to a UART peripheral.
    ///
    /// # Errors
    ///
    /// - `InvalidId` if `id >= N`
    /// - `InvalidParameter` if the timeout is zero
    /// - `ConfigurationConflict` if another ID uses the same peripheral
    pub fn init(&mut self, id: u8, parameters: UartParameters) -> Result<()> {
        let transport = &mut self.transport;
        self.registry
            .init(id, parameters, |p| transport.configure(p.port, p.baud_rate))
            .inspect_err(|e| warn!(id, error = %e, "UART init rejected"))?;

        debug!(id, port = ?parameters.port, baud = parameters.baud_rate.bps(), "UART bound");
        Ok(())
    }

    /// Change baud rate, port or timeout of an initialized ID.
    ///
    /// # Errors
    ///
    /// `NotConfigured` if the ID was never initialized, then the same checks as `init`.
    pub fn reconfigure(&mut self, id: u8, parameters: UartParameters) -> Result<()> {
        let transport = &mut self.transport;
        self.registry
            .reconfigure(id, parameters, |p, _| {
                transport.configure(p.port, p.baud_rate)
            })
            .inspect_err(|e| warn!(id, error = %e, "UART reconfigure rejected"))?;

        debug!(id, port = ?parameters.port, baud = parameters.baud_rate.bps(), "UART re-bound");
        Ok(())
    }

    pub fn send(&mut self, id: u8, data: &[u8]) -> Result<()> {
        let port = self.registry.get(id)?.config().port;
        trace!(id, len = data.len(), "UART send");
        self.transport.write(port, data)
    }

    /// Receive `length` bytes into `buffer` after the two-byte count header.
    ///
    /// Returns the number of payload bytes received.
    ///
    /// # Errors
    ///
    /// - `InvalidParameter` if `buffer` cannot hold the header plus `length` bytes
    /// - `DeviceNotResponding` if the bytes do not arrive within the ID's
    ///   timeout; the header is left at zero and partial data is discarded
    pub fn read(&mut self, id: u8, buffer: &mut [u8], length: u32) -> Result<usize> {
        let p = *self.registry.get(id)?.config();

        if length == UART_ABORT_RECEPTION {
            self.transport.flush_rx(p.port)?;
            if let Some(header) = buffer.get_mut(..UART_HEADER_LEN) {
                header.fill(0);
            }
            debug!(id, "UART reception aborted");
            return Ok(0);
        }

        let length = usize::try_from(length)
            .ok()
            .filter(|len| *len <= usize::from(u16::MAX))
            .ok_or_else(|| {
                HalError::invalid_parameter(format!("UART read length {length} exceeds 65535"))
            })?;
        if buffer.len() < length + UART_HEADER_LEN {
            return Err(HalError::invalid_parameter(format!(
                "UART buffer of {} bytes cannot hold {length} bytes plus header",
                buffer.len()
            )));
        }

        let (header, payload) = buffer.split_at_mut(UART_HEADER_LEN);
        let payload = &mut payload[..length];
        header.fill(0);

        let started = self.clock.now_ms();
        let mut received = 0;
        while received < length {
            received += self.transport.poll_read(p.port, &mut payload[received..])?;
            if received < length
                && self.clock.now_ms().saturating_sub(started) >= u64::from(p.reception_timeout_ms)
            {
                payload[..received].fill(0);
                warn!(id, received, expected = length, "UART reception timed out");
                return Err(HalError::timeout(p.reception_timeout_ms));
            }
            std::hint::spin_loop();
        }

        // `length` was checked against u16::MAX above.
        header.copy_from_slice(&(received as u16).to_be_bytes());
        trace!(id, received, "UART read");
        Ok(received)
    }

    pub fn parameters(&self, id: u8) -> Result<&UartParameters> {
        Ok(self.registry.get(id)?.config())
    }

    pub fn state(&self, id: u8) -> Result<SlotState> {
        self.registry.state(id)
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockUart, MockUartHandle, SimClock};
    use idhal_core::{ErrorKind, NoResponse};

    const PORT: UartPort = UartPort::Uart2Pa3Pa2;

    fn parameters() -> UartParameters {
        UartParameters {
            port: PORT,
            baud_rate: UartBaudRate::Bps115200,
            reception_timeout_ms: 50,
        }
    }

    fn driver() -> (UartDriver<MockUart, SimClock>, MockUartHandle, SimClock) {
        let (transport, handle) = MockUart::new();
        let clock = SimClock::new();
        let mut uart = UartDriver::with_clock(transport, clock.clone());
        uart.init(0, parameters()).unwrap();
        (uart, handle, clock)
    }

    #[test]
    fn test_send() {
        let (mut uart, handle, _clock) = driver();
        uart.send(0, b"hello").unwrap();
        assert_eq!(handle.sent(PORT), b"hello".to_vec());
    }

    #[test]
    fn test_read_writes_count_header() {
        let (mut uart, handle, _clock) = driver();
        handle.feed(PORT, &[0x10, 0x20, 0x30]);

        let mut buffer = [0xEEu8; 5];
        let received = uart.read(0, &mut buffer, 3).unwrap();

        assert_eq!(received, 3);
        assert_eq!(buffer, [0x00, 0x03, 0x10, 0x20, 0x30]);
    }

    #[test]
    fn test_read_leaves_extra_bytes_queued() {
        let (mut uart, handle, _clock) = driver();
        handle.feed(PORT, &[1, 2, 3, 4]);

        let mut buffer = [0u8; 4];
        uart.read(0, &mut buffer, 2).unwrap();
        assert_eq!(&buffer[2..], &[1, 2]);

        uart.read(0, &mut buffer, 2).unwrap();
        assert_eq!(&buffer[2..], &[3, 4]);
    }

    #[test]
    fn test_abort_flushes_and_returns_zero() {
        let (mut uart, handle, _clock) = driver();
        handle.feed(PORT, &[9, 9, 9]);

        let mut buffer = [0xFFu8; 4];
        let received = uart.read(0, &mut buffer, UART_ABORT_RECEPTION).unwrap();

        assert_eq!(received, 0);
        assert_eq!(&buffer[..2], &[0, 0]);
        assert_eq!(handle.pending(PORT), 0);
    }

    #[test]
    fn test_timeout_leaves_header_zero() {
        let (mut uart, handle, clock) = driver();
        handle.feed(PORT, &[0xAB]);

        let mut buffer = [0xEEu8; 6];
        let error = uart.read(0, &mut buffer, 4).unwrap_err();

        assert_eq!(
            error,
            HalError::DeviceNotResponding {
                cause: NoResponse::Timeout { duration_ms: 50 }
            }
        );
        assert_eq!(&buffer[..3], &[0, 0, 0]);
        assert!(clock.now_ms() >= 50);
    }

    #[test]
    fn test_buffer_too_small() {
        let (mut uart, _handle, _clock) = driver();
        let mut buffer = [0u8; 4];
        let error = uart.read(0, &mut buffer, 3).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidParameter);
    }

    #[test]
    fn test_zero_timeout_is_invalid() {
        let (mut uart, _handle, _clock) = driver();
        let p = UartParameters {
            port: UartPort::Uart1Pa10Pa9,
            reception_timeout_ms: 0,
            ..parameters()
        };
        assert_eq!(uart.init(1, p).unwrap_err().kind(), ErrorKind::InvalidParameter);
    }

    #[test]
    fn test_same_peripheral_conflicts_across_routings() {
        let (mut uart, _handle, _clock) = driver();
        let other_routing = UartParameters {
            port: UartPort::Uart2Pd6Pd5,
            ..parameters()
        };
        let error = uart.init(1, other_routing).unwrap_err();
        assert_eq!(error, HalError::conflict(PeripheralClass::Uart, 1, 0));

        uart.init(1, UartParameters {
            port: UartPort::Uart6Pc7Pc6,
            ..parameters()
        })
        .unwrap();
    }

    #[test]
    fn test_reconfigure_baud_rate() {
        let (mut uart, handle, _clock) = driver();
        uart.reconfigure(
            0,
            UartParameters {
                baud_rate: UartBaudRate::Bps9600,
                ..parameters()
            },
        )
        .unwrap();

        assert_eq!(handle.baud_rate(PORT), Some(UartBaudRate::Bps9600));
        assert_eq!(
            uart.reconfigure(1, parameters()).unwrap_err().kind(),
            ErrorKind::NotConfigured
        );
    }
}
