//! HD44780 16x2 character LCD behind a PCF8574 I2C port expander.
//!
//! The expander drives the LCD in 4-bit mode. Each byte written to it sets
//! the lines P0..P7 as RS, RW, EN, backlight, D4..D7; a nibble is latched by
//! writing it once with EN high and once with EN low. The expander has no
//! register address, so every write is a bare payload.

use tracing::trace;

use idhal_core::config::HD44780_MAX_ID;
use idhal_core::{HalError, Result};
use idhal_drivers::i2c::RegisterWidth;
use idhal_drivers::{I2cDriver, I2cTransport};

use super::Cursor;
use crate::table::{self, DeviceTable};
use crate::traits::{Color, DisplayDevice, DisplaySpecs, I2cAttachment};

const RS: u8 = 0x01;
const EN: u8 = 0x04;
const BACKLIGHT: u8 = 0x08;

const CLEAR_DISPLAY: u8 = 0x01;
const SET_DDRAM_ADDRESS: u8 = 0x80;

/// DDRAM address of the first cell of each row.
const ROW_OFFSETS: [u8; 2] = [0x00, 0x40];

/// Function set 4-bit/2 lines/5x8, display off, clear, entry increment, display on.
const POWER_UP: [u8; 5] = [0x28, 0x08, CLEAR_DISPLAY, 0x06, 0x0C];

const SPECS: DisplaySpecs = DisplaySpecs {
    h_pixels: 16 * 5,
    v_pixels: 2 * 8,
    h_chars: 16,
    v_chars: 2,
};

fn is_expander_address(address: u16) -> bool {
    // PCF8574 and PCF8574A.
    matches!(address, 0x20..=0x27 | 0x38..=0x3F)
}

/// Expander bytes latching `nibble` (in the upper four bits).
fn pulse(nibble: u8, rs: u8) -> [u8; 2] {
    let lines = (nibble & 0xF0) | BACKLIGHT | rs;
    [lines | EN, lines]
}

/// Expander bytes for one full byte, high nibble first.
fn frame(value: u8, rs: u8) -> [u8; 4] {
    let [a, b] = pulse(value, rs);
    let [c, d] = pulse(value << 4, rs);
    [a, b, c, d]
}

fn command<T: I2cTransport, const M: usize>(
    bus: &mut I2cDriver<T, M>,
    bus_id: u8,
    value: u8,
) -> Result<()> {
    bus.send(bus_id, 0, &frame(value, 0))
}

/// HD44780 driver with its own device table.
#[derive(Debug)]
pub struct Hd44780<const N: usize = HD44780_MAX_ID> {
    devices: DeviceTable<table::Display, Cursor, N>,
}

impl<const N: usize> Hd44780<N> {
    pub fn new() -> Self {
        Self {
            devices: DeviceTable::new(),
        }
    }

    pub fn cursor(&mut self, id: u8) -> Result<Cursor> {
        let (_, cursor) = self.devices.ready(id)?;
        Ok(*cursor)
    }
}

impl<const N: usize> Default for Hd44780<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: I2cTransport, const M: usize, const N: usize> DisplayDevice<I2cDriver<T, M>>
    for Hd44780<N>
{
    fn int_hw_init(
        &mut self,
        bus: &mut I2cDriver<T, M>,
        id: u8,
        attachment: I2cAttachment,
    ) -> Result<()> {
        if !is_expander_address(attachment.address) {
            return Err(HalError::invalid_parameter(format!(
                "0x{:02X} is not a PCF8574 address",
                attachment.address
            )));
        }
        self.devices.bind(id, attachment.bus_id, |bus_id| {
            bus.attach(bus_id, attachment.parameters(RegisterWidth::None))
        })
    }

    fn ext_hw_config(&mut self, bus: &mut I2cDriver<T, M>, id: u8) -> Result<()> {
        self.devices.configure(id, |bus_id, cursor| {
            // Three 8-bit function sets resynchronize the interface, then switch to 4 bits.
            let mut reset = Vec::with_capacity(8);
            for nibble in [0x30, 0x30, 0x30, 0x20] {
                reset.extend(pulse(nibble, 0));
            }
            bus.send(bus_id, 0, &reset)?;
            for value in POWER_UP {
                command(bus, bus_id, value)?;
            }
            *cursor = Cursor::default();
            Ok(())
        })
    }

    fn set_cursor(&mut self, bus: &mut I2cDriver<T, M>, id: u8, row: u8, column: u8) -> Result<()> {
        SPECS.check_cell(row, column)?;
        let (bus_id, cursor) = self.devices.ready(id)?;
        command(
            bus,
            bus_id,
            SET_DDRAM_ADDRESS | (ROW_OFFSETS[usize::from(row)] + column),
        )?;
        *cursor = Cursor { row, column };
        Ok(())
    }

    fn send_char(
        &mut self,
        bus: &mut I2cDriver<T, M>,
        id: u8,
        character: u8,
        row: u8,
        column: u8,
        color: Color,
    ) -> Result<()> {
        SPECS.check_cell(row, column)?;
        let (bus_id, cursor) = self.devices.ready(id)?;
        if color == Color::Inverted {
            return Err(HalError::unsupported("inverted text on HD44780"));
        }

        command(
            bus,
            bus_id,
            SET_DDRAM_ADDRESS | (ROW_OFFSETS[usize::from(row)] + column),
        )?;
        bus.send(bus_id, 0, &frame(character, RS))?;
        trace!(id, character, row, column, "HD44780 char");

        *cursor = Cursor { row, column }.advance(&SPECS);
        Ok(())
    }

    fn clear_screen(&mut self, bus: &mut I2cDriver<T, M>, id: u8, color: Color) -> Result<()> {
        let (bus_id, cursor) = self.devices.ready(id)?;
        if color == Color::Inverted {
            return Err(HalError::unsupported("inverted fill on HD44780"));
        }
        command(bus, bus_id, CLEAR_DISPLAY)?;
        *cursor = Cursor::default();
        Ok(())
    }

    fn draw_pixels(
        &mut self,
        _bus: &mut I2cDriver<T, M>,
        id: u8,
        _pixels: &[u8],
        _page: u8,
        _column: u8,
    ) -> Result<()> {
        self.devices.ready(id)?;
        Err(HalError::unsupported("pixel drawing on HD44780"))
    }

    fn read_specs(&self) -> DisplaySpecs {
        SPECS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use idhal_core::ErrorKind;
    use idhal_drivers::i2c::I2cPort;
    use idhal_drivers::mock::{MockI2c, MockI2cHandle, SimI2cDevice};

    const PORT: I2cPort = I2cPort::I2c1Pb7Pb6;
    const ADDRESS: u16 = 0x27;

    fn ready() -> (Hd44780, I2cDriver<MockI2c>, MockI2cHandle) {
        let (transport, handle) = MockI2c::new();
        handle.attach(PORT, ADDRESS, SimI2cDevice::new(RegisterWidth::None));
        let mut bus = I2cDriver::new(transport);
        let mut display = Hd44780::new();
        display
            .int_hw_init(&mut bus, 0, I2cAttachment::new(0, PORT, ADDRESS))
            .unwrap();
        display.ext_hw_config(&mut bus, 0).unwrap();
        (display, bus, handle)
    }

    #[test]
    fn test_frame_latches_both_nibbles() {
        assert_eq!(frame(0x41, RS), [0x4D, 0x49, 0x1D, 0x19]);
    }

    #[test]
    fn test_power_up_sequence() {
        let (_display, _bus, handle) = ready();

        let received = handle.received(PORT, ADDRESS);
        assert_eq!(&received[..8], &[0x3C, 0x38, 0x3C, 0x38, 0x3C, 0x38, 0x2C, 0x28]);
        assert_eq!(&received[8..12], &frame(0x28, 0));
        assert_eq!(received.len(), 8 + POWER_UP.len() * 4);
    }

    #[test]
    fn test_send_string_wraps_to_second_row() {
        let (mut display, mut bus, handle) = ready();
        let before = handle.received(PORT, ADDRESS).len();

        display
            .send_string(&mut bus, 0, b"AB", 0, 15, Color::Normal)
            .unwrap();

        let received = handle.received(PORT, ADDRESS);
        let sent = &received[before..];
        assert_eq!(&sent[0..4], &frame(0x80 | 0x0F, 0));
        assert_eq!(&sent[4..8], &frame(b'A', RS));
        assert_eq!(&sent[8..12], &frame(0x80 | 0x40, 0));
        assert_eq!(&sent[12..16], &frame(b'B', RS));
        assert_eq!(display.cursor(0).unwrap(), Cursor { row: 1, column: 1 });
    }

    #[test]
    fn test_string_past_last_cell_sends_nothing() {
        let (mut display, mut bus, handle) = ready();
        let before = handle.received(PORT, ADDRESS).len();

        let error = display
            .send_string(&mut bus, 0, b"ABC", 1, 14, Color::Normal)
            .unwrap_err();

        assert_eq!(error.kind(), ErrorKind::InvalidParameter);
        assert_eq!(handle.received(PORT, ADDRESS).len(), before);
    }

    #[test]
    fn test_pixels_and_inversion_unsupported() {
        let (mut display, mut bus, _handle) = ready();

        let error = display
            .draw_pixels(&mut bus, 0, &[0xFF], 0, 0)
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Unsupported);

        let error = display
            .clear_screen(&mut bus, 0, Color::Inverted)
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Unsupported);
    }

    #[test]
    fn test_rejects_non_expander_address() {
        let (transport, _handle) = MockI2c::new();
        let mut bus: I2cDriver<_> = I2cDriver::new(transport);
        let mut display: Hd44780 = Hd44780::new();

        let error = display
            .int_hw_init(&mut bus, 0, I2cAttachment::new(0, PORT, 0x3C))
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidParameter);
    }
}
