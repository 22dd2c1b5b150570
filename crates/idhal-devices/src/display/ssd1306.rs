//! SSD1306 128x64 OLED on I2C.
//!
//! Every bus write starts with a control byte, sent as the register address:
//! `0x00` for a command stream, `0x40` for display RAM data. Characters are
//! 8x16 cells (a 5x7 glyph stretched to double height), giving a 16x4 grid.

use tracing::trace;

use idhal_core::config::SSD1306_MAX_ID;
use idhal_core::{HalError, Result};
use idhal_drivers::i2c::RegisterWidth;
use idhal_drivers::{I2cDriver, I2cTransport};

use super::{Cursor, font};
use crate::table::{self, DeviceTable};
use crate::traits::{Color, DisplayDevice, DisplaySpecs, I2cAttachment};

/// Device addresses selectable with the SA0 pin.
pub const SSD1306_ADDRESSES: [u16; 2] = [0x3C, 0x3D];

const CONTROL_COMMAND: u32 = 0x00;
const CONTROL_DATA: u32 = 0x40;

const SET_COLUMN_ADDRESS: u8 = 0x21;
const SET_PAGE_ADDRESS: u8 = 0x22;

const H_PIXELS: u8 = 128;
const PAGES: u8 = 8;
const CELL_WIDTH: u8 = 8;
const CELL_PAGES: u8 = 2;

const SPECS: DisplaySpecs = DisplaySpecs {
    h_pixels: H_PIXELS as u16,
    v_pixels: (PAGES as u16) * 8,
    h_chars: H_PIXELS / CELL_WIDTH,
    v_chars: PAGES / CELL_PAGES,
};

/// Power-up command stream: 128x64 panel, internal charge pump, horizontal
/// addressing, display on.
#[rustfmt::skip]
const POWER_UP: [u8; 25] = [
    0xAE,       // display off
    0xD5, 0x80, // clock divide
    0xA8, 0x3F, // multiplex 64
    0xD3, 0x00, // display offset
    0x40,       // start line 0
    0x8D, 0x14, // charge pump on
    0x20, 0x00, // horizontal addressing
    0xA1,       // segment remap
    0xC8,       // COM scan descending
    0xDA, 0x12, // COM pins
    0x81, 0xCF, // contrast
    0xD9, 0xF1, // pre-charge
    0xDB, 0x40, // VCOMH deselect
    0xA4,       // resume from RAM
    0xA6,       // normal (not inverted)
    0xAF,       // display on
];

/// SSD1306 driver with its own device table.
#[derive(Debug)]
pub struct Ssd1306<const N: usize = SSD1306_MAX_ID> {
    devices: DeviceTable<table::Display, Cursor, N>,
}

impl<const N: usize> Ssd1306<N> {
    pub fn new() -> Self {
        Self {
            devices: DeviceTable::new(),
        }
    }

    /// Current cursor of a ready display.
    pub fn cursor(&mut self, id: u8) -> Result<Cursor> {
        let (_, cursor) = self.devices.ready(id)?;
        Ok(*cursor)
    }
}

impl<const N: usize> Default for Ssd1306<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Restrict RAM writes to the given column and page window.
fn window<T: I2cTransport, const M: usize>(
    bus: &mut I2cDriver<T, M>,
    bus_id: u8,
    columns: (u8, u8),
    pages: (u8, u8),
) -> Result<()> {
    bus.send(
        bus_id,
        CONTROL_COMMAND,
        &[
            SET_COLUMN_ADDRESS,
            columns.0,
            columns.1,
            SET_PAGE_ADDRESS,
            pages.0,
            pages.1,
        ],
    )
}

fn paint(byte: u8, color: Color) -> u8 {
    match color {
        Color::Normal => byte,
        Color::Inverted => !byte,
    }
}

impl<T: I2cTransport, const M: usize, const N: usize> DisplayDevice<I2cDriver<T, M>>
    for Ssd1306<N>
{
    fn int_hw_init(
        &mut self,
        bus: &mut I2cDriver<T, M>,
        id: u8,
        attachment: I2cAttachment,
    ) -> Result<()> {
        if !SSD1306_ADDRESSES.contains(&attachment.address) {
            return Err(HalError::invalid_parameter(format!(
                "0x{:02X} is not an SSD1306 address",
                attachment.address
            )));
        }
        self.devices.bind(id, attachment.bus_id, |bus_id| {
            bus.attach(bus_id, attachment.parameters(RegisterWidth::Bits8))
        })
    }

    fn ext_hw_config(&mut self, bus: &mut I2cDriver<T, M>, id: u8) -> Result<()> {
        self.devices.configure(id, |bus_id, cursor| {
            bus.send(bus_id, CONTROL_COMMAND, &POWER_UP)?;
            *cursor = Cursor::default();
            Ok(())
        })
    }

    fn set_cursor(&mut self, bus: &mut I2cDriver<T, M>, id: u8, row: u8, column: u8) -> Result<()> {
        SPECS.check_cell(row, column)?;
        let (bus_id, cursor) = self.devices.ready(id)?;
        window(
            bus,
            bus_id,
            (column * CELL_WIDTH, H_PIXELS - 1),
            (row * CELL_PAGES, PAGES - 1),
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

        let x = column * CELL_WIDTH;
        let page = row * CELL_PAGES;
        window(bus, bus_id, (x, x + CELL_WIDTH - 1), (page, page + 1))?;

        // Horizontal addressing fills the top page of the cell, then the bottom.
        let mut top = [0u8; CELL_WIDTH as usize];
        let mut bottom = [0u8; CELL_WIDTH as usize];
        for (i, column_bits) in font::glyph(character).iter().enumerate() {
            (top[i + 1], bottom[i + 1]) = font::stretch(*column_bits);
        }
        let data: Vec<u8> = top
            .iter()
            .chain(&bottom)
            .map(|byte| paint(*byte, color))
            .collect();

        bus.send(bus_id, CONTROL_DATA, &data)?;
        trace!(id, character, row, column, "SSD1306 char");

        *cursor = Cursor { row, column }.advance(&SPECS);
        Ok(())
    }

    fn clear_screen(&mut self, bus: &mut I2cDriver<T, M>, id: u8, color: Color) -> Result<()> {
        let (bus_id, cursor) = self.devices.ready(id)?;
        window(bus, bus_id, (0, H_PIXELS - 1), (0, PAGES - 1))?;

        let frame = vec![paint(0x00, color); usize::from(H_PIXELS) * usize::from(PAGES)];
        bus.send(bus_id, CONTROL_DATA, &frame)?;
        *cursor = Cursor::default();
        Ok(())
    }

    fn draw_pixels(
        &mut self,
        bus: &mut I2cDriver<T, M>,
        id: u8,
        pixels: &[u8],
        page: u8,
        column: u8,
    ) -> Result<()> {
        if page >= PAGES || column >= H_PIXELS {
            return Err(HalError::invalid_parameter(format!(
                "pixel position (page {page}, column {column}) is off the panel"
            )));
        }
        let room = usize::from(H_PIXELS - column) * usize::from(PAGES - page);
        if pixels.len() > room {
            return Err(HalError::invalid_parameter(format!(
                "{} pixel bytes do not fit from page {page}, column {column}",
                pixels.len()
            )));
        }

        let (bus_id, _) = self.devices.ready(id)?;
        window(bus, bus_id, (column, H_PIXELS - 1), (page, PAGES - 1))?;
        bus.send(bus_id, CONTROL_DATA, pixels)
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
    use idhal_drivers::mock::{I2cTransaction, MockI2c, MockI2cHandle, SimI2cDevice};

    const PORT: I2cPort = I2cPort::I2c3Pc9Pa8;

    fn ready() -> (Ssd1306, I2cDriver<MockI2c>, MockI2cHandle) {
        let (transport, handle) = MockI2c::new();
        handle.attach(PORT, 0x3C, SimI2cDevice::new(RegisterWidth::Bits8));
        let mut bus = I2cDriver::new(transport);
        let mut display = Ssd1306::new();
        display
            .int_hw_init(&mut bus, 0, I2cAttachment::new(1, PORT, 0x3C))
            .unwrap();
        display.ext_hw_config(&mut bus, 0).unwrap();
        handle.clear_transactions();
        (display, bus, handle)
    }

    fn writes(handle: &MockI2cHandle) -> Vec<Vec<u8>> {
        handle
            .transactions()
            .into_iter()
            .filter_map(|t| match t {
                I2cTransaction::Write { bytes, .. } => Some(bytes),
                I2cTransaction::Read { .. } => None,
            })
            .collect()
    }

    #[test]
    fn test_power_up_sequence() {
        let (transport, handle) = MockI2c::new();
        handle.attach(PORT, 0x3D, SimI2cDevice::new(RegisterWidth::Bits8));
        let mut bus: I2cDriver<_> = I2cDriver::new(transport);
        let mut display: Ssd1306 = Ssd1306::new();

        display
            .int_hw_init(&mut bus, 0, I2cAttachment::new(0, PORT, 0x3D))
            .unwrap();
        display.ext_hw_config(&mut bus, 0).unwrap();

        let sent = writes(&handle);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0][0], 0x00);
        assert_eq!(&sent[0][1..], &POWER_UP);
    }

    #[test]
    fn test_rejects_foreign_address() {
        let (transport, _handle) = MockI2c::new();
        let mut bus: I2cDriver<_> = I2cDriver::new(transport);
        let mut display: Ssd1306 = Ssd1306::new();

        let error = display
            .int_hw_init(&mut bus, 0, I2cAttachment::new(0, PORT, 0x68))
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidParameter);
        assert_eq!(bus.parameters(0).unwrap_err().kind(), ErrorKind::NotConfigured);
    }

    #[test]
    fn test_send_char_writes_one_cell() {
        let (mut display, mut bus, handle) = ready();

        display
            .send_char(&mut bus, 0, b'I', 1, 2, Color::Normal)
            .unwrap();

        let sent = writes(&handle);
        assert_eq!(sent[0], vec![0x00, 0x21, 16, 23, 0x22, 2, 3]);
        let data = &sent[1];
        assert_eq!(data[0], 0x40);
        assert_eq!(data.len(), 1 + 16);
        // 'I' has its stem in the third glyph column.
        assert_eq!(data[1 + 3], 0xFF);
        assert_eq!(data[1 + 8 + 3], 0x3F);
        assert_eq!(display.cursor(0).unwrap(), Cursor { row: 1, column: 3 });
    }

    #[test]
    fn test_inverted_char() {
        let (mut display, mut bus, handle) = ready();

        display
            .send_char(&mut bus, 0, b' ', 0, 0, Color::Inverted)
            .unwrap();

        let data = &writes(&handle)[1];
        assert!(data[1..].iter().all(|byte| *byte == 0xFF));
    }

    #[test]
    fn test_cursor_wraps_after_last_column() {
        let (mut display, mut bus, _handle) = ready();

        display
            .send_char(&mut bus, 0, b'A', 3, 15, Color::Normal)
            .unwrap();
        assert_eq!(display.cursor(0).unwrap(), Cursor::default());
    }

    #[test]
    fn test_clear_screen_writes_full_frame() {
        let (mut display, mut bus, handle) = ready();

        display.clear_screen(&mut bus, 0, Color::Normal).unwrap();

        let sent = writes(&handle);
        assert_eq!(sent[0], vec![0x00, 0x21, 0, 127, 0x22, 0, 7]);
        assert_eq!(sent[1].len(), 1 + 1024);
        assert!(sent[1][1..].iter().all(|byte| *byte == 0));
    }

    #[test]
    fn test_draw_pixels_bounds() {
        let (mut display, mut bus, handle) = ready();

        display
            .draw_pixels(&mut bus, 0, &[0xAA; 8], 7, 120)
            .unwrap();
        let mut expected = vec![0x40];
        expected.extend([0xAA; 8]);
        assert_eq!(writes(&handle)[1], expected);

        let error = display
            .draw_pixels(&mut bus, 0, &[0xAA; 9], 7, 120)
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidParameter);
    }

    #[test]
    fn test_cell_off_grid() {
        let (mut display, mut bus, _handle) = ready();

        let error = display.set_cursor(&mut bus, 0, 4, 0).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidParameter);
    }

    #[test]
    fn test_operations_need_power_up() {
        let (transport, handle) = MockI2c::new();
        handle.attach(PORT, 0x3C, SimI2cDevice::new(RegisterWidth::Bits8));
        let mut bus: I2cDriver<_> = I2cDriver::new(transport);
        let mut display: Ssd1306 = Ssd1306::new();
        display
            .int_hw_init(&mut bus, 0, I2cAttachment::new(0, PORT, 0x3C))
            .unwrap();

        let error = display
            .send_char(&mut bus, 0, b'A', 0, 0, Color::Normal)
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::NotConfigured);
        assert!(handle.transactions().is_empty());
    }
}
