//! Device class traits and the records they exchange.
//!
//! Each class trait is generic over the bus driver `B` its chips sit on. A
//! concrete chip implements the trait for the bus it speaks (all displays and
//! inertial sensors here for [`I2cDriver`], the SD card for [`SpiDriver`]),
//! and the application calls through the trait with the bus driver passed in
//! by `&mut`. The traits are used with static dispatch only.

use serde::{Deserialize, Serialize};

use idhal_core::{HalError, Result};
use idhal_drivers::i2c::{I2cPort, RegisterWidth};
use idhal_drivers::spi::{ChipSelect, SpiClock, SpiPort};
use idhal_drivers::{I2cDriver, I2cParameters, SpiDriver, SpiParameters};

/// A bus driver that devices can be attached to.
pub trait DeviceBus {
    /// Where a device sits on this bus: the bus ID to bind plus its wiring.
    type Attachment: Clone + std::fmt::Debug;
}

impl<T, const N: usize> DeviceBus for I2cDriver<T, N> {
    type Attachment = I2cAttachment;
}

impl<T, const N: usize> DeviceBus for SpiDriver<T, N> {
    type Attachment = SpiAttachment;
}

/// Wiring of a device on an I2C bus.
///
/// Register width and baud rate are chosen by the chip driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct I2cAttachment {
    /// I2C ID the device binds.
    pub bus_id: u8,
    pub port: I2cPort,
    /// 7-bit device address.
    pub address: u16,
    pub pull_up: bool,
}

impl I2cAttachment {
    pub fn new(bus_id: u8, port: I2cPort, address: u16) -> Self {
        Self {
            bus_id,
            port,
            address,
            pull_up: false,
        }
    }

    pub fn with_pull_up(mut self, pull_up: bool) -> Self {
        self.pull_up = pull_up;
        self
    }

    /// Bus parameters for a chip using `register_width`.
    pub fn parameters(&self, register_width: RegisterWidth) -> I2cParameters {
        I2cParameters::new(self.port, self.address)
            .with_pull_up(self.pull_up)
            .with_register_width(register_width)
    }
}

/// Wiring of a device on an SPI bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpiAttachment {
    /// SPI ID the device binds.
    pub bus_id: u8,
    pub port: SpiPort,
    pub chip_select: ChipSelect,
    pub clock: SpiClock,
}

impl SpiAttachment {
    pub fn new(bus_id: u8, port: SpiPort, chip_select: ChipSelect, clock: SpiClock) -> Self {
        Self {
            bus_id,
            port,
            chip_select,
            clock,
        }
    }

    pub fn parameters(&self) -> SpiParameters {
        SpiParameters::new(self.port, self.chip_select, self.clock)
    }
}

// ============================================================================
// Display
// ============================================================================

/// Foreground/background choice for text and fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Color {
    /// Lit pixels on a dark background.
    #[default]
    Normal,
    /// Dark pixels on a lit background.
    Inverted,
}

/// Static description of a display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplaySpecs {
    pub h_pixels: u16,
    pub v_pixels: u16,
    /// Characters per row.
    pub h_chars: u8,
    /// Character rows.
    pub v_chars: u8,
}

impl DisplaySpecs {
    /// Check that a character cell lies on the screen.
    ///
    /// # Errors
    ///
    /// `InvalidParameter` if `row` or `column` is off the character grid.
    pub fn check_cell(&self, row: u8, column: u8) -> Result<()> {
        if row >= self.v_chars || column >= self.h_chars {
            return Err(HalError::invalid_parameter(format!(
                "cell ({row}, {column}) is outside the {}x{} character grid",
                self.v_chars, self.h_chars
            )));
        }
        Ok(())
    }

    /// Characters that fit from `(row, column)` to the end of the screen.
    pub fn cells_from(&self, row: u8, column: u8) -> usize {
        let total = usize::from(self.v_chars) * usize::from(self.h_chars);
        let start = usize::from(row) * usize::from(self.h_chars) + usize::from(column);
        total.saturating_sub(start)
    }
}

/// Character display.
///
/// Rows and columns address the character grid reported by
/// [`read_specs`](Self::read_specs); `draw_pixels` addresses 8-pixel-tall
/// pages and pixel columns.
pub trait DisplayDevice<B: DeviceBus> {
    /// Bind the bus ID the display sits on.
    ///
    /// # Errors
    ///
    /// `InvalidId` for the device ID, or any error of the bus `init`.
    fn int_hw_init(&mut self, bus: &mut B, id: u8, attachment: B::Attachment) -> Result<()>;

    /// Run the display's power-up sequence.
    ///
    /// # Errors
    ///
    /// `NotConfigured` if `int_hw_init` has not run for `id`.
    fn ext_hw_config(&mut self, bus: &mut B, id: u8) -> Result<()>;

    fn set_cursor(&mut self, bus: &mut B, id: u8, row: u8, column: u8) -> Result<()>;

    fn send_char(
        &mut self,
        bus: &mut B,
        id: u8,
        character: u8,
        row: u8,
        column: u8,
        color: Color,
    ) -> Result<()>;

    /// Write `text` from `(row, column)`, wrapping to the next row.
    ///
    /// # Errors
    ///
    /// `InvalidParameter`, before anything is written, if the text runs past
    /// the last cell.
    fn send_string(
        &mut self,
        bus: &mut B,
        id: u8,
        text: &[u8],
        row: u8,
        column: u8,
        color: Color,
    ) -> Result<()> {
        let specs = self.read_specs();
        specs.check_cell(row, column)?;
        if text.len() > specs.cells_from(row, column) {
            return Err(HalError::invalid_parameter(format!(
                "{} characters do not fit from cell ({row}, {column})",
                text.len()
            )));
        }

        let start = usize::from(row) * usize::from(specs.h_chars) + usize::from(column);
        for (offset, character) in text.iter().enumerate() {
            let cell = start + offset;
            // Both fit in u8: `cell` is below v_chars * h_chars.
            let row = (cell / usize::from(specs.h_chars)) as u8;
            let column = (cell % usize::from(specs.h_chars)) as u8;
            self.send_char(bus, id, *character, row, column, color)?;
        }
        Ok(())
    }

    fn clear_screen(&mut self, bus: &mut B, id: u8, color: Color) -> Result<()>;

    /// Write raw column bytes (bit 0 on top) from `page`, `column` onwards.
    ///
    /// # Errors
    ///
    /// `Unsupported` on displays without pixel access.
    fn draw_pixels(&mut self, bus: &mut B, id: u8, pixels: &[u8], page: u8, column: u8)
    -> Result<()>;

    fn read_specs(&self) -> DisplaySpecs;
}

// ============================================================================
// IMU
// ============================================================================

/// One three-axis sample.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Axes {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Axes {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Scale raw counts by `1 / sensitivity`.
    pub fn scaled(raw: [i16; 3], sensitivity: f32) -> Self {
        Self::new(
            f32::from(raw[0]) / sensitivity,
            f32::from(raw[1]) / sensitivity,
            f32::from(raw[2]) / sensitivity,
        )
    }
}

/// Measurements of an inertial sensor.
///
/// A driver only writes the fields its chip measures; the others keep
/// whatever the caller put there.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ImuData {
    /// Acceleration in g.
    pub accelerometer: Option<Axes>,
    /// Angular rate in degrees per second.
    pub gyroscope: Option<Axes>,
    /// Magnetic field in gauss.
    pub magnetometer: Option<Axes>,
    /// Die temperature in degrees Celsius.
    pub temperature: Option<f32>,
}

/// Static description of an inertial sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImuSpecs {
    pub accelerometer_axes: u8,
    pub gyroscope_axes: u8,
    pub magnetometer_axes: u8,
    pub temperature: bool,
    /// Output data rate after `ext_hw_config`.
    pub sample_rate_hz: u16,
}

/// Inertial sensor.
pub trait ImuDevice<B: DeviceBus> {
    /// Bind the bus ID the sensor sits on.
    ///
    /// # Errors
    ///
    /// `InvalidId` for the device ID, or any error of the bus `init`.
    fn int_hw_init(&mut self, bus: &mut B, id: u8, attachment: B::Attachment) -> Result<()>;

    /// Identify the chip and start continuous measurement.
    ///
    /// # Errors
    ///
    /// - `NotConfigured` if `int_hw_init` has not run for `id`
    /// - `HardwareFault` if the chip identifies as something else
    fn ext_hw_config(&mut self, bus: &mut B, id: u8) -> Result<()>;

    /// Fill the fields of `data` this chip measures.
    fn read(&mut self, bus: &mut B, id: u8, data: &mut ImuData) -> Result<()>;

    fn read_specs(&self) -> ImuSpecs;
}

// ============================================================================
// Storage
// ============================================================================

/// Static description of a block device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageSpecs {
    /// Bytes per block.
    pub block_size: u16,
    /// Highest bus clock the device accepts after power-up.
    pub max_clock_hz: u32,
}

/// Block storage.
pub trait StorageDevice<B: DeviceBus> {
    /// Bind the bus ID the device sits on.
    ///
    /// # Errors
    ///
    /// `InvalidId` for the device ID, or any error of the bus `init`.
    fn int_hw_init(&mut self, bus: &mut B, id: u8, attachment: B::Attachment) -> Result<()>;

    /// Run the device's power-up sequence.
    ///
    /// # Errors
    ///
    /// `NotConfigured` if `int_hw_init` has not run for `id`.
    fn ext_hw_config(&mut self, bus: &mut B, id: u8) -> Result<()>;

    /// Read `buffer.len() / block_size` blocks starting at `block`.
    ///
    /// # Errors
    ///
    /// `InvalidParameter` if the buffer is not a whole number of blocks.
    fn read_blocks(&mut self, bus: &mut B, id: u8, block: u32, buffer: &mut [u8]) -> Result<()>;

    /// Write `data.len() / block_size` blocks starting at `block`.
    ///
    /// # Errors
    ///
    /// `InvalidParameter` if the data is not a whole number of blocks.
    fn write_blocks(&mut self, bus: &mut B, id: u8, block: u32, data: &[u8]) -> Result<()>;

    fn read_specs(&self) -> StorageSpecs;
}
