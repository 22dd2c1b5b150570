//! QMC5883L three-axis magnetometer on I2C.
//!
//! Runs in continuous mode at 200 Hz with the +-8 G range. Output registers
//! are little-endian.

use tracing::trace;

use idhal_core::config::QMC5883L_MAX_ID;
use idhal_core::{HalError, Result};
use idhal_drivers::i2c::RegisterWidth;
use idhal_drivers::{I2cDriver, I2cTransport};

use crate::table::{self, DeviceTable};
use crate::traits::{Axes, I2cAttachment, ImuData, ImuDevice, ImuSpecs};

pub const QMC5883L_ADDRESS: u16 = 0x0D;

const DATA_X_LSB: u32 = 0x00;
const CONTROL_1: u32 = 0x09;
const SET_RESET_PERIOD: u32 = 0x0B;
const CHIP_ID_REGISTER: u32 = 0x0D;

const CHIP_ID: u8 = 0xFF;
/// Continuous mode, 200 Hz, 8 G, oversampling 512.
const CONTINUOUS_200HZ_8G: u8 = 0x1D;

const LSB_PER_GAUSS: f32 = 3000.0;

const SPECS: ImuSpecs = ImuSpecs {
    accelerometer_axes: 0,
    gyroscope_axes: 0,
    magnetometer_axes: 3,
    temperature: false,
    sample_rate_hz: 200,
};

/// QMC5883L driver with its own device table.
#[derive(Debug)]
pub struct Qmc5883l<const N: usize = QMC5883L_MAX_ID> {
    devices: DeviceTable<table::Imu, (), N>,
}

impl<const N: usize> Qmc5883l<N> {
    pub fn new() -> Self {
        Self {
            devices: DeviceTable::new(),
        }
    }
}

impl<const N: usize> Default for Qmc5883l<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: I2cTransport, const M: usize, const N: usize> ImuDevice<I2cDriver<T, M>> for Qmc5883l<N> {
    fn int_hw_init(
        &mut self,
        bus: &mut I2cDriver<T, M>,
        id: u8,
        attachment: I2cAttachment,
    ) -> Result<()> {
        if attachment.address != QMC5883L_ADDRESS {
            return Err(HalError::invalid_parameter(format!(
                "0x{:02X} is not the QMC5883L address",
                attachment.address
            )));
        }
        self.devices.bind(id, attachment.bus_id, |bus_id| {
            bus.attach(bus_id, attachment.parameters(RegisterWidth::Bits8))
        })
    }

    fn ext_hw_config(&mut self, bus: &mut I2cDriver<T, M>, id: u8) -> Result<()> {
        self.devices.configure(id, |bus_id, _| {
            let mut chip_id = [0u8; 1];
            bus.read(bus_id, CHIP_ID_REGISTER, &mut chip_id)?;
            if chip_id[0] != CHIP_ID {
                return Err(HalError::hardware_fault(format!(
                    "QMC5883L chip ID reads 0x{:02X}",
                    chip_id[0]
                )));
            }

            bus.send(bus_id, SET_RESET_PERIOD, &[0x01])?;
            bus.send(bus_id, CONTROL_1, &[CONTINUOUS_200HZ_8G])
        })
    }

    fn read(&mut self, bus: &mut I2cDriver<T, M>, id: u8, data: &mut ImuData) -> Result<()> {
        let (bus_id, _) = self.devices.ready(id)?;

        let mut raw = [0u8; 6];
        bus.read(bus_id, DATA_X_LSB, &mut raw)?;
        let field = [
            i16::from_le_bytes([raw[0], raw[1]]),
            i16::from_le_bytes([raw[2], raw[3]]),
            i16::from_le_bytes([raw[4], raw[5]]),
        ];
        trace!(id, ?field, "QMC5883L sample");

        data.magnetometer = Some(Axes::scaled(field, LSB_PER_GAUSS));
        Ok(())
    }

    fn read_specs(&self) -> ImuSpecs {
        SPECS
    }
}
