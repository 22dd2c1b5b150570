//! MPU6050 accelerometer and gyroscope on I2C.
//!
//! Configured for +-2 g, +-250 deg/s and a 1 kHz sample rate. One read burst
//! covers accelerometer, temperature and gyroscope registers, all big-endian.

use tracing::trace;

use idhal_core::config::MPU6050_MAX_ID;
use idhal_core::{HalError, Result};
use idhal_drivers::i2c::RegisterWidth;
use idhal_drivers::{I2cDriver, I2cTransport};

use crate::table::{self, DeviceTable};
use crate::traits::{Axes, I2cAttachment, ImuData, ImuDevice, ImuSpecs};

/// Device addresses selectable with the AD0 pin.
pub const MPU6050_ADDRESSES: [u16; 2] = [0x68, 0x69];

const SMPLRT_DIV: u32 = 0x19;
const ACCEL_XOUT_H: u32 = 0x3B;
const PWR_MGMT_1: u32 = 0x6B;
const WHO_AM_I: u32 = 0x75;

const CHIP_ID: u8 = 0x68;
/// Burst from ACCEL_XOUT_H to GYRO_ZOUT_L.
const BURST_LEN: usize = 14;

/// SMPLRT_DIV, CONFIG, GYRO_CONFIG and ACCEL_CONFIG: 1 kHz, no DLPF, +-250 deg/s, +-2 g.
const MEASUREMENT_CONFIG: [u8; 4] = [0x07, 0x00, 0x00, 0x00];

const ACCEL_LSB_PER_G: f32 = 16384.0;
const GYRO_LSB_PER_DPS: f32 = 131.0;

const SPECS: ImuSpecs = ImuSpecs {
    accelerometer_axes: 3,
    gyroscope_axes: 3,
    magnetometer_axes: 0,
    temperature: true,
    sample_rate_hz: 1000,
};

fn word(bytes: &[u8], index: usize) -> i16 {
    i16::from_be_bytes([bytes[2 * index], bytes[2 * index + 1]])
}

/// MPU6050 driver with its own device table.
#[derive(Debug)]
pub struct Mpu6050<const N: usize = MPU6050_MAX_ID> {
    devices: DeviceTable<table::Imu, (), N>,
}

impl<const N: usize> Mpu6050<N> {
    pub fn new() -> Self {
        Self {
            devices: DeviceTable::new(),
        }
    }
}

impl<const N: usize> Default for Mpu6050<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: I2cTransport, const M: usize, const N: usize> ImuDevice<I2cDriver<T, M>> for Mpu6050<N> {
    fn int_hw_init(
        &mut self,
        bus: &mut I2cDriver<T, M>,
        id: u8,
        attachment: I2cAttachment,
    ) -> Result<()> {
        if !MPU6050_ADDRESSES.contains(&attachment.address) {
            return Err(HalError::invalid_parameter(format!(
                "0x{:02X} is not an MPU6050 address",
                attachment.address
            )));
        }
        self.devices.bind(id, attachment.bus_id, |bus_id| {
            bus.attach(bus_id, attachment.parameters(RegisterWidth::Bits8))
        })
    }

    fn ext_hw_config(&mut self, bus: &mut I2cDriver<T, M>, id: u8) -> Result<()> {
        self.devices.configure(id, |bus_id, _| {
            let mut who_am_i = [0u8; 1];
            bus.read(bus_id, WHO_AM_I, &mut who_am_i)?;
            if who_am_i[0] != CHIP_ID {
                return Err(HalError::hardware_fault(format!(
                    "MPU6050 WHO_AM_I reads 0x{:02X}",
                    who_am_i[0]
                )));
            }

            // Wake up on the internal oscillator.
            bus.send(bus_id, PWR_MGMT_1, &[0x00])?;
            bus.send(bus_id, SMPLRT_DIV, &MEASUREMENT_CONFIG)
        })
    }

    fn read(&mut self, bus: &mut I2cDriver<T, M>, id: u8, data: &mut ImuData) -> Result<()> {
        let (bus_id, _) = self.devices.ready(id)?;

        let mut burst = [0u8; BURST_LEN];
        bus.read(bus_id, ACCEL_XOUT_H, &mut burst)?;

        let accel = [word(&burst, 0), word(&burst, 1), word(&burst, 2)];
        let temperature = word(&burst, 3);
        let gyro = [word(&burst, 4), word(&burst, 5), word(&burst, 6)];
        trace!(id, ?accel, ?gyro, temperature, "MPU6050 sample");

        data.accelerometer = Some(Axes::scaled(accel, ACCEL_LSB_PER_G));
        data.gyroscope = Some(Axes::scaled(gyro, GYRO_LSB_PER_DPS));
        data.temperature = Some(f32::from(temperature) / 340.0 + 36.53);
        Ok(())
    }

    fn read_specs(&self) -> ImuSpecs {
        SPECS
    }
}
