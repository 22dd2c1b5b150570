//! Build-time choice of the chip behind each device class.
//!
//! Application code names [`BoardDisplay`], [`BoardImu`] and [`BoardStorage`]
//! and calls them through the class traits only. Cargo features pick the
//! chip:
//!
//! | Class | Default | Alternative |
//! |-------|---------|-------------|
//! | display | `display-ssd1306` | `display-hd44780` |
//! | IMU | `imu-mpu6050` | `imu-qmc5883l` |
//!
//! Enabling an alternative overrides the default, so it also works without
//! `default-features = false`. Turning the defaults off without selecting
//! an alternative is a build error.

#[cfg(not(any(feature = "display-ssd1306", feature = "display-hd44780")))]
compile_error!("select a display chip: enable `display-ssd1306` or `display-hd44780`");

#[cfg(not(any(feature = "imu-mpu6050", feature = "imu-qmc5883l")))]
compile_error!("select an IMU chip: enable `imu-mpu6050` or `imu-qmc5883l`");

#[cfg(feature = "display-hd44780")]
pub type BoardDisplay = crate::display::Hd44780;

#[cfg(all(feature = "display-ssd1306", not(feature = "display-hd44780")))]
pub type BoardDisplay = crate::display::Ssd1306;

#[cfg(feature = "imu-qmc5883l")]
pub type BoardImu = crate::imu::Qmc5883l;

#[cfg(all(feature = "imu-mpu6050", not(feature = "imu-qmc5883l")))]
pub type BoardImu = crate::imu::Mpu6050;

pub type BoardStorage = crate::storage::SdCard;
