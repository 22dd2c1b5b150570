//! Compile-time capacities of every ID table.
//!
//! Each registry is a fixed-size array sized by one of these constants. They
//! are the defaults of the const-generic capacity parameter of the drivers, so
//! a board that needs more (or fewer) IDs instantiates a driver with its own
//! capacity instead of editing this module.
//!
//! | Table | Default | Notes |
//! |-------|---------|-------|
//! | GPIO | 50 | one ID per configured pin |
//! | I2C | 3 | display, IMU and magnetometer on the reference board |
//! | SPI | 3 | |
//! | UART | 3 | |
//! | ADC | 3 | one ID per sampled channel |
//! | PIT | 20 | software timers |
//! | devices | 1 | one instance of each concrete device |
//!
//! # Examples
//!
//! ```
//! use idhal_core::config::*;
//!
//! assert!(GPIO_MAX_ID > I2C_MAX_ID);
//! assert_eq!(UART_ABORT_RECEPTION, 0);
//! ```

// ============================================================================
// Bus driver capacities
// ============================================================================

/// Number of GPIO IDs.
pub const GPIO_MAX_ID: usize = 50;

/// Number of I2C IDs (one per addressed device, several may share a port).
pub const I2C_MAX_ID: usize = 3;

/// Number of SPI IDs (one per chip select, several may share a port).
pub const SPI_MAX_ID: usize = 3;

/// Number of UART IDs.
pub const UART_MAX_ID: usize = 3;

/// Number of ADC IDs.
pub const ADC_MAX_ID: usize = 3;

/// Number of software timer IDs.
pub const PIT_MAX_ID: usize = 20;

// ============================================================================
// Device driver capacities
// ============================================================================

/// Number of SSD1306 displays.
pub const SSD1306_MAX_ID: usize = 1;

/// Number of HD44780 displays.
pub const HD44780_MAX_ID: usize = 1;

/// Number of MPU6050 sensors.
pub const MPU6050_MAX_ID: usize = 1;

/// Number of QMC5883L sensors.
pub const QMC5883L_MAX_ID: usize = 1;

/// Number of SD cards.
pub const SDCARD_MAX_ID: usize = 1;

// ============================================================================
// Protocol constants
// ============================================================================

/// `length` value that cancels a pending UART reception.
pub const UART_ABORT_RECEPTION: u32 = 0;

/// Bytes the UART driver reserves at the start of a receive buffer for the
/// received byte count (MSB first).
pub const UART_HEADER_LEN: usize = 2;

/// Duration of one software timer tick in milliseconds.
pub const PIT_TICK_MS: u64 = 1;
