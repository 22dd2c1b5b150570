//! Inertial sensor class drivers.

pub mod mpu6050;
pub mod qmc5883l;

pub use mpu6050::Mpu6050;
pub use qmc5883l::Qmc5883l;
