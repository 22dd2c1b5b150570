//! Block storage class drivers.

pub mod sdcard;

pub use sdcard::SdCard;
