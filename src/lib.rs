//! Firmware-update engine for Zigbee coprocessor modules (ConBee/RaspBee
//! USB dongles and serial-attached radios): drives a device from its
//! running firmware into a bootloader, negotiates the bootloader dialect,
//! uploads a firmware image, and verifies completion.

pub mod byteorder;
pub mod cli;
pub mod device;
pub mod engine;
pub mod error;
pub mod frame;
pub mod gcf;
pub mod logging;
pub mod platform;

pub use error::Error;
