//! Device-type classification and the device record produced by enumeration.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// The reset strategy a device needs is selected by its type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
pub enum DeviceType {
    RaspBee1,
    RaspBee2,
    ConBee1,
    ConBee2,
    Unknown,
}

/// Classifies a device path into a [`DeviceType`] by ordered substring
/// match; the first pattern that matches wins.
pub fn classify(device_path: &str) -> DeviceType {
    const CONBEE2: &[&str] = &["ttyACM", "ConBee_II", "cu.usbmodemDE"];
    const CONBEE1: &[&str] = &["ttyUSB", "usb-FTDI", "cu.usbserial"];
    const RASPBEE1: &[&str] = &["ttyAMA", "ttyS", "/serial"];

    if CONBEE2.iter().any(|pat| device_path.contains(pat)) {
        DeviceType::ConBee2
    } else if CONBEE1.iter().any(|pat| device_path.contains(pat)) {
        DeviceType::ConBee1
    } else if RASPBEE1.iter().any(|pat| device_path.contains(pat)) {
        DeviceType::RaspBee1
    } else {
        DeviceType::Unknown
    }
}

/// A device as reported by the enumerator, consumed read-only by the engine.
#[derive(Debug, Clone)]
pub struct Device {
    pub name: String,
    pub serial: String,
    pub path: String,
    pub stable_path: String,
    pub device_type: DeviceType,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_conbee2() {
        assert_eq!(classify("/dev/ttyACM0"), DeviceType::ConBee2);
        assert_eq!(classify("/dev/serial/by-id/ConBee_II"), DeviceType::ConBee2);
    }

    #[test]
    fn classifies_conbee1() {
        assert_eq!(classify("/dev/ttyUSB0"), DeviceType::ConBee1);
        assert_eq!(classify("/dev/serial/by-id/usb-FTDI_FT230X"), DeviceType::ConBee1);
    }

    #[test]
    fn classifies_raspbee1() {
        assert_eq!(classify("/dev/ttyAMA0"), DeviceType::RaspBee1);
        assert_eq!(classify("/dev/ttyS0"), DeviceType::RaspBee1);
        assert_eq!(classify("/dev/serial/by-path/whatever"), DeviceType::RaspBee1);
    }

    #[test]
    fn classifies_unknown() {
        assert_eq!(classify("/dev/null"), DeviceType::Unknown);
    }

    #[test]
    fn conbee2_pattern_wins_over_conbee1_pattern() {
        // A path containing both "ttyACM" and "usb-FTDI" should classify
        // as ConBee-2 because that ordered match runs first.
        assert_eq!(classify("/dev/ttyACM-usb-FTDI"), DeviceType::ConBee2);
    }
}
