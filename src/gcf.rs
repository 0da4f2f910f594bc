//! GCF firmware image container: a 14-byte header followed by raw payload
//! bytes, plus a firmware version parsed out of the filename.

use regex::Regex;
use thiserror::Error;

use crate::byteorder::{read_u32_le, write_u32_le};
use crate::device::DeviceType;

const HEADER_LEN: usize = 14;
const GCF_MAGIC: u32 = 0xCAFEFEED;

/// Errors from parsing a GCF file, carrying the legacy numeric error codes
/// from the original tool alongside a human-readable message.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GcfError {
    #[error("file is too small to contain a GCF header ({0} bytes)")]
    TooSmall(usize),
    #[error("bad GCF magic or no `0x...` firmware version in filename")]
    BadMagicOrVersion,
    #[error("payload size field does not match the file size")]
    SizeMismatch,
}

impl GcfError {
    /// Legacy error code, preserved from the source tool's error reporting
    /// convention.
    pub fn code(&self) -> i32 {
        match self {
            GcfError::TooSmall(_) => -1,
            GcfError::BadMagicOrVersion => -2,
            GcfError::SizeMismatch => -3,
        }
    }
}

/// A parsed GCF firmware image.
#[derive(Debug, Clone)]
pub struct GcfFile {
    pub filename: String,
    pub filesize: usize,
    pub fw_version: u32,
    pub file_type: u8,
    pub target_address: u32,
    pub payload_size: u32,
    pub crc8: u8,
    pub payload: Vec<u8>,
}

impl GcfFile {
    /// Parses a GCF file's bytes, paired with the filename they were loaded
    /// from (the firmware version lives only in the filename).
    pub fn parse(filename: &str, bytes: &[u8]) -> Result<Self, GcfError> {
        if bytes.len() < HEADER_LEN {
            return Err(GcfError::TooSmall(bytes.len()));
        }

        let magic = read_u32_le(&bytes[0..4]);
        let fw_version = parse_fw_version(filename).ok_or(GcfError::BadMagicOrVersion)?;
        if magic != GCF_MAGIC {
            return Err(GcfError::BadMagicOrVersion);
        }

        let file_type = bytes[4];
        let target_address = read_u32_le(&bytes[5..9]);
        let payload_size = read_u32_le(&bytes[9..13]);
        let crc8 = bytes[13];
        let payload = bytes[HEADER_LEN..].to_vec();

        if payload_size as usize != bytes.len() - HEADER_LEN {
            return Err(GcfError::SizeMismatch);
        }

        Ok(GcfFile {
            filename: filename.to_string(),
            filesize: bytes.len(),
            fw_version,
            file_type,
            target_address,
            payload_size,
            crc8,
            payload,
        })
    }

    /// Serializes the header back to bytes (used only by tests to build
    /// synthetic fixtures).
    #[cfg(test)]
    fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.payload.len());
        write_u32_le(&mut out, GCF_MAGIC);
        out.push(self.file_type);
        write_u32_le(&mut out, self.target_address);
        write_u32_le(&mut out, self.payload_size);
        out.push(self.crc8);
        out.extend_from_slice(&self.payload);
        out
    }
}

fn parse_fw_version(filename: &str) -> Option<u32> {
    let re = Regex::new(r"0x([0-9a-fA-F]+)").expect("static regex is valid");
    let caps = re.captures(filename)?;
    u32::from_str_radix(&caps[1], 16).ok()
}

/// Applies the RaspBee-1 -> RaspBee-2 promotion rule: an R21-platform
/// firmware image (bits 15:8 of `fw_version` equal to `0x07`) flashed onto
/// a device the classifier thought was RaspBee-1 is actually a RaspBee-2.
pub fn promote_device_type(device_type: DeviceType, fw_version: u32) -> DeviceType {
    if device_type == DeviceType::RaspBee1 && (fw_version & 0x0000_FF00) == 0x0000_0700 {
        DeviceType::RaspBee2
    } else {
        device_type
    }
}
