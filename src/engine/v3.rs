//! The V3 bootloader dialect: framed binary request/response. Used by
//! ConBee-2 and RaspBee-2.

use log::warn;

use super::{Engine, Event, State};
use crate::byteorder::{read_u16_le, read_u32_le, write_u16_le, write_u32_le};
use crate::frame::send_flagged;

const BOOTLOADER_MAGIC: u8 = 0x81;
const CMD_FW_UPDATE_REQUEST: u8 = 0x03;
const CMD_FW_UPDATE_RESPONSE: u8 = 0x83;
const CMD_FW_DATA_REQUEST: u8 = 0x04;
const CMD_FW_DATA_RESPONSE: u8 = 0x84;

/// Placeholder CRC32 the bootloader ignores. Preserved as-is rather than
/// computed: a real checksum here would be a protocol change, not a bug fix.
const CRC32_PLACEHOLDER: u32 = 0xAAAA_AAAA;

/// Status codes for `FW_DATA_RESPONSE`.
const STATUS_OK: u8 = 0;
const STATUS_OUT_OF_RANGE: u8 = 1;
const STATUS_TOO_LARGE: u8 = 2;
const STATUS_ZERO_LENGTH: u8 = 3;

/// Header room reserved in the 512-byte rx buffer for the response
/// envelope (`{0x81, 0x84, status, offset(4), length(2)}` = 9 bytes,
/// rounded up generously so a short length never collides with it).
const RESPONSE_HEADER_ROOM: u32 = 32;
const BUFFER_CAPACITY: u32 = 512;

impl Engine {
    pub(super) fn on_v3_sync<P: crate::platform::Platform>(&mut self, platform: &mut P, event: Event) {
        match event {
            Event::Action => {
                let Some(file) = self.file.clone() else {
                    warn!("no firmware file loaded, aborting V3 sync");
                    platform.shut_down();
                    return;
                };
                platform.sleep(50);
                platform.set_timeout(1000);

                let mut payload = Vec::with_capacity(15);
                payload.push(BOOTLOADER_MAGIC);
                payload.push(CMD_FW_UPDATE_REQUEST);
                write_u32_le(&mut payload, file.payload_size);
                write_u32_le(&mut payload, file.target_address);
                payload.push(file.file_type);
                write_u32_le(&mut payload, CRC32_PLACEHOLDER);
                platform.write(&send_flagged(&payload));
            }
            Event::RxBtlPkgData => {
                let payload = self.rx.bytes();
                if payload.len() >= 3
                    && payload[1] == CMD_FW_UPDATE_RESPONSE
                    && payload[2] == STATUS_OK
                {
                    if let Some(file) = &self.file {
                        platform.progress_init(file.payload_size);
                    }
                    self.enter(State::V3Upload);
                    platform.set_timeout(1000);
                }
            }
            Event::Timeout => self.retry(platform),
            _ => {}
        }
    }

    pub(super) fn on_v3_upload<P: crate::platform::Platform>(&mut self, platform: &mut P, event: Event) {
        match event {
            Event::RxBtlPkgData => self.handle_fw_data_request(platform),
            Event::Timeout => self.retry(platform),
            _ => {}
        }
    }

    fn handle_fw_data_request<P: crate::platform::Platform>(&mut self, platform: &mut P) {
        let payload = self.rx.bytes();
        if payload.len() != 8 || payload[1] != CMD_FW_DATA_REQUEST {
            return;
        }

        let Some(file) = self.file.clone() else {
            warn!("no firmware file loaded, aborting V3 upload");
            platform.shut_down();
            return;
        };

        let offset = read_u32_le(&payload[2..6]);
        let requested_length = read_u16_le(&payload[6..8]) as u32;
        platform.set_timeout(5000);

        // Capacity is checked before range: an oversize request must never
        // even get as far as touching the payload bounds.
        let status = if requested_length > BUFFER_CAPACITY - RESPONSE_HEADER_ROOM {
            STATUS_TOO_LARGE
        } else if offset.checked_add(requested_length).unwrap_or(u32::MAX) > file.payload_size {
            STATUS_OUT_OF_RANGE
        } else if requested_length == 0 {
            STATUS_ZERO_LENGTH
        } else {
            STATUS_OK
        };

        let length = if status == STATUS_OK {
            requested_length.min(file.payload_size - offset)
        } else {
            0
        };

        let mut response = Vec::with_capacity(9 + length as usize);
        response.push(BOOTLOADER_MAGIC);
        response.push(CMD_FW_DATA_RESPONSE);
        response.push(status);
        write_u32_le(&mut response, offset);
        write_u16_le(&mut response, length as u16);
        if status == STATUS_OK {
            let start = offset as usize;
            let stop = start + length as usize;
            response.extend_from_slice(&file.payload[start..stop]);
            platform.progress_update(offset + length);
            if offset + length == file.payload_size {
                platform.progress_finish();
            }
        }
        platform.write(&send_flagged(&response));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::byteorder::write_u16_le as write_u16;
    use crate::device::DeviceType;
    use crate::engine::{EngineConfig, Task};
    use crate::frame::FrameDecoder;
    use crate::gcf::GcfFile;
    use crate::platform::mock::MockPlatform;

    fn file(payload_size: u32) -> GcfFile {
        GcfFile {
            filename: "fw_0x26720700.gcf".into(),
            filesize: 14 + payload_size as usize,
            fw_version: 0x2672_0700,
            file_type: 7,
            target_address: 0,
            payload_size,
            crc8: 0xAB,
            payload: (0..payload_size).map(|i| (i % 256) as u8).collect(),
        }
    }

    fn engine(payload_size: u32) -> Engine {
        Engine::new(EngineConfig {
            task: Task::Program,
            device_path: Some("/dev/ttyACM0".into()),
            file: Some(file(payload_size)),
            device_type: DeviceType::ConBee2,
            deadline_ms: 10_000,
            baud: 38_400,
        })
    }

    fn decode_one(framed: &[u8]) -> Vec<u8> {
        let mut dec = FrameDecoder::new();
        let mut out = None;
        dec.receive_flagged(framed, |p| out = Some(p.to_vec()));
        out.expect("one well-formed frame")
    }

    fn fw_data_request(offset: u32, length: u16) -> Vec<u8> {
        let mut payload = vec![BOOTLOADER_MAGIC, CMD_FW_DATA_REQUEST];
        write_u32_le(&mut payload, offset);
        write_u16(&mut payload, length);
        payload
    }

    #[test]
    fn sync_sends_fw_update_request_and_enters_upload_on_success() {
        let mut engine = engine(38_912);
        let mut platform = MockPlatform::new();
        engine.enter(State::V3Sync);
        engine.handle_event(&mut platform, Event::Action);

        let framed = platform.take_writes().remove(0);
        let payload = decode_one(&framed);
        assert_eq!(payload[0], BOOTLOADER_MAGIC);
        assert_eq!(payload[1], CMD_FW_UPDATE_REQUEST);

        engine.rx.load_frame(&[BOOTLOADER_MAGIC, CMD_FW_UPDATE_RESPONSE, STATUS_OK]);
        engine.handle_event(&mut platform, Event::RxBtlPkgData);
        assert_eq!(engine.state(), State::V3Upload);
        assert_eq!(platform.progress_total, Some(38_912));
    }

    #[test]
    fn serves_data_request_within_range() {
        let mut engine = engine(38_912);
        let mut platform = MockPlatform::new();
        engine.enter(State::V3Upload);

        engine.rx.load_frame(&fw_data_request(0, 1024));
        engine.handle_event(&mut platform, Event::RxBtlPkgData);

        let framed = platform.take_writes().remove(0);
        let response = decode_one(&framed);
        assert_eq!(response[2], STATUS_OK);
        assert_eq!(read_u32_le(&response[3..7]), 0);
        assert_eq!(read_u16_le(&response[7..9]), 1024);
        assert_eq!(response.len(), 9 + 1024);
        assert_eq!(platform.progress_current, Some(1024));
    }

    #[test]
    fn oversize_request_yields_status_2_with_no_payload() {
        let mut engine = engine(38_912);
        let mut platform = MockPlatform::new();
        engine.enter(State::V3Upload);

        engine.rx.load_frame(&fw_data_request(0, 65535));
        engine.handle_event(&mut platform, Event::RxBtlPkgData);

        let framed = platform.take_writes().remove(0);
        let response = decode_one(&framed);
        assert_eq!(response[2], STATUS_TOO_LARGE);
        assert_eq!(response.len(), 9);
    }

    #[test]
    fn out_of_range_offset_yields_status_1() {
        let mut engine = engine(100);
        let mut platform = MockPlatform::new();
        engine.enter(State::V3Upload);

        engine.rx.load_frame(&fw_data_request(90, 64));
        engine.handle_event(&mut platform, Event::RxBtlPkgData);

        let framed = platform.take_writes().remove(0);
        let response = decode_one(&framed);
        assert_eq!(response[2], STATUS_OUT_OF_RANGE);
    }

    #[test]
    fn zero_length_request_yields_status_3() {
        let mut engine = engine(100);
        let mut platform = MockPlatform::new();
        engine.enter(State::V3Upload);

        engine.rx.load_frame(&fw_data_request(0, 0));
        engine.handle_event(&mut platform, Event::RxBtlPkgData);

        let framed = platform.take_writes().remove(0);
        let response = decode_one(&framed);
        assert_eq!(response[2], STATUS_ZERO_LENGTH);
    }
}
