//! The V1 bootloader dialect: ASCII framed, page-pull. Used by ConBee-1 and
//! RaspBee-1/2 when the image targets the older bootloader.

use log::{info, warn};

use super::{Engine, Event, State};
use crate::byteorder::write_u32_le;

/// Magic sent to enter the V1 bootloader's upload mode.
const V1_MAGIC: [u8; 4] = [0x1A, 0x1C, 0xA9, 0xAE];
const PAGE_SIZE: u32 = 256;

impl Engine {
    pub(super) fn on_v1_sync<P: crate::platform::Platform>(&mut self, platform: &mut P, event: Event) {
        match event {
            Event::Action => {
                self.rx.clear();
                platform.write(&V1_MAGIC);
                platform.set_timeout(500);
            }
            Event::RxAscii => {
                let ascii = self.rx.ascii().into_owned();
                if self.rx.wp > 4 && ascii.contains("READY") {
                    platform.clear_timeout();
                    self.enter(State::V1Header);
                    self.handle_event(platform, Event::Action);
                } else {
                    platform.set_timeout(10);
                }
            }
            Event::Timeout => self.retry(platform),
            _ => {}
        }
    }

    pub(super) fn on_v1_header<P: crate::platform::Platform>(&mut self, platform: &mut P, event: Event) {
        if event != Event::Action {
            return;
        }
        let Some(file) = self.file.clone() else {
            warn!("no firmware file loaded, aborting V1 header");
            platform.shut_down();
            return;
        };
        self.rx.clear();
        let mut header = Vec::with_capacity(10);
        write_u32_le(&mut header, file.payload_size);
        write_u32_le(&mut header, file.target_address);
        header.push(file.file_type);
        header.push(file.crc8);
        platform.write(&header);
        platform.progress_init(file.payload_size);
        self.enter(State::V1Upload);
        platform.set_timeout(1000);
    }

    pub(super) fn on_v1_upload<P: crate::platform::Platform>(&mut self, platform: &mut P, event: Event) {
        match event {
            Event::RxAscii => self.handle_v1_page_request(platform),
            Event::Timeout => self.retry(platform),
            _ => {}
        }
    }

    fn handle_v1_page_request<P: crate::platform::Platform>(&mut self, platform: &mut P) {
        let buf = self.rx.bytes();
        if buf.len() < 6 || buf[0] != b'G' || buf[5] != b';' {
            return; // wait for more bytes
        }

        let Some(file) = self.file.clone() else {
            warn!("no firmware file loaded, aborting V1 upload");
            platform.shut_down();
            return;
        };

        let page_number = ((buf[4] as u32) << 8) | (buf[3] as u32);
        let page = page_number * PAGE_SIZE;
        let end = file.payload_size;

        if page >= end {
            warn!("bootloader requested page past end of image, retrying");
            self.retry(platform);
            return;
        }

        let remaining = end - page;
        let size = remaining.min(PAGE_SIZE);

        self.rx.clear();
        let start = page as usize;
        let stop = start + size as usize;
        platform.write(&file.payload[start..stop]);
        platform.progress_update(page + size);

        if remaining - size == 0 {
            platform.progress_finish();
            self.enter(State::V1Validate);
            platform.set_timeout(25_600);
        } else {
            platform.set_timeout(2000);
        }
    }

    pub(super) fn on_v1_validate<P: crate::platform::Platform>(&mut self, platform: &mut P, event: Event) {
        match event {
            Event::RxAscii => {
                let ascii = self.rx.ascii().into_owned();
                if self.rx.wp > 6 && ascii.contains("#VALID CRC") {
                    info!("V1 upload validated, shutting down");
                    platform.shut_down();
                } else {
                    platform.set_timeout(1000);
                }
            }
            Event::Timeout => self.retry(platform),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceType;
    use crate::engine::{EngineConfig, Task};
    use crate::gcf::GcfFile;
    use crate::platform::mock::MockPlatform;

    fn file(payload_size: u32) -> GcfFile {
        GcfFile {
            filename: "fw_0x26390500.gcf".into(),
            filesize: 14 + payload_size as usize,
            fw_version: 0x2639_0500,
            file_type: 5,
            target_address: 0,
            payload_size,
            crc8: 0xAB,
            payload: (0..payload_size).map(|i| i as u8).collect(),
        }
    }

    fn engine(payload_size: u32) -> Engine {
        Engine::new(EngineConfig {
            task: Task::Program,
            device_path: Some("/dev/ttyUSB0".into()),
            file: Some(file(payload_size)),
            device_type: DeviceType::ConBee1,
            deadline_ms: 10_000,
            baud: 38_400,
        })
    }

    fn feed_ascii(engine: &mut Engine, platform: &mut MockPlatform, text: &str) {
        for &b in text.as_bytes() {
            engine.rx.push(b);
        }
        engine.handle_event(platform, Event::RxAscii);
    }

    #[test]
    fn sends_magic_and_waits_for_ready() {
        let mut engine = engine(512);
        let mut platform = MockPlatform::new();
        engine.enter(State::V1Sync);
        engine.handle_event(&mut platform, Event::Action);
        assert_eq!(platform.take_writes(), vec![V1_MAGIC.to_vec()]);

        feed_ascii(&mut engine, &mut platform, "READY");
        // V1Header's own Action handler runs synchronously on entry and
        // immediately hands off to V1Upload after writing the header.
        assert_eq!(engine.state(), State::V1Upload);
    }

    #[test]
    fn header_is_written_and_upload_entered() {
        let mut engine = engine(512);
        let mut platform = MockPlatform::new();
        engine.enter(State::V1Header);
        engine.handle_event(&mut platform, Event::Action);

        let writes = platform.take_writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].len(), 10);
        assert_eq!(engine.state(), State::V1Upload);
    }

    #[test]
    fn page_response_length_matches_remaining_bytes() {
        // 600 bytes: page 0 and 1 are full 256-byte pages, page 2 is 88 bytes.
        let mut engine = engine(600);
        let mut platform = MockPlatform::new();
        engine.enter(State::V1Upload);

        feed_ascii(&mut engine, &mut platform, "GET\x00\x00;");
        assert_eq!(platform.take_writes()[0].len(), 256);
        assert_eq!(engine.state(), State::V1Upload);

        feed_ascii(&mut engine, &mut platform, "GET\x01\x00;");
        assert_eq!(platform.take_writes()[0].len(), 256);

        feed_ascii(&mut engine, &mut platform, "GET\x02\x00;");
        assert_eq!(platform.take_writes()[0].len(), 88);
        assert_eq!(engine.state(), State::V1Validate);
        assert_eq!(platform.progress_current, Some(600));
        assert!(platform.progress_finished);
    }

    #[test]
    fn validate_success_shuts_down() {
        let mut engine = engine(512);
        let mut platform = MockPlatform::new();
        engine.enter(State::V1Validate);

        feed_ascii(&mut engine, &mut platform, "#VALID CRC\n");
        assert!(platform.shut_down);
    }
}
