//! `BootloaderConnect` (reopen the port once the device has rebooted into
//! its bootloader) and `BootloaderQuery` (figure out which bootloader
//! dialect it speaks).

use log::debug;
use regex::Regex;

use super::{Engine, Event, State};
use crate::byteorder::read_u32_le;

/// V1 bootloaders auto-announce with a banner line ending in "Bootloader"
/// followed by a version string.
const BANNER_PATTERN: &str = r"Bootloader\s+[\d.]+";
/// Minimum banner length before it is considered complete, matching the
/// "long enough to plausibly contain the full banner" rx buffer check.
const BANNER_MIN_LEN: usize = 52;

/// V3 bootloader ID response command byte.
const BTL_ID_RESPONSE: u8 = 0x82;

const QUERY_RETRY_LIMIT: u8 = 3;

impl Engine {
    pub(super) fn on_bootloader_connect<P: crate::platform::Platform>(
        &mut self,
        platform: &mut P,
        event: Event,
    ) {
        if event != Event::Timeout {
            return;
        }
        let opened = match self.device_path.clone() {
            Some(path) => platform.connect(&path),
            None => false,
        };
        if opened {
            self.enter(State::BootloaderQuery);
            self.handle_event(platform, Event::Action);
        } else {
            debug!("bootloader port not ready yet, retrying in 500ms");
            platform.set_timeout(500);
        }
    }

    pub(super) fn on_bootloader_query<P: crate::platform::Platform>(
        &mut self,
        platform: &mut P,
        event: Event,
    ) {
        match event {
            Event::Action => {
                self.query_retry = 0;
                self.rx.clear();
                platform.set_timeout(200);
            }
            Event::Timeout => {
                if self.query_retry < QUERY_RETRY_LIMIT {
                    platform.write(b"ID");
                    platform.set_timeout(200);
                    self.query_retry += 1;
                } else {
                    self.retry(platform);
                }
            }
            Event::RxAscii => {
                let ascii = self.rx.ascii().into_owned();
                let pattern = Regex::new(BANNER_PATTERN).expect("static regex is valid");
                if self.rx.wp > BANNER_MIN_LEN && ascii.ends_with('\n') && pattern.is_match(&ascii) {
                    platform.clear_timeout();
                    self.enter(State::V1Sync);
                    self.handle_event(platform, Event::Action);
                }
            }
            Event::RxBtlPkgData => {
                let payload = self.rx.bytes();
                if payload.len() >= 10 && payload[1] == BTL_ID_RESPONSE {
                    self.btl_version = read_u32_le(&payload[2..6]);
                    self.app_crc = read_u32_le(&payload[6..10]);
                    self.enter(State::V3Sync);
                    self.handle_event(platform, Event::Action);
                }
            }
            Event::Disconnected => self.retry(platform),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceType;
    use crate::engine::{EngineConfig, Task};
    use crate::platform::mock::MockPlatform;

    fn engine() -> Engine {
        Engine::new(EngineConfig {
            task: Task::Program,
            device_path: Some("/dev/ttyACM0".into()),
            file: None,
            device_type: DeviceType::ConBee2,
            deadline_ms: 10_000,
            baud: 38_400,
        })
    }

    #[test]
    fn probes_v1_up_to_three_times_then_retries() {
        let mut engine = engine();
        let mut platform = MockPlatform::new();
        engine.enter(State::BootloaderQuery);
        engine.handle_event(&mut platform, Event::Action);

        for _ in 0..3 {
            engine.handle_event(&mut platform, Event::Timeout);
        }
        assert_eq!(platform.take_writes().len(), 3);

        // The 4th timeout with retry already at 3 invokes the retry controller.
        engine.handle_event(&mut platform, Event::Timeout);
        assert_eq!(engine.state(), State::Init);
    }

    #[test]
    fn v3_id_response_transitions_to_v3_sync() {
        let mut engine = engine();
        let mut platform = MockPlatform::new();
        engine.enter(State::BootloaderQuery);
        engine.handle_event(&mut platform, Event::Action);

        let mut payload = vec![0x81, BTL_ID_RESPONSE];
        payload.extend_from_slice(&0x0001_0001u32.to_le_bytes());
        payload.extend_from_slice(&0x1234_5678u32.to_le_bytes());
        engine.rx.load_frame(&payload);
        engine.handle_event(&mut platform, Event::RxBtlPkgData);

        assert_eq!(engine.state(), State::V3Sync);
    }

    #[test]
    fn v1_banner_transitions_to_v1_sync() {
        let mut engine = engine();
        let mut platform = MockPlatform::new();
        engine.enter(State::BootloaderQuery);
        engine.handle_event(&mut platform, Event::Action);

        let banner = format!("{}ConBee-1 Bootloader 1.2.3\n", "-".repeat(40));
        for &b in banner.as_bytes() {
            engine.rx.push(b);
        }
        engine.handle_event(&mut platform, Event::RxAscii);

        assert_eq!(engine.state(), State::V1Sync);
    }
}
