//! `Connect`/`Connected`: a diagnostic task that opens the port and then
//! periodically polls device status, useful for confirming a device is
//! alive without touching its firmware.

use log::info;

use super::{Engine, Event, State};
use crate::frame::send_flagged;

const APP_CMD_DEVICE_STATE: u8 = 0x07;

impl Engine {
    pub(super) fn on_connect<P: crate::platform::Platform>(&mut self, platform: &mut P, event: Event) {
        if !matches!(event, Event::Action | Event::Timeout) {
            return;
        }
        let opened = match self.device_path.clone() {
            Some(path) => platform.connect(&path),
            None => false,
        };
        if opened {
            platform.set_timeout(1000);
            self.enter(State::Connected);
        } else {
            platform.set_timeout(1000);
        }
    }

    pub(super) fn on_connected<P: crate::platform::Platform>(&mut self, platform: &mut P, event: Event) {
        match event {
            Event::Timeout => {
                info!("polling device status");
                platform.write(&send_flagged(&[APP_CMD_DEVICE_STATE]));
                platform.set_timeout(10_000);
            }
            Event::Disconnected => {
                self.enter(State::Init);
                platform.set_timeout(1000);
            }
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
            task: Task::Connect,
            device_path: Some("/dev/ttyACM0".into()),
            file: None,
            device_type: DeviceType::ConBee2,
            deadline_ms: 10_000,
            baud: 38_400,
        })
    }

    #[test]
    fn opens_port_and_polls_on_timeout() {
        let mut engine = engine();
        let mut platform = MockPlatform::new();

        engine.handle_event(&mut platform, Event::PlStarted);
        assert_eq!(engine.state(), State::Connected);

        engine.handle_event(&mut platform, Event::Timeout);
        assert_eq!(platform.take_writes().len(), 1);
        assert_eq!(platform.timeout_ms, Some(10_000));
    }

    #[test]
    fn failed_open_retries_on_timeout() {
        let mut engine = engine();
        let mut platform = MockPlatform::new();
        platform.connect_result = false;

        engine.handle_event(&mut platform, Event::PlStarted);
        assert_eq!(engine.state(), State::Connect);

        platform.connect_result = true;
        engine.handle_event(&mut platform, Event::Timeout);
        assert_eq!(engine.state(), State::Connected);
    }

    #[test]
    fn disconnect_returns_to_init_after_a_delay() {
        let mut engine = engine();
        let mut platform = MockPlatform::new();

        engine.handle_event(&mut platform, Event::PlStarted);
        engine.handle_event(&mut platform, Event::Disconnected);

        assert_eq!(engine.state(), State::Init);
        assert_eq!(platform.timeout_ms, Some(1000));
    }
}
