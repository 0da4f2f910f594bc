//! `Reset` state and its three substates: `ResetUart`, `ResetFtdi`,
//! `ResetRaspBee`. Tries progressively more invasive recovery strategies,
//! device-type permitting, and always eventually reports success upward —
//! a `TIMEOUT`-driven watchdog reset is allowed to silently fail over to a
//! "pretend it worked" path rather than abort the whole run.

use log::{debug, info, warn};

use super::{Engine, Event, ResetSubstate, State, Task};
use crate::device::DeviceType;
use crate::frame::{self, send_flagged};
use crate::platform::Platform;

/// Parameter id for the watchdog timeout, matching the id the application
/// protocol's write-parameter response echoes back.
const PARAM_WATCHDOG_TIMEOUT: u8 = frame::PARAM_WATCHDOG_TIMEOUT;
const APP_CMD_WRITE_PARAM: u8 = frame::APP_WRITE_PARAM_RESPONSE;
const APP_CMD_READ_FW_VERSION: u8 = 0x0D;

/// Watchdog timeout value written to provoke a reboot: 2 seconds.
const WATCHDOG_TIMEOUT_SECONDS: u16 = 2;

impl Engine {
    pub(super) fn on_reset<P: Platform>(&mut self, platform: &mut P, event: Event) {
        match self.substate {
            ResetSubstate::ResetUart => self.on_reset_uart(platform, event),
            ResetSubstate::ResetFtdi => self.on_reset_ftdi(platform, event),
            ResetSubstate::ResetRaspBee => self.on_reset_raspbee(platform, event),
            ResetSubstate::Void => {}
        }
    }

    fn on_reset_uart<P: Platform>(&mut self, platform: &mut P, event: Event) {
        match event {
            Event::Action => {
                platform.set_timeout(3000);
                if let Some(path) = self.device_path.clone() {
                    platform.connect(&path);
                }
                let query = vec![APP_CMD_READ_FW_VERSION];
                platform.write(&send_flagged(&query));

                let mut write_param = Vec::with_capacity(9);
                write_param.push(APP_CMD_WRITE_PARAM);
                write_param.extend_from_slice(&[0; 6]);
                write_param.push(PARAM_WATCHDOG_TIMEOUT);
                write_param.extend_from_slice(&WATCHDOG_TIMEOUT_SECONDS.to_le_bytes());
                platform.write(&send_flagged(&write_param));
            }
            Event::PkgUartReset => {
                debug!("watchdog write acknowledged, waiting for reboot");
            }
            Event::Disconnected => {
                info!("device disconnected after watchdog write, reset succeeded");
                platform.set_timeout(500);
                self.handle_event(platform, Event::UartResetSuccess);
            }
            Event::Timeout => {
                platform.disconnect();
                self.handle_event(platform, Event::UartResetFailed);
            }
            Event::UartResetFailed => self.on_uart_reset_failed(platform),
            _ => self.on_reset_terminal(platform, event),
        }
    }

    fn on_uart_reset_failed<P: Platform>(&mut self, platform: &mut P) {
        match self.device_type {
            DeviceType::ConBee1 => {
                self.substate = ResetSubstate::ResetFtdi;
                self.handle_event(platform, Event::Action);
            }
            DeviceType::RaspBee1 | DeviceType::RaspBee2 => {
                self.substate = ResetSubstate::ResetRaspBee;
                self.handle_event(platform, Event::Action);
            }
            DeviceType::ConBee2 | DeviceType::Unknown => {
                warn!("UART reset failed with no fallback strategy, proceeding anyway");
                platform.set_timeout(500);
                self.handle_event(platform, Event::UartResetSuccess);
            }
        }
    }

    fn on_reset_ftdi<P: Platform>(&mut self, platform: &mut P, event: Event) {
        match event {
            Event::Action => {
                if platform.reset_ftdi() {
                    platform.set_timeout(1);
                    self.handle_event(platform, Event::FtdiResetSuccess);
                } else {
                    warn!("FTDI bitbang reset failed, proceeding anyway");
                    platform.set_timeout(1);
                    self.handle_event(platform, Event::FtdiResetSuccess);
                }
            }
            _ => self.on_reset_terminal(platform, event),
        }
    }

    fn on_reset_raspbee<P: Platform>(&mut self, platform: &mut P, event: Event) {
        match event {
            Event::Action => {
                if platform.reset_raspbee() {
                    platform.set_timeout(1);
                    self.handle_event(platform, Event::RaspbeeResetSuccess);
                } else {
                    warn!("RaspBee GPIO reset failed, proceeding anyway");
                    platform.set_timeout(1);
                    self.handle_event(platform, Event::RaspbeeResetSuccess);
                }
            }
            _ => self.on_reset_terminal(platform, event),
        }
    }

    /// Common handling for the three "reset succeeded" events, regardless
    /// of which substate produced them: reset-only runs shut down, program
    /// runs hand off to `Program` with a synthetic `RESET_SUCCESS`.
    fn on_reset_terminal<P: Platform>(&mut self, platform: &mut P, event: Event) {
        if !matches!(
            event,
            Event::UartResetSuccess | Event::FtdiResetSuccess | Event::RaspbeeResetSuccess
        ) {
            return;
        }
        match self.task {
            Task::Reset => {
                info!("reset complete");
                platform.shut_down();
            }
            Task::Program => {
                self.state = State::Program;
                self.substate = ResetSubstate::Void;
                self.handle_event(platform, Event::ResetSuccess);
            }
            _ => {}
        }
    }
}
