//! An in-memory [`Platform`] double for driving the engine's state machine
//! from tests without real hardware. Serial I/O, GPIO and timer scheduling
//! are all external collaborators behind the [`Platform`] trait; this is the
//! test-only stand-in for all three.

use super::Platform;
use crate::device::Device;

/// Records every side effect the engine asks for, and lets a test script
/// the outcome of hardware-dependent calls (`connect`, `reset_ftdi`,
/// `reset_raspbee`) by presetting `connect_result`/`ftdi_result`/
/// `raspbee_result` before driving the engine.
#[derive(Debug, Default)]
pub struct MockPlatform {
    pub writes: Vec<Vec<u8>>,
    pub connected: bool,
    pub shut_down: bool,
    pub time_ms: u64,
    pub timeout_ms: Option<u64>,
    pub devices: Vec<Device>,
    pub connect_result: bool,
    pub ftdi_result: bool,
    pub raspbee_result: bool,
    pub connect_calls: Vec<String>,
    pub disconnect_calls: usize,
    pub progress_total: Option<u32>,
    pub progress_current: Option<u32>,
    pub progress_finished: bool,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self {
            connect_result: true,
            ..Default::default()
        }
    }

    /// Advances the mock clock, as a real deadline-bound run would.
    pub fn advance(&mut self, ms: u64) {
        self.time_ms += ms;
    }

    /// Returns and clears everything written so far, in order.
    pub fn take_writes(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.writes)
    }
}

impl Platform for MockPlatform {
    fn connect(&mut self, device_path: &str) -> bool {
        self.connect_calls.push(device_path.to_string());
        if self.connect_result {
            self.connected = true;
        }
        self.connect_result
    }

    fn disconnect(&mut self) {
        self.disconnect_calls += 1;
        self.connected = false;
    }

    fn write(&mut self, bytes: &[u8]) {
        self.writes.push(bytes.to_vec());
    }

    fn set_timeout(&mut self, ms: u64) {
        self.timeout_ms = Some(ms);
    }

    fn clear_timeout(&mut self) {
        self.timeout_ms = None;
    }

    fn sleep(&mut self, ms: u64) {
        self.advance(ms);
    }

    fn time(&self) -> u64 {
        self.time_ms
    }

    fn get_devices(&mut self) -> Vec<Device> {
        self.devices.clone()
    }

    fn reset_ftdi(&mut self) -> bool {
        self.ftdi_result
    }

    fn reset_raspbee(&mut self) -> bool {
        self.raspbee_result
    }

    fn progress_init(&mut self, total_bytes: u32) {
        self.progress_total = Some(total_bytes);
        self.progress_current = Some(0);
        self.progress_finished = false;
    }

    fn progress_update(&mut self, current_bytes: u32) {
        self.progress_current = Some(current_bytes);
    }

    fn progress_finish(&mut self) {
        self.progress_finished = true;
    }

    fn shut_down(&mut self) {
        self.shut_down = true;
    }
}
