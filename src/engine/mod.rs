//! The engine: a single-threaded, cooperative state machine that drives a
//! device from running firmware into a bootloader, negotiates the V1 or V3
//! bootloader dialect, uploads a firmware image, and verifies completion.
//!
//! The engine never touches a serial port, a GPIO pin, or a clock directly;
//! every side effect goes through the [`Platform`] trait, and every input is
//! an [`Event`] delivered by whoever is driving it ([`crate::platform::serial::SerialPlatform`]
//! for real hardware, [`crate::platform::mock::MockPlatform`] for tests).
//!
//! `state`/`substate` are tagged enums rather than function pointers: the
//! dispatcher in [`Engine::handle_event`] switches on them explicitly, so
//! the receive dispatcher can test state membership without indirecting
//! through a vtable.

mod bootloader;
mod connect;
mod reset;
mod v1;
mod v3;

use comfy_table::{modifiers, presets::UTF8_FULL, Attribute, Cell, Color, Table};
use log::{info, warn};

use crate::device::{Device, DeviceType};
use crate::frame::{self, ClassifiedPacket, FrameDecoder};
use crate::gcf::GcfFile;
use crate::platform::Platform;

/// Renders enumerated devices as a table on stdout, one row per device.
fn print_device_table(devices: &[Device]) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(modifiers::UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Name").fg(Color::Green).add_attribute(Attribute::Bold),
            Cell::new("Path").fg(Color::Green).add_attribute(Attribute::Bold),
            Cell::new("Serial").fg(Color::Green).add_attribute(Attribute::Bold),
            Cell::new("Type").fg(Color::Green).add_attribute(Attribute::Bold),
        ]);
    for device in devices {
        table.add_row(vec![
            Cell::new(&device.name),
            Cell::new(&device.path),
            Cell::new(&device.serial),
            Cell::new(device.device_type.to_string()).fg(Color::Cyan),
        ]);
    }
    println!("{table}");
}

/// One active timer, one active retry counter per run: the engine is a
/// process-wide singleton, constructed once from validated CLI input and
/// driven until it shuts the process down.
pub struct Engine {
    task: Task,
    state: State,
    substate: ResetSubstate,
    query_retry: u8,
    /// Set once the deadline has been computed from the true first
    /// `PL_STARTED`. Retry-driven re-entries into `Init` must never push
    /// `max_time` out again, or a device that never responds would run
    /// forever instead of being bounded by the configured deadline.
    started: bool,
    start_time: u64,
    max_time: u64,
    device_type: DeviceType,
    device_path: Option<String>,
    rx: RxBuffer,
    frame: FrameDecoder,
    file: Option<GcfFile>,
    btl_version: u32,
    app_crc: u32,
    deadline_ms: u64,
}

/// What the user asked the engine to do, selected by CLI flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    None,
    Reset,
    Program,
    List,
    Connect,
}

/// Top-level handler states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Init,
    Reset,
    Program,
    BootloaderConnect,
    BootloaderQuery,
    V1Sync,
    V1Header,
    V1Upload,
    V1Validate,
    V3Sync,
    V3Upload,
    Connect,
    Connected,
    ListDevices,
    /// Inert placeholder; the engine never dispatches events while in it.
    Void,
}

/// Substate of `State::Reset`, orthogonal to the top-level state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetSubstate {
    ResetUart,
    ResetFtdi,
    ResetRaspBee,
    Void,
}

/// Everything the platform or the engine itself can raise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    PlStarted,
    Timeout,
    /// Self-event used on state entry to drive the first reaction
    /// synchronously, without waiting for an external event.
    Action,
    Disconnected,
    RxAscii,
    RxBtlPkgData,
    PkgUartReset,
    UartResetSuccess,
    UartResetFailed,
    FtdiResetSuccess,
    FtdiResetFailed,
    RaspbeeResetSuccess,
    RaspbeeResetFailed,
    ResetSuccess,
    ResetFailed,
}

/// The 512-byte buffer shared between ASCII accumulation (V1 bootloader
/// text) and binary scratch space (V3 outbound frame payloads). Only one
/// mode is live at a time; which one is determined by the engine's current
/// state, not by the buffer itself.
struct RxBuffer {
    buf: [u8; RxBuffer::CAPACITY],
    wp: usize,
}

impl RxBuffer {
    const CAPACITY: usize = 512;
    /// Overflow guard: a single arriving chunk can never push `wp` past
    /// this before being reset, so `wp` never reaches `CAPACITY`.
    const OVERFLOW_AT: usize = 510;

    fn new() -> Self {
        Self {
            buf: [0; Self::CAPACITY],
            wp: 0,
        }
    }

    fn clear(&mut self) {
        self.wp = 0;
    }

    fn push(&mut self, byte: u8) {
        if self.wp >= Self::OVERFLOW_AT {
            self.wp = 0;
        }
        self.buf[self.wp] = byte;
        self.wp += 1;
    }

    fn bytes(&self) -> &[u8] {
        &self.buf[..self.wp]
    }

    fn ascii(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(self.bytes())
    }

    /// Copies a decoded bootloader frame payload in verbatim, as the frame
    /// codec upcall does for `RX_BTL_PKG_DATA`.
    fn load_frame(&mut self, payload: &[u8]) {
        let n = payload.len().min(Self::CAPACITY);
        self.buf[..n].copy_from_slice(&payload[..n]);
        self.wp = n;
    }
}

/// Everything needed to construct an [`Engine`]; produced by the CLI layer
/// after argument validation, so the engine itself never fails to parse.
pub struct EngineConfig {
    pub task: Task,
    pub device_path: Option<String>,
    pub file: Option<GcfFile>,
    pub device_type: DeviceType,
    pub deadline_ms: u64,
    pub baud: u32,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            task: config.task,
            state: State::Init,
            substate: ResetSubstate::Void,
            query_retry: 0,
            started: false,
            start_time: 0,
            max_time: 0,
            device_type: config.device_type,
            device_path: config.device_path,
            rx: RxBuffer::new(),
            frame: FrameDecoder::new(),
            file: config.file,
            btl_version: 0,
            app_crc: 0,
            deadline_ms: config.deadline_ms,
        }
    }

    #[cfg(test)]
    pub(crate) fn state(&self) -> State {
        self.state
    }

    #[cfg(test)]
    pub(crate) fn substate(&self) -> ResetSubstate {
        self.substate
    }

    fn enter(&mut self, state: State) {
        self.state = state;
    }

    fn enter_reset_substate(&mut self, substate: ResetSubstate) {
        self.substate = substate;
    }

    /// The retry controller: on every transient failure, compare
    /// wall-clock time against the deadline. Still inside the deadline:
    /// restart from `Init` after 250 ms (idempotent, since `Init` only
    /// re-applies already-validated configuration). Deadline exceeded: shut
    /// down without processing anything further.
    fn retry<P: Platform>(&mut self, platform: &mut P) {
        if platform.time() < self.max_time {
            self.state = State::Init;
            self.substate = ResetSubstate::Void;
            platform.set_timeout(250);
        } else {
            warn!("deadline exceeded, shutting down");
            platform.shut_down();
        }
    }

    /// Main event dispatcher. Every transition is a synchronous reaction;
    /// a handler may itself call `handle_event(platform, Event::Action)`
    /// once to drive sub-state entry, per the one-synchronous-`ACTION`-per-transition rule.
    pub fn handle_event<P: Platform>(&mut self, platform: &mut P, event: Event) {
        match self.state {
            State::Init => self.on_init(platform, event),
            State::Reset => self.on_reset(platform, event),
            State::Program => self.on_program(platform, event),
            State::BootloaderConnect => self.on_bootloader_connect(platform, event),
            State::BootloaderQuery => self.on_bootloader_query(platform, event),
            State::V1Sync => self.on_v1_sync(platform, event),
            State::V1Header => self.on_v1_header(platform, event),
            State::V1Upload => self.on_v1_upload(platform, event),
            State::V1Validate => self.on_v1_validate(platform, event),
            State::V3Sync => self.on_v3_sync(platform, event),
            State::V3Upload => self.on_v3_upload(platform, event),
            State::Connect => self.on_connect(platform, event),
            State::Connected => self.on_connected(platform, event),
            State::ListDevices => self.on_list_devices(platform, event),
            State::Void => {}
        }
    }

    fn on_init<P: Platform>(&mut self, platform: &mut P, event: Event) {
        if !matches!(event, Event::PlStarted | Event::Timeout) {
            return;
        }
        if !self.started {
            self.started = true;
            self.start_time = platform.time();
            self.max_time = self.start_time + self.deadline_ms;
        }
        match self.task {
            Task::None => {
                warn!("no task selected");
                platform.shut_down();
            }
            Task::Reset => {
                self.enter(State::Reset);
                self.handle_event(platform, Event::Action);
            }
            Task::Program => {
                self.enter(State::Program);
                self.handle_event(platform, Event::Action);
            }
            Task::List => {
                self.enter(State::ListDevices);
                self.handle_event(platform, Event::Action);
            }
            Task::Connect => {
                self.enter(State::Connect);
                self.handle_event(platform, Event::Action);
            }
        }
    }

    fn on_program<P: Platform>(&mut self, platform: &mut P, event: Event) {
        match event {
            Event::Action => {
                info!("programming: resetting device into bootloader");
                self.enter(State::Reset);
                self.enter_reset_substate(ResetSubstate::ResetUart);
                self.handle_event(platform, Event::Action);
            }
            Event::ResetSuccess => {
                self.enter(State::BootloaderConnect);
                platform.set_timeout(0);
            }
            Event::ResetFailed => {
                warn!("device reset failed, aborting");
                platform.shut_down();
            }
            _ => {}
        }
    }

    fn on_list_devices<P: Platform>(&mut self, platform: &mut P, event: Event) {
        if event != Event::Action {
            return;
        }
        let devices = platform.get_devices();
        print_device_table(&devices);
        platform.shut_down();
    }

    /// Receive dispatcher. While `state` consumes ASCII text (the V1
    /// bootloader states plus the bootloader query probe), every byte is
    /// appended to the rx buffer and a single `RX_ASCII` is raised for the
    /// whole arrival; the same bytes are then unconditionally fed to the
    /// frame codec regardless of state.
    pub fn on_bytes<P: Platform>(&mut self, platform: &mut P, bytes: &[u8]) {
        if self.consumes_ascii() {
            for &byte in bytes {
                self.rx.push(byte);
            }
            self.handle_event(platform, Event::RxAscii);
        }

        // A single read can contain more than one complete frame (the serial
        // platform reads in 1024-byte chunks); collect every frame the codec
        // completes before dispatching, so none are dropped in favor of the
        // last one, then dispatch each in arrival order.
        let mut classifieds = Vec::new();
        self.frame.receive_flagged(bytes, |payload| {
            classifieds.push(frame::classify(payload));
        });

        for classified in classifieds {
            match classified {
                ClassifiedPacket::WatchdogTimeoutAck => {
                    self.handle_event(platform, Event::PkgUartReset);
                }
                ClassifiedPacket::BootloaderData(payload) => {
                    self.rx.load_frame(&payload);
                    self.handle_event(platform, Event::RxBtlPkgData);
                }
                ClassifiedPacket::OtherWriteParamResponse | ClassifiedPacket::Unrecognized => {
                    // Logged and discarded, per the frame-codec upcall rules.
                }
            }
        }
    }

    fn consumes_ascii(&self) -> bool {
        matches!(
            self.state,
            State::BootloaderQuery
                | State::V1Sync
                | State::V1Header
                | State::V1Upload
                | State::V1Validate
        )
    }
}
