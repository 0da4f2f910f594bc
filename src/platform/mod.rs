//! The platform interface consumed by the engine core.
//!
//! Everything in this module is, per the design, an external collaborator:
//! device enumeration, serial port I/O, GPIO/FTDI reset, and timer
//! scheduling. The engine only ever sees the [`Platform`] trait; it never
//! touches a serial port or a GPIO pin directly. This indirection is what
//! lets the engine's state machine be driven by an in-memory test double
//! (see [`mock`]) instead of real hardware.

pub mod mock;
pub mod serial;

use crate::device::Device;

/// Side effects the engine can ask the platform to perform.
///
/// All methods are synchronous from the engine's point of view: the engine
/// is strictly single-threaded and cooperative (see the concurrency model),
/// so a `Platform` implementation never needs to be `Send`/`Sync`.
pub trait Platform {
    /// Opens the serial port at `device_path`. On success the platform must
    /// later deliver [`crate::engine::Event::Disconnected`] if the link
    /// drops.
    fn connect(&mut self, device_path: &str) -> bool;

    /// Closes the serial port, if open.
    fn disconnect(&mut self);

    /// Writes unframed bytes to the serial port.
    fn write(&mut self, bytes: &[u8]);

    /// Arms the single timer. A new call implicitly cancels any previous
    /// one: there is only ever one active timeout.
    fn set_timeout(&mut self, ms: u64);

    /// Disarms the timer without it firing.
    fn clear_timeout(&mut self);

    /// Synchronous delay, used for the handful of fixed sleeps the wire
    /// protocols require (e.g. the 50 ms pause before a V3 sync attempt).
    fn sleep(&mut self, ms: u64);

    /// Monotonic clock, in milliseconds, used by the retry controller to
    /// evaluate the deadline.
    fn time(&self) -> u64;

    /// Enumerates candidate devices.
    fn get_devices(&mut self) -> Vec<Device>;

    /// Attempts an FTDI bitbang reset (ConBee-1). Returns whether it
    /// succeeded.
    fn reset_ftdi(&mut self) -> bool;

    /// Attempts a RaspBee GPIO reset (RaspBee-1/2). Returns whether it
    /// succeeded.
    fn reset_raspbee(&mut self) -> bool;

    /// Starts reporting upload progress against `total_bytes`.
    fn progress_init(&mut self, total_bytes: u32);

    /// Reports that `current_bytes` out of the total passed to
    /// [`Platform::progress_init`] have been transferred.
    fn progress_update(&mut self, current_bytes: u32);

    /// Reports that the upload in progress is done.
    fn progress_finish(&mut self);

    /// Terminates the engine's event loop.
    fn shut_down(&mut self);
}
