//! Library and application errors.
//!
//! Transient failures encountered while driving the engine (transport
//! errors, bootloader timeouts, negative status responses) never reach this
//! type: they funnel through the retry controller instead (see
//! [`crate::engine::retry`]). This enum covers fatal errors only — the ones
//! that abort the process without a retry.

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

use crate::gcf::GcfError;

/// All fatal, non-retryable errors surfaced by the CLI.
#[derive(Debug, Error, Diagnostic)]
#[non_exhaustive]
pub enum Error {
    #[error("failed to read firmware file `{}`", .path.display())]
    #[diagnostic(code(zbflash::firmware_read_failed))]
    FirmwareRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid firmware file `{}`: {source}", .path.display())]
    #[diagnostic(
        code(zbflash::invalid_firmware),
        help("GCF files must start with magic 0xCAFEFEED and encode their version as `0x...` in the filename")
    )]
    InvalidFirmware {
        path: PathBuf,
        #[source]
        source: GcfError,
    },

    #[error("no device path given; pass `-d <path>` or run with `-l` to list candidates")]
    #[diagnostic(code(zbflash::no_device))]
    NoDevice,

    #[error("`-t/--timeout` must be between 1 and 3600 seconds, got {0}")]
    #[diagnostic(code(zbflash::invalid_timeout))]
    InvalidTimeout(u64),

    #[error("no task selected; pass one of -r, -f, -c, -l")]
    #[diagnostic(code(zbflash::no_task))]
    NoTask,

    #[error("failed to load configuration file: {0}")]
    #[diagnostic(code(zbflash::config))]
    Config(String),
}
