//! Command-line surface. One task flag (`-r`/`-f`/`-c`/`-l`) selects what the
//! engine does, `-d` picks the device, `-t` bounds the deadline.

pub mod config;

use std::fs;
use std::path::PathBuf;

use clap::Parser;
use log::LevelFilter;

use crate::device::{self, DeviceType};
use crate::engine::{EngineConfig, Task};
use crate::error::Error;
use crate::gcf::{self, GcfFile};

use config::Config;

const DEFAULT_TIMEOUT_SECS: u64 = 10;
const MAX_TIMEOUT_SECS: u64 = 3600;

#[derive(Parser, Debug)]
#[command(
    name = "zbflash",
    version,
    about = "Flash firmware onto ConBee/RaspBee Zigbee coprocessors",
    disable_help_flag = true
)]
pub struct Args {
    /// Print help (`-?` is also accepted)
    #[arg(short = 'h', long = "help", short_alias = '?', action = clap::ArgAction::Help)]
    help: (),

    /// Reset the device out of its bootloader and back into application firmware
    #[arg(short = 'r', long)]
    pub reset: bool,

    /// Path to a GCF firmware image to upload
    #[arg(short = 'f', long, value_name = "PATH")]
    pub firmware: Option<PathBuf>,

    /// Serial device path (defaults to the configured device, if any)
    #[arg(short = 'd', long, value_name = "PATH")]
    pub device: Option<String>,

    /// Open a diagnostic connection and poll device status
    #[arg(short = 'c', long)]
    pub connect: bool,

    /// Overall deadline in seconds (1-3600), default 10 under --firmware
    #[arg(short = 't', long, value_name = "SECONDS")]
    pub timeout: Option<u64>,

    /// List candidate devices and exit
    #[arg(short = 'l', long)]
    pub list: bool,

    /// Increase logging verbosity; repeat for more detail
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    pub fn log_level(&self) -> LevelFilter {
        match self.verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }

    /// Validates the parsed arguments against a loaded [`Config`] and turns
    /// them into an [`EngineConfig`], reading and parsing the firmware file
    /// up front so the engine itself never fails to "parse the command
    /// line" on retry.
    pub fn into_engine_config(self, config: &Config) -> Result<EngineConfig, Error> {
        let selected = [self.reset, self.firmware.is_some(), self.connect, self.list]
            .iter()
            .filter(|f| **f)
            .count();
        if selected == 0 {
            return Err(Error::NoTask);
        }
        if selected > 1 {
            return Err(Error::Config("only one of -r, -f, -c, -l may be given".into()));
        }

        let timeout_secs = self
            .timeout
            .or(config.default_timeout_secs)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        if timeout_secs == 0 || timeout_secs > MAX_TIMEOUT_SECS {
            return Err(Error::InvalidTimeout(timeout_secs));
        }

        let device_path = self.device.or_else(|| config.default_device.clone());

        let task = if self.list {
            Task::List
        } else if self.reset {
            Task::Reset
        } else if self.connect {
            Task::Connect
        } else {
            Task::Program
        };

        if task != Task::List && device_path.is_none() {
            return Err(Error::NoDevice);
        }

        let mut device_type = device_path
            .as_deref()
            .map(device::classify)
            .unwrap_or(DeviceType::Unknown);

        let file = match self.firmware {
            Some(path) => {
                let bytes = fs::read(&path).map_err(|source| Error::FirmwareRead {
                    path: path.clone(),
                    source,
                })?;
                let filename = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let parsed = GcfFile::parse(&filename, &bytes).map_err(|source| Error::InvalidFirmware {
                    path: path.clone(),
                    source,
                })?;
                device_type = gcf::promote_device_type(device_type, parsed.fw_version);
                Some(parsed)
            }
            None => None,
        };

        let baud = config.default_baud_rate.unwrap_or(config::DEFAULT_BAUD_RATE);

        Ok(EngineConfig {
            task,
            device_path,
            file,
            device_type,
            deadline_ms: timeout_secs * 1000,
            baud,
        })
    }
}
