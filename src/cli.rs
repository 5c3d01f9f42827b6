use crate::config::Settings;
use crate::error::{OtaError, Result};
use crate::image::DEFAULT_OBJCOPY;
use crate::ota::{UpdateKind, DEFAULT_PORT};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(name = "nota")]
#[command(about = "Push a firmware image to a device over the air", long_about = None)]
#[command(version)]
#[command(after_help = "EXAMPLES:
    # Flash update
    nota -i 192.168.1.50 -f firmware.bin

    # Filesystem image to a password-protected device
    nota -i 192.168.1.50 -p 3232 -a secret -s -f spiffs.bin

    # ELF input is converted with objcopy first
    nota -i 192.168.1.50 -f build/firmware.elf

    # Repeat the last upload (target and file are remembered)
    nota")]
pub struct Cli {
    /// Target IP address or hostname
    #[arg(short = 'i', long = "ip", value_name = "HOST")]
    pub host: Option<String>,

    /// Target port [default: 8266]
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Device password
    #[arg(short = 'a', long = "auth", env = "NOTA_AUTH", hide_env_values = true)]
    pub auth: Option<String>,

    /// Firmware image (.bin, or .elf to convert first)
    #[arg(short = 'f', long = "file", value_name = "IMAGE")]
    pub file: Option<PathBuf>,

    /// Upload a filesystem (SPIFFS) image instead of flash
    #[arg(short = 's', long)]
    pub spiffs: bool,

    /// Log every byte on the wire
    #[arg(short, long)]
    pub debug: bool,

    /// Prefix output lines with a UTC timestamp
    #[arg(short, long)]
    pub timestamp: bool,

    /// objcopy used to convert ELF images
    #[arg(long, value_name = "PROGRAM", default_value = DEFAULT_OBJCOPY)]
    pub objcopy: String,

    /// Settings file [default: $XDG_CONFIG_HOME/nota/settings.toml]
    #[arg(long, value_name = "PATH")]
    pub settings: Option<PathBuf>,

    /// Do not store host, port and file for the next run
    #[arg(long)]
    pub no_remember: bool,
}

/// Fully resolved invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub host: String,
    pub port: u16,
    pub file: PathBuf,
    pub kind: UpdateKind,
    pub password: Option<String>,
}

impl Cli {
    /// Values given on the command line, as settings
    pub fn as_settings(&self) -> Settings {
        Settings {
            host: self.host.clone(),
            port: self.port,
            file: self.file.clone(),
        }
    }

    pub fn kind(&self) -> UpdateKind {
        if self.spiffs {
            UpdateKind::Filesystem
        } else {
            UpdateKind::Flash
        }
    }

    /// Fill gaps from remembered settings and validate.
    pub fn resolve(&self, remembered: &Settings) -> Result<Target> {
        let merged = remembered.merged(&self.as_settings());

        let host = merged
            .host
            .filter(|h| !h.is_empty())
            .ok_or(OtaError::MissingParameter(
                "[-i] / [--ip] for the target IP address.",
            ))?;
        let file = merged.file.ok_or(OtaError::MissingParameter(
            "[-f] / [--file] for the binary image file.",
        ))?;

        Ok(Target {
            host,
            port: merged.port.unwrap_or(DEFAULT_PORT),
            file,
            kind: self.kind(),
            password: self.auth.clone().filter(|a| !a.is_empty()),
        })
    }

    /// Tracing filter directive for this invocation
    pub fn log_filter(&self) -> &'static str {
        if self.debug {
            "nota=debug"
        } else {
            "nota=warn"
        }
    }
}
