//! Command-line argument definitions (clap) and help text.

use std::path::PathBuf;

use clap::Parser;

pub const HELP_TEXT: &str = "
UPS Sentry: APC UPS monitor with ordered low-battery shutdown
Usage: ups-sentry [OPTIONS]

Options:
  -h, --help                    Print help
  -V, --version                 Print version
Monitor:
      --run                     Run the monitor loop (and read API) in the foreground
Status & History:
  -i, --status                  Show current UPS status
      --history <RANGE>         Show stored samples (1h, 24h, 7d)
      --log-level <LOG_LEVEL>   Set log level (TRACE, DEBUG, INFO, WARN, ERROR, CRITICAL)
Config & Debug:
  -c, --config                  Show effective configuration (passwords masked)
      --check                   Run health check (config, apcupsd, database)
      --config-path <PATH>      Use this config file instead of config.json next to the binary
";

#[derive(Parser, Debug)]
#[command(name = "ups-sentry")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "APC UPS monitor with ordered low-battery shutdown", long_about = None)]
pub struct Args {
    // === Monitor ===
    /// Run the monitor loop (and read API) in the foreground
    #[arg(long, help_heading = "Monitor")]
    pub run: bool,

    // === Status & History ===
    /// Show current UPS status
    #[arg(short = 'i', long = "status", help_heading = "Status & History")]
    pub status: bool,

    /// Show stored samples (1h, 24h, 7d)
    #[arg(long, value_name = "RANGE", help_heading = "Status & History")]
    pub history: Option<String>,

    /// Set log level (TRACE, DEBUG, INFO, WARN, ERROR, CRITICAL)
    #[arg(long = "log-level", help_heading = "Status & History")]
    pub log_level: Option<String>,

    // === Config & Debug ===
    /// Show effective configuration (passwords masked)
    #[arg(short = 'c', long, help_heading = "Config & Debug")]
    pub config: bool,

    /// Run health check (config, apcupsd, database)
    #[arg(long, help_heading = "Config & Debug")]
    pub check: bool,

    /// Use this config file instead of config.json next to the binary
    #[arg(long = "config-path", value_name = "PATH", help_heading = "Config & Debug")]
    pub config_path: Option<PathBuf>,
}

impl Args {
    /// True when at least one command (as opposed to a modifier flag) was given.
    pub fn has_command(&self) -> bool {
        self.run || self.status || self.config || self.check || self.history.is_some()
    }
}
