/*
 *  config.rs
 *
 *  qnaplcd - front panel, no fuss
 *  (c) 2020-26 Stuart Hunter
 *
 *  Layered configuration: defaults, YAML file, command line
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

use serde::{Deserialize, Serialize};
use clap::{ArgAction, Parser, ValueHint};
use dirs_next::home_dir;
use std::{fs, path::{Path, PathBuf}, time::Duration};
use thiserror::Error;

use crate::display::driver::Timing;
use crate::display::drivers::serial::{baud_constant, DEFAULT_BAUD, DEFAULT_PORT};
use crate::display::handshake::HANDSHAKE_TIMEOUT;
use crate::pacer::FLUSH_INTERVAL;

/// Idle time before the panel goes dark.
pub const STANDBY_SECS: u64 = 10;

/// How often the address list is re-read while awake.
pub const REFRESH_SECS: u64 = 60;

/// Error type for config loading/validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Top-level app configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    /// General options
    pub log_level: Option<String>,     // e.g., "info" | "debug"
    /// serial line and panel timings
    pub display: Option<DisplayConfig>,
    /// address cycling and standby
    pub monitor: Option<MonitorConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct DisplayConfig {
    pub port: Option<String>,               // e.g. "/dev/ttyS1"
    pub baud_rate: Option<u32>,
    pub handshake_timeout_ms: Option<u64>,
    pub flush_interval_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct MonitorConfig {
    pub standby_secs: Option<u64>,
    pub refresh_secs: Option<u64>,
}

impl Config {
    pub fn display(&self) -> DisplayConfig {
        self.display.clone().unwrap_or_default()
    }

    pub fn monitor(&self) -> MonitorConfig {
        self.monitor.clone().unwrap_or_default()
    }
}

impl DisplayConfig {
    pub fn port(&self) -> &str {
        self.port.as_deref().unwrap_or(DEFAULT_PORT)
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud_rate.unwrap_or(DEFAULT_BAUD)
    }

    /// Driver timings, falling back to the panel's defaults.
    pub fn timing(&self) -> Timing {
        Timing {
            handshake_timeout: self
                .handshake_timeout_ms
                .map_or(HANDSHAKE_TIMEOUT, Duration::from_millis),
            flush_interval: self
                .flush_interval_ms
                .map_or(FLUSH_INTERVAL, Duration::from_millis),
        }
    }
}

impl MonitorConfig {
    pub fn standby(&self) -> Duration {
        Duration::from_secs(self.standby_secs.unwrap_or(STANDBY_SECS))
    }

    pub fn refresh(&self) -> Duration {
        Duration::from_secs(self.refresh_secs.unwrap_or(REFRESH_SECS))
    }
}

/// CLI overrides. All fields are Options so we can layer them over YAML.
#[derive(Debug, Parser, Clone, Default)]
#[command(name = env!("CARGO_PKG_NAME"), version, about = "QNAP front panel monitor")]
pub struct Cli {
    /// Path to a YAML config file (overrides search)
    #[arg(long, short = 'c', value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,
    #[arg(long)]
    pub log_level: Option<String>,
    /// Enable debug log level
    #[arg(long, short = 'v', alias = "verbose", action = ArgAction::SetTrue)]
    pub debug: bool,
    /// Serial port the panel is wired to
    #[arg(long, short = 'p', value_hint = ValueHint::FilePath)]
    pub port: Option<String>,
    #[arg(long)]
    pub baud_rate: Option<u32>,
    /// Seconds without a button press before the panel goes dark
    #[arg(long)]
    pub standby_secs: Option<u64>,
    /// dump fully merged config (after overrides) and exit
    #[arg(long, action = ArgAction::SetTrue)]
    pub dump_config: bool,
}

/// Public entry point: parse CLI, read YAML, merge, validate.
///
/// Returns the CLI as well, the caller still needs the debug and dump flags.
pub fn load() -> Result<(Config, Cli), ConfigError> {
    let cli = Cli::parse();
    let cfg = load_from(&cli)?;
    Ok((cfg, cli))
}

/// Build the effective config for already parsed arguments.
pub fn load_from(cli: &Cli) -> Result<Config, ConfigError> {
    // 1) defaults (from `Default` impl)
    let mut cfg = Config::default();

    // 2) YAML file (explicit path or search)
    if let Some(p) = cli.config.as_ref() {
        if p.exists() {
            let y = read_yaml(p)?;
            merge(&mut cfg, y);
        } else {
            return Err(ConfigError::Validation(format!(
                "Config file not found: {}",
                p.display()
            )));
        }
    } else if let Some(p) = find_config_file() {
        let y = read_yaml(&p)?;
        merge(&mut cfg, y);
    }

    // 3) CLI overrides (highest precedence)
    apply_cli_overrides(&mut cfg, cli);

    // 4) Validate
    validate(&cfg)?;
    Ok(cfg)
}

/// Pretty YAML of the effective config (nice for debugging)
pub fn dump(cfg: &Config) -> Result<String, ConfigError> {
    Ok(serde_yaml::to_string(cfg)?)
}

/// Try common locations in order (first hit wins).
fn find_config_file() -> Option<PathBuf> {
    // XDG-style: ~/.config/qnaplcd/config.yaml
    if let Some(home) = home_dir() {
        let p = home.join(".config/qnaplcd/config.yaml");
        if p.exists() { return Some(p) }
        let p = home.join(".config/qnaplcd.yaml");
        if p.exists() { return Some(p) }
    }
    // project local
    for candidate in &["qnaplcd.yaml", "config.yaml"] {
        let p = PathBuf::from(candidate);
        if p.exists() { return Some(p) }
    }
    None
}

fn read_yaml(path: &Path) -> Result<Config, ConfigError> {
    let s = fs::read_to_string(path)?;
    parse_yaml(&s)
}

fn parse_yaml(s: &str) -> Result<Config, ConfigError> {
    // an empty file is a valid, empty config
    if s.trim().is_empty() {
        return Ok(Config::default());
    }
    Ok(serde_yaml::from_str(s)?)
}

/// Shallow merge `src` into `dst`, Option-by-Option.
fn merge(dst: &mut Config, src: Config) {
    // top-level
    if src.log_level.is_some()      { dst.log_level = src.log_level; }
    // display
    match (&mut dst.display, src.display) {
        (None, Some(c)) => dst.display = Some(c),
        (Some(d), Some(s)) => merge_display(d, s),
        _ => {}
    }
    // monitor
    match (&mut dst.monitor, src.monitor) {
        (None, Some(c)) => dst.monitor = Some(c),
        (Some(d), Some(s)) => merge_monitor(d, s),
        _ => {}
    }
}

fn merge_display(dst: &mut DisplayConfig, src: DisplayConfig) {
    if src.port.is_some()                  { dst.port = src.port; }
    if src.baud_rate.is_some()             { dst.baud_rate = src.baud_rate; }
    if src.handshake_timeout_ms.is_some()  { dst.handshake_timeout_ms = src.handshake_timeout_ms; }
    if src.flush_interval_ms.is_some()     { dst.flush_interval_ms = src.flush_interval_ms; }
}

fn merge_monitor(dst: &mut MonitorConfig, src: MonitorConfig) {
    if src.standby_secs.is_some()  { dst.standby_secs = src.standby_secs; }
    if src.refresh_secs.is_some()  { dst.refresh_secs = src.refresh_secs; }
}

fn apply_cli_overrides(cfg: &mut Config, cli: &Cli) {
    if cli.log_level.is_some()  { cfg.log_level = cli.log_level.clone(); }
    if cli.debug                { cfg.log_level = Some("debug".into()); }

    if cli.port.is_some() || cli.baud_rate.is_some() {
        let display = cfg.display.get_or_insert_with(DisplayConfig::default);
        if cli.port.is_some()       { display.port = cli.port.clone(); }
        if cli.baud_rate.is_some()  { display.baud_rate = cli.baud_rate; }
    }
    if cli.standby_secs.is_some() {
        cfg.monitor.get_or_insert_with(MonitorConfig::default).standby_secs = cli.standby_secs;
    }
}

/// Put any invariants here (required fields, ranges, etc.)
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if let Some(display) = cfg.display.as_ref() {
        if display.port().trim().is_empty() {
            return Err(ConfigError::Validation("display port must not be empty".into()));
        }
        if baud_constant(display.baud_rate()).is_none() {
            return Err(ConfigError::Validation(format!(
                "display baud_rate {} is not a supported serial speed",
                display.baud_rate()
            )));
        }
        if display.handshake_timeout_ms == Some(0) || display.flush_interval_ms == Some(0) {
            return Err(ConfigError::Validation("display timings must be > 0".into()));
        }
    }
    if let Some(monitor) = cfg.monitor.as_ref() {
        if monitor.standby_secs == Some(0) || monitor.refresh_secs == Some(0) {
            return Err(ConfigError::Validation("monitor intervals must be > 0".into()));
        }
    }
    Ok(())
}
