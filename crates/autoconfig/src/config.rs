//! Settings for the daemon: an optional TOML file merged with CLI flags.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use dsp_config::ProviderSpec;
use serde::Deserialize;
use thiserror::Error;

use crate::cli::Args;
use crate::listener::{ListenerKind, ListenerSettings};

const DEFAULT_DSP_PORT: u16 = 1234;

/// On-disk config file.
///
/// ```toml
/// device = "hw:Loopback,1,0"
/// dsp_addr = "127.0.0.1:1234"
///
/// [[providers]]
/// kind = "specific"
/// template = "/etc/dsp/conf_{samplerate}_{channels}.yml"
///
/// [[providers]]
/// kind = "adapt"
/// base = "/etc/dsp/base.yml"
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub device: Option<String>,
    pub listener: Option<ListenerKind>,
    pub dsp_addr: Option<SocketAddr>,
    pub poll_interval_ms: Option<u64>,
    pub debounce_ms: Option<u64>,
    #[serde(default)]
    pub providers: Vec<ProviderSpec>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw =
            std::fs::read_to_string(path).with_context(|| format!("read config {:?}", path))?;
        let cfg = toml::from_str::<FileConfig>(&raw)
            .with_context(|| format!("parse config {:?}", path))?;
        Ok(cfg)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("no config providers configured (use --provider or [[providers]] in the config file)")]
    NoProviders,
    #[error("no capture device configured (use --device or `device` in the config file)")]
    MissingDevice,
    #[error("poll interval must be greater than zero")]
    ZeroPollInterval,
}

/// Fully resolved settings handed to the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoconfigConfig {
    pub device: Option<String>,
    pub listener: ListenerKind,
    pub listener_settings: ListenerSettings,
    pub providers: Vec<ProviderSpec>,
    pub dsp_addr: SocketAddr,
    pub dry_run: bool,
}

impl AutoconfigConfig {
    /// Load the file named by `--config` (if any) and merge the CLI over it.
    pub fn from_args(args: &Args) -> Result<Self> {
        let file = match &args.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        Ok(Self::merge(file, args)?)
    }

    /// CLI values win; a non-empty `--provider` list replaces the file's chain.
    pub fn merge(file: FileConfig, args: &Args) -> Result<Self, SettingsError> {
        let providers = if args.providers.is_empty() {
            file.providers
        } else {
            args.providers.clone()
        };
        if providers.is_empty() {
            return Err(SettingsError::NoProviders);
        }

        let defaults = ListenerSettings::default();
        let listener_settings = ListenerSettings {
            poll_interval: args
                .poll_interval_ms
                .or(file.poll_interval_ms)
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            debounce: args
                .debounce_ms
                .or(file.debounce_ms)
                .map(Duration::from_millis)
                .unwrap_or(defaults.debounce),
        };

        if listener_settings.poll_interval.is_zero() {
            return Err(SettingsError::ZeroPollInterval);
        }

        Ok(Self {
            device: normalize_device_name(args.device.clone().or(file.device)),
            listener: args
                .listener
                .or(file.listener)
                .unwrap_or_else(ListenerKind::platform_default),
            listener_settings,
            providers,
            dsp_addr: args
                .dsp_addr
                .or(file.dsp_addr)
                .unwrap_or_else(|| SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_DSP_PORT))),
            dry_run: args.dry_run,
        })
    }

    /// Device name for commands that need one.
    pub fn require_device(&self) -> Result<&str, SettingsError> {
        self.device.as_deref().ok_or(SettingsError::MissingDevice)
    }
}

fn normalize_device_name(device: Option<String>) -> Option<String> {
    device.and_then(|name| {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}
