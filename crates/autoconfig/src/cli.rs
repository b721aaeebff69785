use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use dsp_config::{ProviderSpec, SampleFormat};

use crate::listener::ListenerKind;

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_SHA"),
    ", ",
    env!("BUILD_DATE"),
    ")"
);

#[derive(Parser, Debug)]
#[command(
    name = "autoconfig",
    version = VERSION,
    about = "Reconfigure a DSP engine when the capture format changes"
)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Option<Command>,

    /// TOML config file; command line flags take precedence
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Capture device to watch, e.g. `hw:Loopback,1,0` or `BlackHole 2ch`
    #[arg(long, global = true)]
    pub device: Option<String>,

    /// Listener mechanism (defaults to the one for this platform)
    #[arg(long, value_enum, global = true)]
    pub listener: Option<ListenerKind>,

    /// Config provider, `specific=<template>` or `adapt=<base.yml>`. Repeat to build a chain;
    /// earlier providers win.
    #[arg(long = "provider", value_name = "SPEC", global = true)]
    pub providers: Vec<ProviderSpec>,

    /// DSP engine websocket address
    #[arg(long, global = true)]
    pub dsp_addr: Option<SocketAddr>,

    /// Polling interval for polling listeners (ms)
    #[arg(long, global = true)]
    pub poll_interval_ms: Option<u64>,

    /// Settle time before a detected change is read again (ms)
    #[arg(long, global = true)]
    pub debounce_ms: Option<u64>,

    /// Print configs instead of sending them to the engine
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// List capture devices and exit
    #[arg(long)]
    pub list_devices: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Watch the device and apply a config on every format change (default)
    Run,

    /// Print the first format detected on the device and exit
    Probe,

    /// Resolve a config for the given format and print it
    Resolve {
        /// Sample rate in Hz
        #[arg(long)]
        rate: u32,

        /// Sample format, e.g. S32LE or FLOAT32LE
        #[arg(long)]
        format: SampleFormat,

        /// Channel count
        #[arg(long, default_value_t = 2)]
        channels: u16,
    },
}

impl Args {
    pub fn command(&self) -> Command {
        self.cmd.clone().unwrap_or(Command::Run)
    }
}
