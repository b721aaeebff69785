//! Watches a capture device for sample format changes and pushes a matching
//! config to a DSP engine.
//!
//! ## Flow
//! 1. **Listen**: a platform listener (`listener`) emits one event per format change.
//! 2. **Resolve**: the provider chain from `dsp_config` turns the format into a config.
//! 3. **Apply**: the `controller` hands the config to a `dsp_client` sink.

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
compile_error!("autoconfig supports Linux (ALSA) and macOS (CoreAudio) only");

pub mod cli;
pub mod config;
pub mod controller;
pub mod device;
pub mod dsp_client;
pub mod listener;
pub mod runtime;
