//! Autoconfig runtime.
//!
//! Wires the listener, provider chain and apply client together for each CLI
//! command.

use std::io::Write;

use anyhow::{Context, Result};
use crossbeam_channel::Receiver;
use dsp_config::{Format, ProviderChain};

use crate::config::AutoconfigConfig;
use crate::controller::Controller;
use crate::device;
use crate::dsp_client::{DryRunSink, Sink, WebSocketSink};
use crate::listener;

/// List capture devices and print them to stdout.
pub fn list_devices() -> Result<()> {
    let host = cpal::default_host();
    device::list_devices(&host)
}

/// Watch the device and reconfigure the engine on every format change.
///
/// Returns once the listener stream ends, i.e. after Ctrl-C.
pub fn run(config: AutoconfigConfig) -> Result<()> {
    let device = config.require_device()?.to_string();
    let chain = build_chain(&config)?;
    let sink = if config.dry_run {
        Sink::DryRun(DryRunSink::new(std::io::stdout()))
    } else {
        tracing::info!(dsp_addr = %config.dsp_addr, "applying configs over websocket");
        Sink::WebSocket(WebSocketSink::new(config.dsp_addr))
    };

    let shutdown = install_shutdown_handler()?;
    let events = listener::start(
        config.listener,
        &device,
        config.listener_settings,
        shutdown,
    )
    .with_context(|| format!("start {:?} listener on {device}", config.listener))?;

    let mut controller = Controller::new(chain, sink);
    controller.run(events);
    Ok(())
}

/// Print the first format detected on the device.
pub fn probe(config: AutoconfigConfig) -> Result<()> {
    let device = config.require_device()?.to_string();
    let shutdown = install_shutdown_handler()?;
    let mut events = listener::start(
        config.listener,
        &device,
        config.listener_settings,
        shutdown,
    )
    .with_context(|| format!("start {:?} listener on {device}", config.listener))?;

    match events.next() {
        Some(event) => {
            println!("{}", event.format);
            Ok(())
        }
        None => {
            tracing::info!("interrupted before a format was detected");
            Ok(())
        }
    }
}

/// Run the provider chain once for `format` and print the resulting YAML.
pub fn resolve(config: AutoconfigConfig, format: Format) -> Result<()> {
    let chain = build_chain(&config)?;
    let resolution = chain
        .resolve(&format)
        .with_context(|| format!("resolve config for {format}"))?;
    tracing::info!(%format, provider = %resolution.provider, "resolved config");
    let yaml = resolution.config.to_yaml().context("serialize config")?;
    let mut out = std::io::stdout().lock();
    out.write_all(yaml.as_bytes()).context("write config")?;
    out.flush().context("write config")?;
    Ok(())
}

fn build_chain(config: &AutoconfigConfig) -> Result<ProviderChain> {
    let chain = ProviderChain::from_specs(&config.providers).context("build provider chain")?;
    tracing::info!(providers = ?chain.names(), "provider chain ready");
    Ok(chain)
}

/// Ctrl-C ends the listener stream instead of killing the process, so the
/// platform registration is released on the way out.
fn install_shutdown_handler() -> Result<Receiver<()>> {
    let (tx, rx) = crossbeam_channel::bounded(1);
    ctrlc::set_handler(move || {
        tracing::info!("interrupt received, shutting down");
        let _ = tx.try_send(());
    })
    .context("install Ctrl-C handler")?;
    Ok(rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::{ListenerKind, ListenerSettings};
    use dsp_config::{ProviderSpec, SampleFormat};

    fn config(providers: Vec<ProviderSpec>) -> AutoconfigConfig {
        AutoconfigConfig {
            device: None,
            listener: ListenerKind::platform_default(),
            listener_settings: ListenerSettings::default(),
            providers,
            dsp_addr: "127.0.0.1:1234".parse().unwrap(),
            dry_run: true,
        }
    }

    #[test]
    fn build_chain_reports_missing_base() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(vec![ProviderSpec::Adapt {
            base: dir.path().join("missing.yml"),
        }]);
        assert!(build_chain(&cfg).is_err());
    }

    #[test]
    fn resolve_succeeds_with_adapt_base() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("base.yml");
        std::fs::write(&base, "devices:\n  samplerate: 44100\n").unwrap();
        let cfg = config(vec![ProviderSpec::Adapt { base }]);
        resolve(cfg, Format::new(48_000, SampleFormat::S16Le, 2)).unwrap();
    }

    #[test]
    fn resolve_fails_when_nothing_matches() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(vec![ProviderSpec::Specific {
            template: format!("{}/{{samplerate}}.yml", dir.path().display()),
        }]);
        let err = resolve(cfg, Format::new(48_000, SampleFormat::S16Le, 2)).unwrap_err();
        assert!(format!("{err:#}").contains("no provider"));
    }

    #[test]
    fn run_requires_device() {
        let cfg = config(vec![ProviderSpec::Specific {
            template: "/nonexistent/{samplerate}.yml".to_string(),
        }]);
        assert!(run(cfg).is_err());
    }
}
