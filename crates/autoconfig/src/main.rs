use anyhow::Result;
use clap::Parser;
use dsp_config::Format;
use tracing_subscriber::EnvFilter;

use autoconfig::cli::{Args, Command};
use autoconfig::config::AutoconfigConfig;
use autoconfig::runtime;

fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,autoconfig=info,dsp_config=info")
        }))
        .init();

    if args.list_devices {
        return runtime::list_devices();
    }

    let config = AutoconfigConfig::from_args(&args)?;
    match args.command() {
        Command::Run => runtime::run(config),
        Command::Probe => runtime::probe(config),
        Command::Resolve {
            rate,
            format,
            channels,
        } => runtime::resolve(config, Format::new(rate, format, channels)),
    }
}
