//! Format-driven DSP configuration.
//!
//! Holds the audio `Format` value type, the YAML `ConfigDocument` with typed
//! accessors for the fields that depend on the stream format, and the
//! provider chain that turns a format into a ready-to-apply document.

pub mod chain;
pub mod document;
pub mod format;
pub mod provider;

pub use chain::{ChainError, ProviderChain, Resolution};
pub use document::{ConfigDocument, ConfigError, DocumentError, ResamplerKind};
pub use format::{Format, SampleFormat};
pub use provider::{
    AdaptProvider, Provide, Provider, ProviderResult, ProviderSpec, ProviderSpecError,
    SpecificProvider,
};
