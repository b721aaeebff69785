//! Configuration providers.
//!
//! A provider turns a detected `Format` into a ready-to-apply document, or
//! reports that it has nothing for that format.

mod adapt;
mod specific;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::Deserialize;
use thiserror::Error;

use crate::document::{ConfigDocument, ConfigError};
use crate::format::Format;

pub use adapt::AdaptProvider;
pub use specific::SpecificProvider;

/// Outcome of a single provider attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderResult {
    Found(ConfigDocument),
    NotFound,
}

/// Capability shared by every provider variant.
pub trait Provide {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Produce a configuration for `format`.
    ///
    /// `Ok(NotFound)` lets the chain fall through; `Err` aborts it.
    fn provide(&self, format: &Format) -> Result<ProviderResult, ConfigError>;
}

/// The closed set of providers a chain can be built from.
#[derive(Debug, Clone)]
pub enum Provider {
    Specific(SpecificProvider),
    Adapt(AdaptProvider),
}

impl Provider {
    /// Construct a provider from its spec.
    ///
    /// The Adapt variant reads its base file here; failures are fatal.
    pub fn from_spec(spec: &ProviderSpec) -> Result<Self, ConfigError> {
        match spec {
            ProviderSpec::Specific { template } => {
                Ok(Provider::Specific(SpecificProvider::new(template.clone())))
            }
            ProviderSpec::Adapt { base } => Ok(Provider::Adapt(AdaptProvider::load(base)?)),
        }
    }
}

impl Provide for Provider {
    fn name(&self) -> &str {
        match self {
            Provider::Specific(p) => p.name(),
            Provider::Adapt(p) => p.name(),
        }
    }

    fn provide(&self, format: &Format) -> Result<ProviderResult, ConfigError> {
        match self {
            Provider::Specific(p) => p.provide(format),
            Provider::Adapt(p) => p.provide(format),
        }
    }
}

/// Declarative description of one chain entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ProviderSpec {
    /// Path template with `{samplerate}`, `{sampleformat}` and `{channels}`.
    Specific { template: String },
    /// Base config adapted to each format.
    Adapt { base: PathBuf },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProviderSpecError {
    #[error("provider spec must look like `specific=<template>` or `adapt=<path>`: {0}")]
    Malformed(String),
    #[error("unknown provider kind `{0}` (expected `specific` or `adapt`)")]
    UnknownKind(String),
    #[error("provider `{0}` needs a non-empty value")]
    EmptyValue(String),
}

impl FromStr for ProviderSpec {
    type Err = ProviderSpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, value) = s
            .split_once('=')
            .ok_or_else(|| ProviderSpecError::Malformed(s.to_string()))?;
        let kind = kind.trim().to_ascii_lowercase();
        let value = value.trim();
        if value.is_empty() {
            return Err(ProviderSpecError::EmptyValue(kind));
        }
        match kind.as_str() {
            "specific" => Ok(ProviderSpec::Specific {
                template: value.to_string(),
            }),
            "adapt" => Ok(ProviderSpec::Adapt {
                base: PathBuf::from(value),
            }),
            _ => Err(ProviderSpecError::UnknownKind(kind)),
        }
    }
}

impl fmt::Display for ProviderSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderSpec::Specific { template } => write!(f, "specific={template}"),
            ProviderSpec::Adapt { base } => write!(f, "adapt={}", base.display()),
        }
    }
}
