//! Ordered provider chain.
//!
//! Providers are tried in declaration order and the first `Found` wins.
//! `NotFound` falls through; any error stops the chain so that a broken
//! config file is never masked by a weaker fallback.

use thiserror::Error;

use crate::document::{ConfigDocument, ConfigError};
use crate::format::Format;
use crate::provider::{Provide, Provider, ProviderResult, ProviderSpec};

/// Successful chain resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// Name of the provider that produced the config.
    pub provider: String,
    pub config: ConfigDocument,
}

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("no provider produced a config for {format}")]
    NoProviderMatched { format: Format },
    #[error("provider `{provider}` failed: {source}")]
    Provider {
        provider: String,
        #[source]
        source: ConfigError,
    },
}

#[derive(Debug, Clone)]
pub struct ProviderChain<P = Provider> {
    providers: Vec<P>,
}

impl ProviderChain<Provider> {
    /// Build the chain from specs, constructing each provider eagerly.
    pub fn from_specs(specs: &[ProviderSpec]) -> Result<Self, ConfigError> {
        let providers = specs
            .iter()
            .map(Provider::from_spec)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(providers))
    }
}

impl<P: Provide> ProviderChain<P> {
    pub fn new(providers: Vec<P>) -> Self {
        Self { providers }
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Names of the providers in chain order.
    pub fn names(&self) -> Vec<&str> {
        self.providers.iter().map(Provide::name).collect()
    }

    /// Run the chain for `format`.
    pub fn resolve(&self, format: &Format) -> Result<Resolution, ChainError> {
        for provider in &self.providers {
            let name = provider.name();
            match provider.provide(format) {
                Ok(ProviderResult::Found(config)) => {
                    tracing::debug!(provider = name, %format, "provider matched");
                    return Ok(Resolution {
                        provider: name.to_string(),
                        config,
                    });
                }
                Ok(ProviderResult::NotFound) => {
                    tracing::debug!(provider = name, %format, "provider has no config, trying next");
                }
                Err(source) => {
                    return Err(ChainError::Provider {
                        provider: name.to_string(),
                        source,
                    });
                }
            }
        }
        Err(ChainError::NoProviderMatched { format: *format })
    }
}
