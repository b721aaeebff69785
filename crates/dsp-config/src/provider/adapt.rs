use std::path::{Path, PathBuf};

use crate::document::{self, ConfigDocument, ConfigError, ResamplerKind};
use crate::format::Format;
use crate::provider::{Provide, ProviderResult};

/// Adapts one base config to whatever format the device reports.
///
/// The base is read once; every call works on its own copy.
#[derive(Debug, Clone)]
pub struct AdaptProvider {
    path: PathBuf,
    base: ConfigDocument,
}

impl AdaptProvider {
    /// Load the base config from disk.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let base = document::load(path)?;
        tracing::info!(path = %path.display(), "loaded adapt base config");
        Ok(Self::from_document(path.to_path_buf(), base))
    }

    pub fn from_document(path: PathBuf, base: ConfigDocument) -> Self {
        Self { path, base }
    }

    pub fn base(&self) -> &ConfigDocument {
        &self.base
    }

    /// Apply the format to a copy of the base.
    pub fn adapt(&self, format: &Format) -> ConfigDocument {
        let mut doc = self.base.clone();
        let rate = format.sample_rate;

        match doc.resampler_kind() {
            Some(kind) => {
                doc.set_capture_samplerate(rate);
                if kind == ResamplerKind::Synchronous && doc.samplerate() == Some(rate) {
                    tracing::debug!(rate_hz = rate, "capture matches processing rate, resampler removed");
                    doc.remove_resampler();
                }
            }
            None => doc.set_samplerate(rate),
        }

        if !doc.set_capture_format(format.sample_format) {
            tracing::debug!(
                sample_format = %format.sample_format,
                "base declares no capture format, leaving it unset"
            );
        }
        doc
    }
}

impl Provide for AdaptProvider {
    fn name(&self) -> &str {
        "adapt"
    }

    fn provide(&self, format: &Format) -> Result<ProviderResult, ConfigError> {
        tracing::debug!(base = %self.path.display(), %format, "adapting base config");
        Ok(ProviderResult::Found(self.adapt(format)))
    }
}
