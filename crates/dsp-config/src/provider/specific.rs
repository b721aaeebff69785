use std::path::PathBuf;

use crate::document::{self, ConfigError};
use crate::format::Format;
use crate::provider::{Provide, ProviderResult};

/// Looks up a hand-written config file per format.
#[derive(Debug, Clone)]
pub struct SpecificProvider {
    template: String,
}

impl SpecificProvider {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    /// Substitute the format fields into the path template.
    pub fn resolve_path(&self, format: &Format) -> PathBuf {
        let rendered = self
            .template
            .replace("{samplerate}", &format.sample_rate.to_string())
            .replace("{sampleformat}", format.sample_format.as_config_str())
            .replace("{channels}", &format.channels.to_string());
        PathBuf::from(rendered)
    }
}

impl Provide for SpecificProvider {
    fn name(&self) -> &str {
        "specific"
    }

    fn provide(&self, format: &Format) -> Result<ProviderResult, ConfigError> {
        let path = self.resolve_path(format);
        if !path.is_file() {
            tracing::debug!(path = %path.display(), "no specific config for format");
            return Ok(ProviderResult::NotFound);
        }
        let doc = document::load(&path)?;
        tracing::info!(path = %path.display(), "loaded specific config");
        Ok(ProviderResult::Found(doc))
    }
}
