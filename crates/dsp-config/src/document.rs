//! DSP engine configuration document.
//!
//! The document is kept as a loosely typed YAML tree so that everything this
//! crate does not understand survives a load/serialize cycle unchanged. The
//! handful of fields the providers touch are reached through typed accessors.

use std::path::Path;

use serde_yaml::{Mapping, Value};
use thiserror::Error;

use crate::format::SampleFormat;

const DEVICES: &str = "devices";
const SAMPLERATE: &str = "samplerate";
const CAPTURE_SAMPLERATE: &str = "capture_samplerate";
const RESAMPLER: &str = "resampler";
const RESAMPLER_TYPE: &str = "type";
const CAPTURE: &str = "capture";
const CAPTURE_FORMAT: &str = "format";

const SYNCHRONOUS: &str = "Synchronous";

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("config is not valid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("config root must be a mapping")]
    NotAMapping,
}

/// Resampler declared in the `devices` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResamplerKind {
    Synchronous,
    /// Any asynchronous or unrecognised resampler, by its declared type.
    Other(String),
}

/// A parsed DSP engine configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigDocument {
    root: Mapping,
}

impl ConfigDocument {
    /// Parse a document from YAML text.
    pub fn from_yaml(text: &str) -> Result<Self, DocumentError> {
        match serde_yaml::from_str::<Value>(text)? {
            Value::Mapping(root) => Ok(Self { root }),
            _ => Err(DocumentError::NotAMapping),
        }
    }

    /// Serialize the document back to YAML.
    pub fn to_yaml(&self) -> Result<String, DocumentError> {
        Ok(serde_yaml::to_string(&self.root)?)
    }

    pub fn samplerate(&self) -> Option<u32> {
        self.devices()
            .and_then(|d| d.get(SAMPLERATE))
            .and_then(as_rate)
    }

    pub fn set_samplerate(&mut self, rate: u32) {
        self.set_device_field(SAMPLERATE, Value::Number(u64::from(rate).into()));
    }

    pub fn capture_samplerate(&self) -> Option<u32> {
        self.devices()
            .and_then(|d| d.get(CAPTURE_SAMPLERATE))
            .and_then(as_rate)
    }

    pub fn set_capture_samplerate(&mut self, rate: u32) {
        self.set_device_field(CAPTURE_SAMPLERATE, Value::Number(u64::from(rate).into()));
    }

    /// Declared resampler, or `None` when the section is absent or null.
    pub fn resampler_kind(&self) -> Option<ResamplerKind> {
        let resampler = self.devices()?.get(RESAMPLER)?;
        if resampler.is_null() {
            return None;
        }
        let kind = resampler
            .get(RESAMPLER_TYPE)
            .and_then(Value::as_str)
            .unwrap_or_default();
        if kind == SYNCHRONOUS {
            Some(ResamplerKind::Synchronous)
        } else {
            Some(ResamplerKind::Other(kind.to_string()))
        }
    }

    /// Drop the resampler section, disabling resampling.
    pub fn remove_resampler(&mut self) {
        if let Some(devices) = self.root.get_mut(DEVICES).and_then(Value::as_mapping_mut) {
            devices.shift_remove(RESAMPLER);
        }
    }

    /// `devices.capture.format`, if the document declares it.
    pub fn capture_format(&self) -> Option<&str> {
        self.devices()?
            .get(CAPTURE)?
            .get(CAPTURE_FORMAT)
            .and_then(Value::as_str)
    }

    /// Overwrite `devices.capture.format`.
    ///
    /// Returns `false` without touching the document when the field is not
    /// already present.
    pub fn set_capture_format(&mut self, format: SampleFormat) -> bool {
        let Some(capture) = self
            .root
            .get_mut(DEVICES)
            .and_then(|d| d.get_mut(CAPTURE))
            .and_then(Value::as_mapping_mut)
        else {
            return false;
        };
        match capture.get_mut(CAPTURE_FORMAT) {
            Some(slot) => {
                *slot = Value::String(format.as_config_str().to_string());
                true
            }
            None => false,
        }
    }

    fn devices(&self) -> Option<&Value> {
        self.root.get(DEVICES).filter(|d| d.is_mapping())
    }

    /// Set `devices.<name>`, creating the section (or replacing a scalar one).
    fn set_device_field(&mut self, name: &str, value: Value) {
        let devices = self
            .root
            .entry(key(DEVICES))
            .or_insert(Value::Mapping(Mapping::new()));
        if !devices.is_mapping() {
            *devices = Value::Mapping(Mapping::new());
        }
        if let Some(devices) = devices.as_mapping_mut() {
            devices.insert(key(name), value);
        }
    }
}

/// Read and parse a document from disk.
pub fn load(path: &Path) -> Result<ConfigDocument, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    ConfigDocument::from_yaml(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config {path:?}: {source}")]
    Io {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
    #[error("parse config {path:?}: {source}")]
    Parse {
        path: std::path::PathBuf,
        source: DocumentError,
    },
}

fn key(name: &str) -> Value {
    Value::String(name.to_string())
}

fn as_rate(value: &Value) -> Option<u32> {
    value.as_u64().and_then(|v| u32::try_from(v).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "\
title: living room
devices:
  samplerate: 96000
  chunksize: 4096
  resampler:
    type: Synchronous
  capture:
    type: Alsa
    channels: 2
    device: hw:Loopback,1,0
    format: S32LE
  playback:
    type: Alsa
    channels: 2
    device: hw:DAC
    format: S32LE
filters: {}
";

    #[test]
    fn reads_typed_fields() {
        let doc = ConfigDocument::from_yaml(BASE).unwrap();
        assert_eq!(doc.samplerate(), Some(96_000));
        assert_eq!(doc.capture_samplerate(), None);
        assert_eq!(doc.resampler_kind(), Some(ResamplerKind::Synchronous));
        assert_eq!(doc.capture_format(), Some("S32LE"));
    }

    #[test]
    fn rejects_non_mapping_root() {
        assert!(matches!(
            ConfigDocument::from_yaml("- a\n- b\n"),
            Err(DocumentError::NotAMapping)
        ));
        assert!(matches!(
            ConfigDocument::from_yaml("devices: [unclosed"),
            Err(DocumentError::Yaml(_))
        ));
    }

    #[test]
    fn null_resampler_counts_as_absent() {
        let doc = ConfigDocument::from_yaml("devices:\n  samplerate: 48000\n  resampler: null\n")
            .unwrap();
        assert_eq!(doc.resampler_kind(), None);
    }

    #[test]
    fn async_resampler_reports_its_type() {
        let doc = ConfigDocument::from_yaml(
            "devices:\n  samplerate: 48000\n  resampler:\n    type: AsyncSinc\n",
        )
        .unwrap();
        assert_eq!(
            doc.resampler_kind(),
            Some(ResamplerKind::Other("AsyncSinc".to_string()))
        );
    }

    #[test]
    fn remove_resampler_keeps_key_order() {
        let mut doc = ConfigDocument::from_yaml(BASE).unwrap();
        doc.remove_resampler();
        assert_eq!(doc.resampler_kind(), None);
        let yaml = doc.to_yaml().unwrap();
        let chunk = yaml.find("chunksize").unwrap();
        let capture = yaml.find("capture:").unwrap();
        let playback = yaml.find("playback:").unwrap();
        assert!(chunk < capture && capture < playback);
        assert!(yaml.contains("title: living room"));
    }

    #[test]
    fn set_capture_format_only_overwrites_existing_field() {
        let mut doc = ConfigDocument::from_yaml(BASE).unwrap();
        assert!(doc.set_capture_format(SampleFormat::S16Le));
        assert_eq!(doc.capture_format(), Some("S16LE"));

        let mut bare =
            ConfigDocument::from_yaml("devices:\n  samplerate: 48000\n  capture:\n    channels: 2\n")
                .unwrap();
        assert!(!bare.set_capture_format(SampleFormat::S16Le));
        assert_eq!(bare.capture_format(), None);
    }

    #[test]
    fn setters_write_rates() {
        let mut doc = ConfigDocument::from_yaml(BASE).unwrap();
        doc.set_samplerate(44_100);
        doc.set_capture_samplerate(48_000);
        assert_eq!(doc.samplerate(), Some(44_100));
        assert_eq!(doc.capture_samplerate(), Some(48_000));
    }

    #[test]
    fn setters_create_or_replace_devices_section() {
        let mut bare = ConfigDocument::from_yaml("filters: {}\n").unwrap();
        bare.set_samplerate(96_000);
        assert_eq!(bare.samplerate(), Some(96_000));

        let mut scalar = ConfigDocument::from_yaml("devices: 5\n").unwrap();
        scalar.set_capture_samplerate(44_100);
        assert_eq!(scalar.capture_samplerate(), Some(44_100));
        assert_eq!(scalar.samplerate(), None);
    }

    #[test]
    fn load_reports_missing_file_as_io() {
        let dir = tempfile::tempdir().unwrap();
        let err = load(&dir.path().join("missing.yml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
