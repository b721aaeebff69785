//! Audio stream format value types.
//!
//! `SampleFormat` uses the DSP engine's configuration spelling so the same
//! value can be rendered into file names and written into config documents.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Sample formats the DSP engine accepts on its capture device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleFormat {
    S16Le,
    S24Le,
    /// 24-bit samples packed in 3 bytes.
    S24Le3,
    S32Le,
    Float32Le,
    Float64Le,
}

impl SampleFormat {
    pub const ALL: [SampleFormat; 6] = [
        SampleFormat::S16Le,
        SampleFormat::S24Le,
        SampleFormat::S24Le3,
        SampleFormat::S32Le,
        SampleFormat::Float32Le,
        SampleFormat::Float64Le,
    ];

    /// Spelling used in configuration documents (e.g. `S32LE`).
    pub fn as_config_str(self) -> &'static str {
        match self {
            SampleFormat::S16Le => "S16LE",
            SampleFormat::S24Le => "S24LE",
            SampleFormat::S24Le3 => "S24LE3",
            SampleFormat::S32Le => "S32LE",
            SampleFormat::Float32Le => "FLOAT32LE",
            SampleFormat::Float64Le => "FLOAT64LE",
        }
    }

    /// Map an ALSA `snd_pcm_format_t` code to a supported format.
    ///
    /// Returns `None` for formats the DSP engine cannot capture.
    pub fn from_alsa_code(code: i64) -> Option<Self> {
        match code {
            2 => Some(SampleFormat::S16Le),
            6 => Some(SampleFormat::S24Le),
            10 => Some(SampleFormat::S32Le),
            14 => Some(SampleFormat::Float32Le),
            16 => Some(SampleFormat::Float64Le),
            32 => Some(SampleFormat::S24Le3),
            _ => None,
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_config_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown sample format: {0}")]
pub struct UnknownSampleFormat(pub String);

impl FromStr for SampleFormat {
    type Err = UnknownSampleFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        SampleFormat::ALL
            .into_iter()
            .find(|f| f.as_config_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownSampleFormat(s.to_string()))
    }
}

/// Negotiated format of a capture stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Format {
    pub sample_rate: u32,
    pub sample_format: SampleFormat,
    pub channels: u16,
}

impl Format {
    pub fn new(sample_rate: u32, sample_format: SampleFormat, channels: u16) -> Self {
        Self {
            sample_rate,
            sample_format,
            channels,
        }
    }

    /// Build a format from raw device readings, rejecting zero rates and channel counts.
    pub fn from_raw(sample_rate: i64, sample_format: SampleFormat, channels: i64) -> Option<Self> {
        let sample_rate = u32::try_from(sample_rate).ok().filter(|r| *r > 0)?;
        let channels = u16::try_from(channels).ok().filter(|c| *c > 0)?;
        Some(Self::new(sample_rate, sample_format, channels))
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} Hz {} {} ch",
            self.sample_rate, self.sample_format, self.channels
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_format_parses_config_spelling_case_insensitive() {
        assert_eq!("S32LE".parse(), Ok(SampleFormat::S32Le));
        assert_eq!("float32le".parse(), Ok(SampleFormat::Float32Le));
        assert_eq!(" S24LE3 ".parse(), Ok(SampleFormat::S24Le3));
        assert!("S32_LE".parse::<SampleFormat>().is_err());
    }

    #[test]
    fn sample_format_maps_alsa_codes() {
        assert_eq!(SampleFormat::from_alsa_code(2), Some(SampleFormat::S16Le));
        assert_eq!(SampleFormat::from_alsa_code(32), Some(SampleFormat::S24Le3));
        assert_eq!(SampleFormat::from_alsa_code(14), Some(SampleFormat::Float32Le));
        assert_eq!(SampleFormat::from_alsa_code(1), None);
    }

    #[test]
    fn format_from_raw_rejects_zero_values() {
        assert!(Format::from_raw(0, SampleFormat::S16Le, 2).is_none());
        assert!(Format::from_raw(44_100, SampleFormat::S16Le, 0).is_none());
        assert!(Format::from_raw(-1, SampleFormat::S16Le, 2).is_none());
        assert_eq!(
            Format::from_raw(44_100, SampleFormat::S16Le, 2),
            Some(Format::new(44_100, SampleFormat::S16Le, 2))
        );
    }

    #[test]
    fn format_display_is_human_readable() {
        let format = Format::new(96_000, SampleFormat::S32Le, 2);
        assert_eq!(format.to_string(), "96000 Hz S32LE 2 ch");
    }
}
