//! ALSA loopback control probe.
//!
//! The snd-aloop driver exposes the format negotiated by the playback side
//! as read-only PCM controls on the capture subdevice.

use std::str::FromStr;

use alsa::ctl::ElemIface;
use alsa::hctl::HCtl;
use dsp_config::{Format, SampleFormat};

use super::{FormatProbe, ListenerError, ProbeError};

const LOOPBACK_ACTIVE: &str = "PCM Slave Active";
const LOOPBACK_CHANNELS: &str = "PCM Slave Channels";
const LOOPBACK_FORMAT: &str = "PCM Slave Format";
const LOOPBACK_RATE: &str = "PCM Slave Rate";

const REQUIRED_CONTROLS: [&str; 4] = [
    LOOPBACK_ACTIVE,
    LOOPBACK_CHANNELS,
    LOOPBACK_FORMAT,
    LOOPBACK_RATE,
];

/// `card[,device[,subdevice]]`, e.g. `hw:Loopback,1,0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DeviceAddress {
    pub(crate) card: String,
    pub(crate) device: u32,
    pub(crate) subdevice: u32,
}

impl FromStr for DeviceAddress {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(',').map(str::trim);
        let card = parts
            .next()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| "empty device name".to_string())?;
        let device = parse_index(parts.next(), "device")?;
        let subdevice = parse_index(parts.next(), "subdevice")?;
        if parts.next().is_some() {
            return Err(format!("too many components in `{s}`"));
        }
        Ok(Self {
            card: card.to_string(),
            device,
            subdevice,
        })
    }
}

fn parse_index(part: Option<&str>, what: &str) -> Result<u32, String> {
    match part {
        None => Ok(0),
        Some(v) => v.parse().map_err(|_| format!("invalid {what} number `{v}`")),
    }
}

pub(crate) struct AlsaProbe {
    hctl: HCtl,
    address: DeviceAddress,
}

impl AlsaProbe {
    /// Open the card's control interface and check the loopback controls exist.
    pub(crate) fn open(device: &str) -> Result<Self, ListenerError> {
        let address: DeviceAddress = device
            .parse()
            .map_err(|e: String| ListenerError::not_found(device, e))?;
        let hctl = HCtl::new(&address.card, true)
            .map_err(|e| ListenerError::not_found(device, format!("open {}: {e}", address.card)))?;
        hctl.load()
            .map_err(|e| ListenerError::not_found(device, format!("load controls: {e}")))?;

        let probe = Self { hctl, address };
        for name in REQUIRED_CONTROLS {
            if probe.read_control(name).is_err() {
                return Err(ListenerError::not_found(
                    device,
                    format!("control `{name}` missing, is this a loopback device?"),
                ));
            }
        }
        tracing::debug!(
            card = %probe.address.card,
            device = probe.address.device,
            subdevice = probe.address.subdevice,
            "found loopback controls"
        );
        Ok(probe)
    }

    fn read_control(&self, name: &str) -> Result<i64, ProbeError> {
        for elem in self.hctl.elem_iter() {
            let id = elem
                .get_id()
                .map_err(|e| ProbeError::new(format!("control id: {e}")))?;
            if id.get_interface() != ElemIface::PCM
                || id.get_device() != self.address.device
                || id.get_subdevice() != self.address.subdevice
                || id.get_name().map(|n| n != name).unwrap_or(true)
            {
                continue;
            }
            let value = elem
                .read()
                .map_err(|e| ProbeError::new(format!("read `{name}`: {e}")))?;
            return value
                .get_integer(0)
                .map(i64::from)
                .or_else(|| value.get_boolean(0).map(i64::from))
                .ok_or_else(|| ProbeError::new(format!("`{name}` has no readable value")));
        }
        Err(ProbeError::new(format!("control `{name}` not present")))
    }
}

impl FormatProbe for AlsaProbe {
    fn read_format(&mut self) -> Result<Option<Format>, ProbeError> {
        if self.read_control(LOOPBACK_ACTIVE)? == 0 {
            return Ok(None);
        }
        let rate = self.read_control(LOOPBACK_RATE)?;
        let channels = self.read_control(LOOPBACK_CHANNELS)?;
        let code = self.read_control(LOOPBACK_FORMAT)?;
        let sample_format = SampleFormat::from_alsa_code(code)
            .ok_or_else(|| ProbeError::new(format!("unsupported ALSA sample format code {code}")))?;
        Format::from_raw(rate, sample_format, channels)
            .map(Some)
            .ok_or_else(|| ProbeError::new(format!("implausible format {rate} Hz, {channels} ch")))
    }
}
