//! CoreAudio nominal sample rate listener for macOS.

use std::ffi::c_void;
use std::ptr::NonNull;

use coreaudio::audio_unit::macos_helpers::get_device_id_from_name;
use cpal::traits::DeviceTrait;
use crossbeam_channel::{Receiver, Sender};
use dsp_config::Format;
use objc2_core_audio::{
    AudioDeviceID, AudioObjectAddPropertyListener, AudioObjectGetPropertyData, AudioObjectID,
    AudioObjectPropertyAddress, AudioObjectPropertySelector, AudioObjectRemovePropertyListener,
    kAudioDevicePropertyNominalSampleRate, kAudioObjectPropertyElementMaster,
    kAudioObjectPropertyScopeGlobal,
};

use super::{
    FormatProbe, ListenerError, ListenerSettings, NotificationEvents, ProbeError, Registration,
};
use crate::device;

pub(crate) struct CoreAudioProbe {
    device_id: AudioDeviceID,
    device: cpal::Device,
}

impl FormatProbe for CoreAudioProbe {
    fn read_format(&mut self) -> Result<Option<Format>, ProbeError> {
        let rate = nominal_rate(self.device_id)?;
        let config = self
            .device
            .default_input_config()
            .map_err(|e| ProbeError::new(format!("input config: {e}")))?;
        let sample_format = device::sample_format_from_cpal(config.sample_format())
            .ok_or_else(|| {
                ProbeError::new(format!("unsupported sample format {:?}", config.sample_format()))
            })?;
        Format::from_raw(i64::from(rate), sample_format, i64::from(config.channels()))
            .map(Some)
            .ok_or_else(|| ProbeError::new(format!("implausible format at {rate} Hz")))
    }
}

/// Resolve `name` the way `--list-devices` shows it, then find its HAL id.
///
/// cpal matches a case-insensitive substring; CoreAudio needs the exact name,
/// so the id is looked up with the name cpal reports for the chosen device.
fn resolve_device(name: &str) -> Result<(cpal::Device, AudioDeviceID), ListenerError> {
    let cpal_device = device::pick_input_device(&cpal::default_host(), name)
        .map_err(|e| ListenerError::not_found(name, e))?;
    let exact = cpal_device
        .description()
        .map(|desc| desc.name().to_string())
        .map_err(|e| ListenerError::not_found(name, format!("device description: {e}")))?;
    let device_id = get_device_id_from_name(&exact, true).ok_or_else(|| {
        ListenerError::not_found(name, format!("no CoreAudio input device named `{exact}`"))
    })?;
    Ok((cpal_device, device_id))
}

/// Register for rate changes on `name` and wrap the ticks in an event stream.
pub(crate) fn start(
    name: &str,
    settings: ListenerSettings,
    shutdown: Receiver<()>,
) -> Result<NotificationEvents<CoreAudioProbe>, ListenerError> {
    let (cpal_device, device_id) = resolve_device(name)?;

    let (tick_tx, tick_rx) = crossbeam_channel::bounded(1);
    // Queue one tick so the current format is reported immediately.
    let _ = tick_tx.try_send(());

    let client = Box::into_raw(Box::new(tick_tx));
    let address = rate_address();
    let status = unsafe {
        AudioObjectAddPropertyListener(
            device_id,
            NonNull::from(&address),
            Some(on_rate_changed),
            client.cast(),
        )
    };
    if status != 0 {
        drop(unsafe { Box::from_raw(client) });
        return Err(ListenerError::not_found(
            name,
            format!("property listener registration failed (status {status})"),
        ));
    }
    tracing::debug!(device = name, device_id, "registered sample rate listener");

    let client_addr = client as usize;
    let registration = Registration::new(move || {
        let client = client_addr as *mut Sender<()>;
        let address = rate_address();
        let status = unsafe {
            AudioObjectRemovePropertyListener(
                device_id,
                NonNull::from(&address),
                Some(on_rate_changed),
                client.cast(),
            )
        };
        if status != 0 {
            tracing::warn!(device_id, status, "failed to remove sample rate listener");
        }
        drop(unsafe { Box::from_raw(client) });
    });

    let probe = CoreAudioProbe {
        device_id,
        device: cpal_device,
    };
    Ok(NotificationEvents::new(
        tick_rx,
        probe,
        settings,
        shutdown,
        registration,
    ))
}

unsafe extern "C-unwind" fn on_rate_changed(
    _object_id: AudioObjectID,
    _number_addresses: u32,
    _addresses: NonNull<AudioObjectPropertyAddress>,
    client_data: *mut c_void,
) -> i32 {
    let tick_tx = unsafe { &*(client_data as *const Sender<()>) };
    // Full means a read is already pending.
    let _ = tick_tx.try_send(());
    0
}

fn rate_address() -> AudioObjectPropertyAddress {
    AudioObjectPropertyAddress {
        mSelector: kAudioDevicePropertyNominalSampleRate as AudioObjectPropertySelector,
        mScope: kAudioObjectPropertyScopeGlobal,
        mElement: kAudioObjectPropertyElementMaster,
    }
}

/// Current nominal sample rate of the device, in whole Hz.
fn nominal_rate(device_id: AudioDeviceID) -> Result<u32, ProbeError> {
    let address = rate_address();
    let mut rate: f64 = 0.0;
    // In/out: CoreAudio writes back the number of bytes it filled.
    let mut data_size = std::mem::size_of::<f64>() as u32;
    let status = unsafe {
        AudioObjectGetPropertyData(
            device_id,
            NonNull::from(&address),
            0,
            std::ptr::null(),
            NonNull::from(&mut data_size),
            NonNull::from(&mut rate).cast(),
        )
    };
    if status != 0 {
        return Err(ProbeError::new(format!(
            "nominal sample rate unavailable (status {status})"
        )));
    }
    if data_size as usize != std::mem::size_of::<f64>() || !rate.is_finite() || rate < 1.0 {
        return Err(ProbeError::new(format!("implausible nominal sample rate {rate}")));
    }
    Ok(rate.round() as u32)
}
