//! Capture device listeners.
//!
//! A listener turns a platform device into an endless, blocking sequence of
//! `ListenerEvent`s, one per observed format change. Two mechanisms exist:
//! - polling (ALSA loopback controls), read synchronously inside `next()`;
//! - notification (CoreAudio property listeners), where the platform callback
//!   only queues a tick and the format is read when the tick is consumed.
//!
//! Both read the format at consumption time, so a stale format is never
//! delivered after a newer one was observed.

#[cfg(target_os = "linux")]
mod alsa_ctl;
#[cfg(target_os = "macos")]
mod coreaudio_hal;

use std::time::{Duration, SystemTime};

use crossbeam_channel::{Receiver, RecvTimeoutError};
use dsp_config::Format;
use serde::Deserialize;
use thiserror::Error;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);
const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(50);

/// A detected format change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerEvent {
    pub format: Format,
    pub timestamp: SystemTime,
}

impl ListenerEvent {
    pub fn now(format: Format) -> Self {
        Self {
            format,
            timestamp: SystemTime::now(),
        }
    }
}

/// Platform mechanism used to watch the device.
#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListenerKind {
    /// Poll ALSA loopback controls (Linux).
    Alsa,
    /// Subscribe to CoreAudio device property changes (macOS).
    Coreaudio,
}

impl ListenerKind {
    pub fn platform_default() -> Self {
        if cfg!(target_os = "macos") {
            ListenerKind::Coreaudio
        } else {
            ListenerKind::Alsa
        }
    }
}

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("capture device `{device}` not found: {reason}")]
    DeviceNotFound { device: String, reason: String },
    #[error("{0:?} listener is not available on this platform")]
    Unsupported(ListenerKind),
}

impl ListenerError {
    pub(crate) fn not_found(device: &str, reason: impl ToString) -> Self {
        ListenerError::DeviceNotFound {
            device: device.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Transient failure reading the device; the listener retries.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ProbeError(String);

impl ProbeError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Reads the currently negotiated format of a device.
pub trait FormatProbe {
    /// `Ok(None)` while the device is idle.
    fn read_format(&mut self) -> Result<Option<Format>, ProbeError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerSettings {
    pub poll_interval: Duration,
    pub debounce: Duration,
}

impl Default for ListenerSettings {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            debounce: DEFAULT_DEBOUNCE,
        }
    }
}

/// Start listening on `device`.
///
/// Fails fast if the device cannot be found. The returned stream ends only
/// when `shutdown` receives a message or is disconnected.
pub fn start(
    kind: ListenerKind,
    device: &str,
    settings: ListenerSettings,
    shutdown: Receiver<()>,
) -> Result<EventStream, ListenerError> {
    tracing::info!(?kind, device, "starting device listener");
    match kind {
        ListenerKind::Alsa => start_alsa(device, settings, shutdown),
        ListenerKind::Coreaudio => start_coreaudio(device, settings, shutdown),
    }
}

#[cfg(target_os = "linux")]
fn start_alsa(
    device: &str,
    settings: ListenerSettings,
    shutdown: Receiver<()>,
) -> Result<EventStream, ListenerError> {
    let probe = alsa_ctl::AlsaProbe::open(device)?;
    Ok(EventStream::Alsa(PollingEvents::new(probe, settings, shutdown)))
}

#[cfg(not(target_os = "linux"))]
fn start_alsa(
    _device: &str,
    _settings: ListenerSettings,
    _shutdown: Receiver<()>,
) -> Result<EventStream, ListenerError> {
    Err(ListenerError::Unsupported(ListenerKind::Alsa))
}

#[cfg(target_os = "macos")]
fn start_coreaudio(
    device: &str,
    settings: ListenerSettings,
    shutdown: Receiver<()>,
) -> Result<EventStream, ListenerError> {
    coreaudio_hal::start(device, settings, shutdown).map(EventStream::CoreAudio)
}

#[cfg(not(target_os = "macos"))]
fn start_coreaudio(
    _device: &str,
    _settings: ListenerSettings,
    _shutdown: Receiver<()>,
) -> Result<EventStream, ListenerError> {
    Err(ListenerError::Unsupported(ListenerKind::Coreaudio))
}

/// Event sequence for the listener compiled into this build.
pub enum EventStream {
    #[cfg(target_os = "linux")]
    Alsa(PollingEvents<alsa_ctl::AlsaProbe>),
    #[cfg(target_os = "macos")]
    CoreAudio(NotificationEvents<coreaudio_hal::CoreAudioProbe>),
}

impl Iterator for EventStream {
    type Item = ListenerEvent;

    fn next(&mut self) -> Option<ListenerEvent> {
        match self {
            #[cfg(target_os = "linux")]
            EventStream::Alsa(events) => events.next(),
            #[cfg(target_os = "macos")]
            EventStream::CoreAudio(events) => events.next(),
        }
    }
}

/// Suppresses repeats of the last emitted format.
#[derive(Debug, Default)]
struct ChangeFilter {
    last: Option<Format>,
}

impl ChangeFilter {
    fn is_new(&self, format: &Format) -> bool {
        self.last.as_ref() != Some(format)
    }

    fn accept(&mut self, format: Format) -> Option<ListenerEvent> {
        if !self.is_new(&format) {
            return None;
        }
        self.last = Some(format);
        Some(ListenerEvent::now(format))
    }
}

/// Logs the first failure of a run of transient errors and the recovery.
#[derive(Debug, Default)]
struct FailureLog {
    failing: bool,
}

impl FailureLog {
    fn read<P: FormatProbe>(&mut self, probe: &mut P) -> Option<Format> {
        match probe.read_format() {
            Ok(format) => {
                if self.failing {
                    tracing::info!("device readable again");
                    self.failing = false;
                }
                format
            }
            Err(err) => {
                if self.failing {
                    tracing::debug!(error = %err, "device read still failing");
                } else {
                    tracing::warn!(error = %err, "device read failed, will retry");
                    self.failing = true;
                }
                None
            }
        }
    }
}

/// Returns true when shutdown was requested within `timeout`.
fn stop_requested(shutdown: &Receiver<()>, timeout: Duration) -> bool {
    !matches!(shutdown.recv_timeout(timeout), Err(RecvTimeoutError::Timeout))
}

/// Polling listener: reads the probe every `poll_interval`.
pub struct PollingEvents<P> {
    probe: P,
    settings: ListenerSettings,
    shutdown: Receiver<()>,
    filter: ChangeFilter,
    failures: FailureLog,
    stopped: bool,
}

impl<P: FormatProbe> PollingEvents<P> {
    pub fn new(probe: P, settings: ListenerSettings, shutdown: Receiver<()>) -> Self {
        Self {
            probe,
            settings,
            shutdown,
            filter: ChangeFilter::default(),
            failures: FailureLog::default(),
            stopped: false,
        }
    }

    fn stop(&mut self) -> Option<ListenerEvent> {
        self.stopped = true;
        tracing::debug!("polling listener stopped");
        None
    }
}

impl<P: FormatProbe> Iterator for PollingEvents<P> {
    type Item = ListenerEvent;

    fn next(&mut self) -> Option<ListenerEvent> {
        if self.stopped || stop_requested(&self.shutdown, Duration::ZERO) {
            return self.stop();
        }
        loop {
            if let Some(seen) = self.failures.read(&mut self.probe) {
                if self.filter.is_new(&seen) {
                    let settled = if self.settings.debounce.is_zero() {
                        Some(seen)
                    } else if stop_requested(&self.shutdown, self.settings.debounce) {
                        return self.stop();
                    } else {
                        self.failures.read(&mut self.probe)
                    };
                    if let Some(event) = settled.and_then(|f| self.filter.accept(f)) {
                        tracing::debug!(format = %event.format, "polled format change");
                        return Some(event);
                    }
                }
            }
            if stop_requested(&self.shutdown, self.settings.poll_interval) {
                return self.stop();
            }
        }
    }
}

/// Releases a platform registration when dropped.
pub struct Registration {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl Registration {
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

/// Notification listener: waits for platform ticks, then reads the probe.
///
/// Ticks arrive on a `bounded(1)` channel; a full channel means a read is
/// already pending, so bursts of callbacks coalesce into one read.
pub struct NotificationEvents<P> {
    registration: Registration,
    ticks: Receiver<()>,
    probe: P,
    settings: ListenerSettings,
    shutdown: Receiver<()>,
    filter: ChangeFilter,
    failures: FailureLog,
    stopped: bool,
}

impl<P: FormatProbe> NotificationEvents<P> {
    pub fn new(
        ticks: Receiver<()>,
        probe: P,
        settings: ListenerSettings,
        shutdown: Receiver<()>,
        registration: Registration,
    ) -> Self {
        Self {
            registration,
            ticks,
            probe,
            settings,
            shutdown,
            filter: ChangeFilter::default(),
            failures: FailureLog::default(),
            stopped: false,
        }
    }

    fn stop(&mut self) -> Option<ListenerEvent> {
        self.stopped = true;
        // Release the platform callback as soon as the stream ends.
        if let Some(release) = self.registration.release.take() {
            release();
        }
        tracing::debug!("notification listener stopped");
        None
    }
}

impl<P: FormatProbe> Iterator for NotificationEvents<P> {
    type Item = ListenerEvent;

    fn next(&mut self) -> Option<ListenerEvent> {
        if self.stopped {
            return None;
        }
        loop {
            crossbeam_channel::select! {
                recv(self.ticks) -> tick => {
                    if tick.is_err() {
                        return self.stop();
                    }
                }
                recv(self.shutdown) -> _ => return self.stop(),
            }
            if !self.settings.debounce.is_zero() {
                if stop_requested(&self.shutdown, self.settings.debounce) {
                    return self.stop();
                }
                while self.ticks.try_recv().is_ok() {}
            }
            if let Some(event) = self
                .failures
                .read(&mut self.probe)
                .and_then(|f| self.filter.accept(f))
            {
                tracing::debug!(format = %event.format, "notified format change");
                return Some(event);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dsp_config::SampleFormat;
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    type Reading = Result<Option<Format>, ProbeError>;

    /// Replays readings; repeats the last one once the script runs out.
    struct ScriptedProbe {
        script: VecDeque<Reading>,
        last: Option<Format>,
        reads: Arc<AtomicUsize>,
    }

    impl ScriptedProbe {
        fn new(script: Vec<Reading>) -> Self {
            Self {
                script: script.into(),
                last: None,
                reads: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl FormatProbe for ScriptedProbe {
        fn read_format(&mut self) -> Reading {
            self.reads.fetch_add(1, Ordering::SeqCst);
            match self.script.pop_front() {
                Some(Ok(format)) => {
                    self.last = format;
                    Ok(format)
                }
                Some(Err(err)) => Err(err),
                None => Ok(self.last),
            }
        }
    }

    fn fmt(rate: u32) -> Format {
        Format::new(rate, SampleFormat::S32Le, 2)
    }

    fn fast() -> ListenerSettings {
        ListenerSettings {
            poll_interval: Duration::ZERO,
            debounce: Duration::ZERO,
        }
    }

    fn rates(events: impl Iterator<Item = ListenerEvent>) -> Vec<u32> {
        events.map(|e| e.format.sample_rate).collect()
    }

    #[test]
    fn polling_emits_only_changes() {
        let probe = ScriptedProbe::new(vec![
            Ok(Some(fmt(44_100))),
            Ok(Some(fmt(44_100))),
            Ok(Some(fmt(48_000))),
            Ok(Some(fmt(48_000))),
            Ok(Some(fmt(44_100))),
        ]);
        let events = PollingEvents::new(probe, fast(), crossbeam_channel::never());
        assert_eq!(rates(events.take(3)), vec![44_100, 48_000, 44_100]);
    }

    #[test]
    fn polling_skips_idle_device_and_transient_errors() {
        let probe = ScriptedProbe::new(vec![
            Ok(None),
            Err(ProbeError::new("control read failed")),
            Ok(None),
            Ok(Some(fmt(96_000))),
            Err(ProbeError::new("gone")),
            Ok(Some(fmt(96_000))),
            Ok(Some(fmt(88_200))),
        ]);
        let events = PollingEvents::new(probe, fast(), crossbeam_channel::never());
        assert_eq!(rates(events.take(2)), vec![96_000, 88_200]);
    }

    #[test]
    fn polling_debounce_emits_settled_format() {
        let probe = ScriptedProbe::new(vec![
            Ok(Some(fmt(44_100))),
            Ok(Some(fmt(48_000))),
            Ok(Some(fmt(48_000))),
        ]);
        let settings = ListenerSettings {
            poll_interval: Duration::ZERO,
            debounce: Duration::from_millis(1),
        };
        let mut events = PollingEvents::new(probe, settings, crossbeam_channel::never());
        assert_eq!(events.next().map(|e| e.format), Some(fmt(48_000)));
    }

    #[test]
    fn polling_debounce_drops_change_that_went_idle() {
        let probe = ScriptedProbe::new(vec![
            Ok(Some(fmt(44_100))),
            Ok(None),
            Ok(Some(fmt(48_000))),
            Ok(Some(fmt(48_000))),
        ]);
        let settings = ListenerSettings {
            poll_interval: Duration::ZERO,
            debounce: Duration::from_millis(1),
        };
        let mut events = PollingEvents::new(probe, settings, crossbeam_channel::never());
        assert_eq!(events.next().map(|e| e.format), Some(fmt(48_000)));
    }

    #[test]
    fn polling_stops_on_shutdown() {
        let probe = ScriptedProbe::new(vec![Ok(Some(fmt(44_100)))]);
        let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);
        let mut events = PollingEvents::new(probe, fast(), stop_rx);
        assert!(events.next().is_some());
        stop_tx.send(()).unwrap();
        assert!(events.next().is_none());
        assert!(events.next().is_none());
    }

    #[test]
    fn notification_reads_once_per_coalesced_tick() {
        let (tick_tx, tick_rx) = crossbeam_channel::bounded(1);
        let probe = ScriptedProbe::new(vec![Ok(Some(fmt(44_100))), Ok(Some(fmt(48_000)))]);
        let reads = probe.reads.clone();
        let mut events = NotificationEvents::new(
            tick_rx,
            probe,
            fast(),
            crossbeam_channel::never(),
            Registration::new(|| {}),
        );

        assert!(tick_tx.try_send(()).is_ok());
        assert!(tick_tx.try_send(()).is_err());
        assert_eq!(events.next().map(|e| e.format), Some(fmt(44_100)));
        assert_eq!(reads.load(Ordering::SeqCst), 1);

        tick_tx.try_send(()).unwrap();
        assert_eq!(events.next().map(|e| e.format), Some(fmt(48_000)));
        assert_eq!(reads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn notification_ignores_ticks_without_change() {
        let (tick_tx, tick_rx) = crossbeam_channel::bounded(1);
        let probe = ScriptedProbe::new(vec![
            Ok(Some(fmt(44_100))),
            Ok(Some(fmt(44_100))),
            Err(ProbeError::new("device vanished")),
            Ok(Some(fmt(96_000))),
        ]);
        let events = NotificationEvents::new(
            tick_rx,
            probe,
            fast(),
            crossbeam_channel::never(),
            Registration::new(|| {}),
        );
        let feeder = std::thread::spawn(move || {
            for _ in 0..4 {
                if tick_tx.send(()).is_err() {
                    break;
                }
            }
        });
        assert_eq!(rates(events.take(2)), vec![44_100, 96_000]);
        feeder.join().unwrap();
    }

    #[test]
    fn notification_releases_registration_when_stopped() {
        let released = Arc::new(AtomicBool::new(false));
        let flag = released.clone();
        let (tick_tx, tick_rx) = crossbeam_channel::bounded(1);
        let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);
        let mut events = NotificationEvents::new(
            tick_rx,
            ScriptedProbe::new(vec![Ok(Some(fmt(44_100)))]),
            fast(),
            stop_rx,
            Registration::new(move || flag.store(true, Ordering::SeqCst)),
        );
        stop_tx.send(()).unwrap();
        assert!(events.next().is_none());
        assert!(released.load(Ordering::SeqCst));
        drop(tick_tx);
    }

    fn settle(debounce_ms: u64) -> ListenerSettings {
        ListenerSettings {
            poll_interval: Duration::ZERO,
            debounce: Duration::from_millis(debounce_ms),
        }
    }

    #[test]
    fn notification_debounce_absorbs_ticks_in_window() {
        let (tick_tx, tick_rx) = crossbeam_channel::bounded(1);
        let probe = ScriptedProbe::new(vec![Ok(Some(fmt(48_000)))]);
        let reads = probe.reads.clone();
        let mut events = NotificationEvents::new(
            tick_rx,
            probe,
            settle(200),
            crossbeam_channel::never(),
            Registration::new(|| {}),
        );

        tick_tx.try_send(()).unwrap();
        // Blocks until the first tick is taken, so this one lands in the window.
        let late = {
            let tick_tx = tick_tx.clone();
            std::thread::spawn(move || tick_tx.send(()).unwrap())
        };
        assert_eq!(events.next().map(|e| e.format), Some(fmt(48_000)));
        late.join().unwrap();

        assert_eq!(reads.load(Ordering::SeqCst), 1);
        // Nothing left pending after the drain.
        assert!(tick_tx.try_send(()).is_ok());
    }

    #[test]
    fn notification_shutdown_during_debounce_stops_and_releases() {
        let released = Arc::new(AtomicBool::new(false));
        let flag = released.clone();
        let (tick_tx, tick_rx) = crossbeam_channel::bounded(1);
        let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);
        let probe = ScriptedProbe::new(vec![Ok(Some(fmt(44_100)))]);
        let reads = probe.reads.clone();
        let mut events = NotificationEvents::new(
            tick_rx,
            probe,
            settle(10_000),
            stop_rx,
            Registration::new(move || flag.store(true, Ordering::SeqCst)),
        );

        tick_tx.try_send(()).unwrap();
        let stopper = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            stop_tx.send(()).unwrap();
        });
        let started = std::time::Instant::now();
        assert!(events.next().is_none());
        assert!(started.elapsed() < Duration::from_secs(5));
        stopper.join().unwrap();

        assert!(released.load(Ordering::SeqCst));
        assert_eq!(reads.load(Ordering::SeqCst), 0);
        assert!(events.next().is_none());
    }

    #[test]
    fn notification_read_error_after_debounce_emits_nothing() {
        let (tick_tx, tick_rx) = crossbeam_channel::bounded(1);
        let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);
        let probe = ScriptedProbe::new(vec![
            Err(ProbeError::new("device busy")),
            Ok(Some(fmt(96_000))),
        ]);
        let reads = probe.reads.clone();
        let mut events = NotificationEvents::new(
            tick_rx,
            probe,
            settle(10),
            stop_rx,
            Registration::new(|| {}),
        );

        tick_tx.try_send(()).unwrap();
        let stopper = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(200));
            stop_tx.send(()).unwrap();
        });
        assert!(events.next().is_none());
        stopper.join().unwrap();
        assert_eq!(reads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn registration_releases_on_drop() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let registration = Registration::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        drop(registration);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn platform_default_matches_target() {
        let kind = ListenerKind::platform_default();
        if cfg!(target_os = "macos") {
            assert_eq!(kind, ListenerKind::Coreaudio);
        } else {
            assert_eq!(kind, ListenerKind::Alsa);
        }
    }

    #[test]
    fn unsupported_listener_is_reported() {
        let other = if cfg!(target_os = "macos") {
            ListenerKind::Alsa
        } else {
            ListenerKind::Coreaudio
        };
        let result = start(other, "any", fast(), crossbeam_channel::never());
        assert!(matches!(result, Err(ListenerError::Unsupported(kind)) if kind == other));
    }
}
