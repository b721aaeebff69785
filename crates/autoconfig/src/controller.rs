//! Reconfiguration controller.
//!
//! Consumes listener events one at a time: resolve a config for the new
//! format through the provider chain, hand it to the sink, and remember the
//! format once the engine accepted it.

use dsp_config::{ChainError, Format, Provide, Provider, ProviderChain};

use crate::dsp_client::{ApplyError, ConfigSink};
use crate::listener::ListenerEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    Resolving,
    Applying,
    Failed,
}

/// What happened to one event.
#[derive(Debug)]
pub enum Outcome {
    /// Format equals the one already applied; nothing done.
    Unchanged,
    Applied { provider: String },
    NoProviderMatched,
    /// A provider failed (e.g. a malformed config file); no fallback was tried.
    ChainAborted(ChainError),
    ApplyFailed(ApplyError),
}

pub struct Controller<S, P = Provider> {
    chain: ProviderChain<P>,
    sink: S,
    current: Option<Format>,
    state: ControllerState,
}

impl<S: ConfigSink, P: Provide> Controller<S, P> {
    pub fn new(chain: ProviderChain<P>, sink: S) -> Self {
        Self {
            chain,
            sink,
            current: None,
            state: ControllerState::Idle,
        }
    }

    /// Format of the last successfully applied config.
    pub fn current_format(&self) -> Option<Format> {
        self.current
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Process a single event synchronously.
    pub fn handle_event(&mut self, event: &ListenerEvent) -> Outcome {
        let format = event.format;
        if self.current == Some(format) {
            tracing::debug!(%format, "format unchanged, nothing to apply");
            return Outcome::Unchanged;
        }

        self.transition(ControllerState::Resolving);
        let resolution = match self.chain.resolve(&format) {
            Ok(resolution) => resolution,
            Err(ChainError::NoProviderMatched { .. }) => {
                tracing::warn!(%format, previous = ?self.current, "no provider matched, keeping previous config");
                self.fail();
                return Outcome::NoProviderMatched;
            }
            Err(err) => {
                tracing::error!(%format, error = %err, "config resolution aborted, keeping previous config");
                self.fail();
                return Outcome::ChainAborted(err);
            }
        };

        self.transition(ControllerState::Applying);
        match self.sink.apply(resolution.config) {
            Ok(()) => {
                tracing::info!(
                    %format,
                    provider = %resolution.provider,
                    "applied new config"
                );
                self.current = Some(format);
                self.transition(ControllerState::Idle);
                Outcome::Applied {
                    provider: resolution.provider,
                }
            }
            Err(err) => {
                tracing::error!(%format, error = %err, "failed to apply config, keeping previous config");
                self.fail();
                Outcome::ApplyFailed(err)
            }
        }
    }

    /// Consume events until the stream ends.
    pub fn run<I>(&mut self, events: I)
    where
        I: IntoIterator<Item = ListenerEvent>,
    {
        tracing::info!(providers = ?self.chain.names(), "controller waiting for format changes");
        for event in events {
            tracing::debug!(format = %event.format, timestamp = ?event.timestamp, "format change detected");
            let outcome = self.handle_event(&event);
            tracing::trace!(?outcome, state = ?self.state, "event handled");
        }
        tracing::info!("event stream ended, controller stopping");
    }

    fn fail(&mut self) {
        self.transition(ControllerState::Failed);
        self.transition(ControllerState::Idle);
    }

    fn transition(&mut self, next: ControllerState) {
        tracing::trace!(from = ?self.state, to = ?next, "controller state");
        self.state = next;
    }
}
