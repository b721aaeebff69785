//! DSP engine apply clients.
//!
//! The engine accepts a complete YAML config over its websocket control
//! port (`{"SetConfig": "<yaml>"}`) and answers with a `SetConfig` result.

use std::io::Write;
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

use dsp_config::ConfigDocument;
use serde_json::{Map, Value};
use thiserror::Error;
use tungstenite::Message;

const IO_TIMEOUT: Duration = Duration::from_secs(5);
const SET_CONFIG: &str = "SetConfig";

#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("serialize config: {0}")]
    Serialize(#[from] dsp_config::DocumentError),
    #[error("connect to DSP engine at {addr}: {reason}")]
    Connect { addr: SocketAddr, reason: String },
    #[error("DSP engine connection failed: {0}")]
    Transport(String),
    #[error("DSP engine rejected config: {0}")]
    Rejected(String),
    #[error("write config: {0}")]
    Output(#[from] std::io::Error),
}

/// Destination for resolved configs.
pub trait ConfigSink {
    /// Push `config` to the engine. On error the previous config stays live.
    fn apply(&mut self, config: ConfigDocument) -> Result<(), ApplyError>;
}

/// Applies configs to a running engine over its websocket control port.
#[derive(Debug, Clone)]
pub struct WebSocketSink {
    addr: SocketAddr,
}

impl WebSocketSink {
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }

    fn connect(&self) -> Result<tungstenite::WebSocket<TcpStream>, ApplyError> {
        let connect_err = |reason: String| ApplyError::Connect {
            addr: self.addr,
            reason,
        };
        let stream = TcpStream::connect_timeout(&self.addr, IO_TIMEOUT)
            .map_err(|e| connect_err(e.to_string()))?;
        stream
            .set_read_timeout(Some(IO_TIMEOUT))
            .and_then(|_| stream.set_write_timeout(Some(IO_TIMEOUT)))
            .map_err(|e| connect_err(e.to_string()))?;
        let url = format!("ws://{}", self.addr);
        let (socket, _response) =
            tungstenite::client(url.as_str(), stream).map_err(|e| connect_err(e.to_string()))?;
        Ok(socket)
    }
}

impl ConfigSink for WebSocketSink {
    fn apply(&mut self, config: ConfigDocument) -> Result<(), ApplyError> {
        let yaml = config.to_yaml()?;
        let mut socket = self.connect()?;
        let request = set_config_request(&yaml);
        socket
            .send(Message::text(request))
            .map_err(|e| ApplyError::Transport(e.to_string()))?;

        let outcome = loop {
            let msg = socket
                .read()
                .map_err(|e| ApplyError::Transport(e.to_string()))?;
            match msg {
                Message::Text(_) => {
                    let text = msg
                        .to_text()
                        .map_err(|e| ApplyError::Transport(e.to_string()))?;
                    if let Some(outcome) = parse_set_config_reply(text) {
                        break outcome;
                    }
                }
                Message::Close(_) => {
                    break Err(ApplyError::Transport(
                        "connection closed before reply".to_string(),
                    ));
                }
                _ => {}
            }
        };
        let _ = socket.close(None);
        outcome
    }
}

/// Writes the config to stdout instead of applying it (`--dry-run`).
pub struct DryRunSink<W> {
    out: W,
}

impl<W: Write> DryRunSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> ConfigSink for DryRunSink<W> {
    fn apply(&mut self, config: ConfigDocument) -> Result<(), ApplyError> {
        let yaml = config.to_yaml()?;
        tracing::info!("dry run, config not applied");
        writeln!(self.out, "---")?;
        self.out.write_all(yaml.as_bytes())?;
        self.out.flush()?;
        Ok(())
    }
}

/// Either apply client, chosen at startup.
pub enum Sink {
    WebSocket(WebSocketSink),
    DryRun(DryRunSink<std::io::Stdout>),
}

impl ConfigSink for Sink {
    fn apply(&mut self, config: ConfigDocument) -> Result<(), ApplyError> {
        match self {
            Sink::WebSocket(sink) => sink.apply(config),
            Sink::DryRun(sink) => sink.apply(config),
        }
    }
}

fn set_config_request(yaml: &str) -> String {
    let mut request = Map::new();
    request.insert(SET_CONFIG.to_string(), Value::String(yaml.to_string()));
    Value::Object(request).to_string()
}

/// Interpret one engine message; `None` if it is not a `SetConfig` reply.
fn parse_set_config_reply(text: &str) -> Option<Result<(), ApplyError>> {
    let value: Value = serde_json::from_str(text).ok()?;
    let reply = value.get(SET_CONFIG)?;
    match reply.get("result").and_then(Value::as_str) {
        Some("Ok") => Some(Ok(())),
        Some(other) => {
            let detail = reply
                .get("value")
                .filter(|v| !v.is_null())
                .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
                .unwrap_or_else(|| other.to_string());
            Some(Err(ApplyError::Rejected(detail)))
        }
        None => Some(Err(ApplyError::Rejected(format!(
            "malformed reply: {text}"
        )))),
    }
}
