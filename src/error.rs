//! Error taxonomy for the control plane.
use serde::Serialize;
use thiserror::Error;

/// JSON-RPC error facility: which subsystem an error originated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Facility {
    Mpd,
    Playlist,
    Queue,
    Session,
    Database,
    General,
}

/// JSON-RPC error severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warn,
    Error,
}

/// A JSON-RPC error response body, `{facility, severity, message, data?}`.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcError {
    pub facility: Facility,
    pub severity: Severity,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl JsonRpcError {
    pub fn new(facility: Facility, severity: Severity, message: impl Into<String>) -> Self {
        JsonRpcError {
            facility,
            severity,
            message: message.into(),
            data: None,
        }
    }

    pub fn not_found(facility: Facility, message: impl Into<String>) -> Self {
        Self::new(facility, Severity::Warn, message)
    }
}

/// Transport/connection level error returned by the MPD wrapper (C3).
///
/// Wrapper functions never panic and never throw: every fallible call
/// returns a `Result` the caller must check and classify.
#[derive(Error, Debug)]
pub enum MpdError {
    #[error("cannot connect to MPD at {host}:{port}: {source}")]
    Connect {
        host: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },
    #[error("lost connection to MPD: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed response from MPD: {0}")]
    Protocol(String),
    #[error("MPD refused command: {0}")]
    Ack(MpdAck),
    #[error("MPD server version is too old (< 0.21.0)")]
    TooOld,
}

impl MpdError {
    /// Classifies the error as fatal-to-the-connection (requires reconnect)
    /// vs. a protocol-version error (requires shutdown) vs. transient.
    pub fn is_fatal_to_connection(&self) -> bool {
        !matches!(self, MpdError::Ack(_))
    }

    pub fn is_protocol_version_error(&self) -> bool {
        matches!(self, MpdError::TooOld)
    }
}

/// Decoded `ACK [code@index] {command} message` line from MPD.
#[derive(Debug, Clone)]
pub struct MpdAck {
    pub code: usize,
    pub command_list_index: usize,
    pub current_command: String,
    pub message: String,
}

impl std::fmt::Display for MpdAck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}@{}] {{{}}} {}",
            self.code, self.command_list_index, self.current_command, self.message
        )
    }
}

/// Top level application error used by the HTTP boundary and main.
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Mpd(#[from] MpdError),
    #[error("invalid client request: {0}")]
    ClientRequest(String),
    #[error("resource error: {0}")]
    Resource(String),
    #[error("not found: {0}")]
    NotFound(String),
}

impl AppError {
    pub fn to_jsonrpc(&self) -> JsonRpcError {
        match self {
            AppError::Mpd(e) => JsonRpcError::new(Facility::Mpd, Severity::Error, e.to_string()),
            AppError::ClientRequest(m) => {
                JsonRpcError::new(Facility::General, Severity::Error, m.clone())
            }
            AppError::Resource(m) => {
                JsonRpcError::new(Facility::General, Severity::Error, m.clone())
            }
            AppError::NotFound(m) => JsonRpcError::new(Facility::General, Severity::Warn, m.clone()),
        }
    }
}
