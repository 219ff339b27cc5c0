//! Wire contract and client for the privileged agent.
//!
//! Transport is newline-delimited JSON over a Unix domain socket at a
//! single well-known path per installation. Requests are stateless and
//! each carries the authentication token; no session state is shared
//! between requests.
//!
//! Request: `{"token":"<hex>","operation":"set_charge_limit","value":80}`
//! Reply:   `{"reply":"ack","success":true}` or a `status` reply whose
//! unavailable fields are simply omitted.

use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Well-known socket path. One agent instance serves all requests.
pub const DEFAULT_SOCKET_PATH: &str = "/var/run/battctl.sock";
/// Token file written by the agent next to the socket.
pub const DEFAULT_TOKEN_PATH: &str = "/var/run/battctl.token";

const IO_TIMEOUT: Duration = Duration::from_secs(10);

/// The operations the agent performs on behalf of unprivileged
/// callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum Operation {
    SetChargeLimit { value: u8 },
    SetChargingEnabled { value: bool },
    GetStatus,
}

/// One request frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlRequest {
    pub token: String,
    #[serde(flatten)]
    pub operation: Operation,
}

/// One reply frame. Write operations get an `ack`; `get_status` gets a
/// `status` whose fields are individually optional — a partially
/// unreadable status still reports overall success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reply", rename_all = "snake_case")]
pub enum ControlResponse {
    Ack {
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    Status {
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        charge_limit: Option<u8>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        charging_enabled: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        temperature_c: Option<f32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cycle_count: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        charge_percent: Option<u8>,
    },
}

impl ControlResponse {
    pub fn ok() -> Self {
        ControlResponse::Ack {
            success: true,
            message: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ControlResponse::Ack {
            success: false,
            message: Some(message.into()),
        }
    }
}

/// Client-side errors. "Agent not running" is its own variant so
/// callers can surface it as a user-actionable condition distinct from
/// a failed request.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("charge-control agent is not running (no socket at {0})")]
    AgentNotRunning(PathBuf),

    #[error("cannot read agent token at {path}: {source}")]
    Token {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("I/O error talking to the agent: {0}")]
    Io(#[from] std::io::Error),

    #[error("agent returned an unparseable reply: {0}")]
    InvalidResponse(String),
}

/// Synchronous client for the agent socket.
pub struct AgentClient {
    socket_path: PathBuf,
    token_path: PathBuf,
}

impl AgentClient {
    pub fn new(socket_path: impl Into<PathBuf>, token_path: impl Into<PathBuf>) -> Self {
        AgentClient {
            socket_path: socket_path.into(),
            token_path: token_path.into(),
        }
    }

    /// Client against the installation's well-known endpoint.
    pub fn system() -> Self {
        AgentClient::new(DEFAULT_SOCKET_PATH, DEFAULT_TOKEN_PATH)
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Send one operation and wait for the reply.
    pub fn send(&self, operation: Operation) -> Result<ControlResponse, AgentError> {
        if !self.socket_path.exists() {
            return Err(AgentError::AgentNotRunning(self.socket_path.clone()));
        }
        let token = std::fs::read_to_string(&self.token_path)
            .map_err(|source| AgentError::Token {
                path: self.token_path.clone(),
                source,
            })?
            .trim()
            .to_string();

        let mut stream = UnixStream::connect(&self.socket_path).map_err(|e| match e.kind() {
            std::io::ErrorKind::ConnectionRefused
            | std::io::ErrorKind::NotFound
            | std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::ConnectionReset => {
                AgentError::AgentNotRunning(self.socket_path.clone())
            }
            _ => AgentError::Io(e),
        })?;
        stream.set_read_timeout(Some(IO_TIMEOUT))?;
        stream.set_write_timeout(Some(IO_TIMEOUT))?;

        let request = ControlRequest { token, operation };
        let frame = serde_json::to_string(&request)
            .map_err(|e| AgentError::InvalidResponse(format!("cannot serialize request: {e}")))?;
        writeln!(stream, "{frame}")?;

        let mut reader = BufReader::new(stream);
        let mut line = String::new();
        reader.read_line(&mut line)?;
        if line.trim().is_empty() {
            // The agent drops unauthenticated or malformed requests
            // without a reply.
            return Err(AgentError::InvalidResponse(
                "connection closed without a reply".to_string(),
            ));
        }
        serde_json::from_str(line.trim())
            .map_err(|e| AgentError::InvalidResponse(format!("{e}: {line:?}")))
    }

    pub fn set_charge_limit(&self, percent: u8) -> Result<ControlResponse, AgentError> {
        self.send(Operation::SetChargeLimit { value: percent })
    }

    pub fn set_charging_enabled(&self, enabled: bool) -> Result<ControlResponse, AgentError> {
        self.send(Operation::SetChargingEnabled { value: enabled })
    }

    pub fn get_status(&self) -> Result<ControlResponse, AgentError> {
        self.send(Operation::GetStatus)
    }
}
