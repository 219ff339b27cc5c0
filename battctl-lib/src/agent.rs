//! Agent-side request handling: connection authentication and dispatch
//! onto the battery control facade.
//!
//! Every request must validate before it reaches dispatch; a request
//! that fails validation is dropped without a reply — nothing is owed
//! to an unauthenticated peer. Dispatch translates every facade
//! failure into a descriptive reply so a bad request can never take
//! down the accept loop.

use std::fs;
use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::warn;

use crate::control::{BatteryControl, ControlOutcome};
use crate::ipc::{ControlRequest, ControlResponse, Operation};
use crate::session::SmcPort;
use crate::telemetry::{self, TelemetryCache, gather_status};

/// Validates an inbound request's credentials before it may be served.
pub trait ConnectionValidator: Send + Sync {
    fn validate(&self, token: &str) -> bool;
}

/// Shared-secret validator. The agent generates the secret at startup
/// and writes it to a file only the intended callers can read; each
/// request presents it back.
pub struct TokenValidator {
    token: String,
}

impl TokenValidator {
    pub fn new(token: impl Into<String>) -> Self {
        TokenValidator {
            token: token.into(),
        }
    }

    /// Generate a fresh random token and persist it for clients.
    /// The file is created with mode 0o640.
    pub fn generate(path: &Path) -> io::Result<Self> {
        let raw: [u8; 32] = rand::random();
        let token = hex::encode(raw);
        fs::write(path, &token)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, fs::Permissions::from_mode(0o640))?;
        }
        Ok(TokenValidator { token })
    }

    pub fn load(path: &Path) -> io::Result<Self> {
        let token = fs::read_to_string(path)?.trim().to_string();
        Ok(TokenValidator { token })
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

impl ConnectionValidator for TokenValidator {
    fn validate(&self, token: &str) -> bool {
        !self.token.is_empty() && self.token == token
    }
}

/// Authenticate one request and, only then, dispatch it. Returns
/// `None` when validation fails: the caller must drop the connection
/// without replying.
pub fn handle_request<P>(
    request: &ControlRequest,
    validator: &dyn ConnectionValidator,
    control: &Arc<Mutex<BatteryControl<P>>>,
    cache: &TelemetryCache,
    status_budget: Duration,
) -> Option<ControlResponse>
where
    P: SmcPort + Send + 'static,
{
    if !validator.validate(&request.token) {
        warn!("rejecting request with invalid token");
        return None;
    }
    Some(dispatch(&request.operation, control, cache, status_budget))
}

/// Perform one operation against the facade. The privilege check is
/// satisfied by the agent's own process context; requests are
/// independent and processed to completion one at a time.
pub fn dispatch<P>(
    operation: &Operation,
    control: &Arc<Mutex<BatteryControl<P>>>,
    cache: &TelemetryCache,
    status_budget: Duration,
) -> ControlResponse
where
    P: SmcPort + Send + 'static,
{
    match operation {
        Operation::SetChargeLimit { value } => {
            ack_from(telemetry::lock(control).set_charge_limit(*value))
        }
        Operation::SetChargingEnabled { value } => {
            ack_from(telemetry::lock(control).set_charging_enabled(*value))
        }
        Operation::GetStatus => {
            let status = gather_status(control, cache, status_budget);
            ControlResponse::Status {
                success: true,
                charge_limit: status.charge_limit,
                charging_enabled: status.charging_enabled,
                temperature_c: status.temperature_c,
                cycle_count: status.cycle_count,
                charge_percent: status.charge_percent,
            }
        }
    }
}

fn ack_from(outcome: ControlOutcome) -> ControlResponse {
    match outcome {
        ControlOutcome::Applied => ControlResponse::ok(),
        ControlOutcome::Failed(reason) => ControlResponse::error(reason),
        ControlOutcome::NotSupported(reason) => ControlResponse::error(reason),
        ControlOutcome::RequiresElevatedPrivilege => {
            // Reaching this inside the agent means it was started
            // without root.
            ControlResponse::error("agent lacks permission to write controller registers")
        }
    }
}
