//! `battctl` — battery status, diagnostics, and charge control.
//!
//! Reads run directly against the controller service. Writes first try
//! the in-process facade; when that reports missing privilege, the
//! same operation is relayed through the privileged agent.

use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::info;

use battctl_lib::control::{BatteryControl, ControlOutcome};
use battctl_lib::ipc::{
    AgentClient, AgentError, ControlResponse, DEFAULT_SOCKET_PATH, DEFAULT_TOKEN_PATH, Operation,
};
use battctl_lib::telemetry::{TelemetryCache, gather_status};

const STATUS_BUDGET: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "battctl", about = "Battery telemetry and charge control")]
struct Cli {
    /// Agent socket path.
    #[arg(long, global = true, default_value = DEFAULT_SOCKET_PATH)]
    socket: PathBuf,

    /// Agent token file path.
    #[arg(long, global = true, default_value = DEFAULT_TOKEN_PATH)]
    token_file: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show the current battery status.
    Status {
        /// Print as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Enumerate every known register and the resolved variant.
    Diagnostics,
    /// Get or set the charge limit.
    Limit {
        /// Target percentage; omit to read the current limit.
        percent: Option<u8>,
    },
    /// Enable or disable charging.
    Charging {
        #[command(subcommand)]
        action: ChargingAction,
    },
}

#[derive(Subcommand)]
enum ChargingAction {
    /// Show whether charging is currently enabled.
    Status,
    /// Allow the battery to charge.
    Enable,
    /// Inhibit charging.
    Disable,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("battctl: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode, Box<dyn Error>> {
    let agent = AgentClient::new(&cli.socket, &cli.token_file);
    let control = Arc::new(Mutex::new(BatteryControl::system()));

    match cli.command {
        Command::Status { json } => {
            let cache = TelemetryCache::new();
            let status = gather_status(&control, &cache, STATUS_BUDGET);
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                print_field("charge", status.charge_percent.map(|v| format!("{v}%")));
                print_field("plugged in", status.is_plugged_in.map(|v| v.to_string()));
                print_field("charging", status.is_charging.map(|v| v.to_string()));
                print_field("charge limit", status.charge_limit.map(|v| format!("{v}%")));
                print_field(
                    "charging enabled",
                    status.charging_enabled.map(|v| v.to_string()),
                );
                print_field(
                    "temperature",
                    status.temperature_c.map(|v| format!("{v:.1} °C")),
                );
                print_field("cycle count", status.cycle_count.map(|v| v.to_string()));
                print_field(
                    "health",
                    status.health_ratio.map(|v| format!("{:.0}%", v * 100.0)),
                );
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Diagnostics => {
            let mut control = lock(&control);
            print!("{}", control.run_diagnostics());
            Ok(ExitCode::SUCCESS)
        }
        Command::Limit { percent: None } => {
            match lock(&control).charge_limit() {
                Some(limit) => println!("charge limit: {limit}%"),
                None => println!("charge limit: unavailable"),
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Limit {
            percent: Some(percent),
        } => {
            let outcome = lock(&control).set_charge_limit(percent);
            finish_write(
                outcome,
                Operation::SetChargeLimit { value: percent },
                &agent,
                &format!("charge limit set to {percent}%"),
            )
        }
        Command::Charging { action } => match action {
            ChargingAction::Status => {
                match lock(&control).is_charging_enabled() {
                    Some(enabled) => println!("charging enabled: {enabled}"),
                    None => println!("charging enabled: unavailable"),
                }
                Ok(ExitCode::SUCCESS)
            }
            ChargingAction::Enable => {
                let outcome = lock(&control).set_charging_enabled(true);
                finish_write(
                    outcome,
                    Operation::SetChargingEnabled { value: true },
                    &agent,
                    "charging enabled",
                )
            }
            ChargingAction::Disable => {
                let outcome = lock(&control).set_charging_enabled(false);
                finish_write(
                    outcome,
                    Operation::SetChargingEnabled { value: false },
                    &agent,
                    "charging disabled",
                )
            }
        },
    }
}

/// Report a write outcome, relaying through the privileged agent when
/// the in-process attempt lacked privilege.
fn finish_write(
    outcome: ControlOutcome,
    operation: Operation,
    agent: &AgentClient,
    success_message: &str,
) -> Result<ExitCode, Box<dyn Error>> {
    match outcome {
        ControlOutcome::Applied => {
            println!("{success_message}");
            Ok(ExitCode::SUCCESS)
        }
        ControlOutcome::RequiresElevatedPrivilege => {
            info!("relaying through the privileged agent");
            relay(operation, agent, success_message)
        }
        ControlOutcome::Failed(reason) | ControlOutcome::NotSupported(reason) => {
            eprintln!("battctl: {reason}");
            Ok(ExitCode::FAILURE)
        }
    }
}

fn relay(
    operation: Operation,
    agent: &AgentClient,
    success_message: &str,
) -> Result<ExitCode, Box<dyn Error>> {
    match agent.send(operation) {
        Ok(ControlResponse::Ack { success: true, .. }) => {
            println!("{success_message}");
            Ok(ExitCode::SUCCESS)
        }
        Ok(ControlResponse::Ack {
            success: false,
            message,
        }) => {
            eprintln!(
                "battctl: agent refused: {}",
                message.unwrap_or_else(|| "unknown reason".to_string())
            );
            Ok(ExitCode::FAILURE)
        }
        Ok(other) => {
            eprintln!("battctl: unexpected agent reply: {other:?}");
            Ok(ExitCode::FAILURE)
        }
        Err(AgentError::AgentNotRunning(path)) => {
            eprintln!(
                "battctl: this operation needs elevated privilege, and the \
                 charge-control agent is not running (no socket at {}).\n\
                 Start battctl-agent as root, or rerun this command with sudo.",
                path.display()
            );
            Ok(ExitCode::FAILURE)
        }
        Err(e) => Err(Box::new(e)),
    }
}

fn print_field(label: &str, value: Option<String>) {
    println!(
        "{label:<18} {}",
        value.unwrap_or_else(|| "unavailable".to_string())
    );
}

fn lock<T>(mutex: &Arc<Mutex<T>>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
