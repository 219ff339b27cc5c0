//! The privileged charge-control agent.
//!
//! Runs continuously under elevated privilege (launchd keeps it
//! alive), listens on a Unix domain socket, and performs register
//! writes on behalf of unprivileged callers. Per connection, requests
//! are processed strictly in order, one at a time; an invalid or
//! unauthenticated frame tears the connection down and the agent goes
//! back to listening.

use std::error::Error;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tracing::{info, warn};

use battctl_lib::agent::{TokenValidator, handle_request};
use battctl_lib::control::{BatteryControl, PrivilegeContext, ProcessPrivilege};
use battctl_lib::ipc::{ControlRequest, DEFAULT_SOCKET_PATH, DEFAULT_TOKEN_PATH};
use battctl_lib::telemetry::TelemetryCache;

#[derive(Parser)]
#[command(name = "battctl-agent", about = "Privileged charge-control agent")]
struct Args {
    /// Socket path the agent listens on.
    #[arg(long, default_value = DEFAULT_SOCKET_PATH)]
    socket: PathBuf,

    /// Where to write the connection token for clients.
    #[arg(long, default_value = DEFAULT_TOKEN_PATH)]
    token_file: PathBuf,

    /// Budget for slow telemetry reads, in seconds.
    #[arg(long, default_value_t = 5)]
    status_budget_secs: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();

    if !ProcessPrivilege.can_write_registers() {
        warn!("not running with elevated privilege; register writes will be refused");
    }

    let validator = Arc::new(TokenValidator::generate(&args.token_file)?);
    info!("connection token written to {}", args.token_file.display());

    if args.socket.exists() {
        std::fs::remove_file(&args.socket)?;
    }
    let listener = UnixListener::bind(&args.socket)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        // Anyone may connect; the token is the gate.
        std::fs::set_permissions(&args.socket, std::fs::Permissions::from_mode(0o666))?;
    }
    info!("listening on {}", args.socket.display());

    let control = Arc::new(Mutex::new(BatteryControl::system()));
    let cache = Arc::new(TelemetryCache::new());
    let budget = Duration::from_secs(args.status_budget_secs);

    loop {
        match listener.accept().await {
            Ok((stream, _addr)) => {
                let validator = Arc::clone(&validator);
                let control = Arc::clone(&control);
                let cache = Arc::clone(&cache);
                tokio::spawn(async move {
                    serve_connection(stream, validator, control, cache, budget).await;
                });
            }
            Err(e) => {
                warn!("accept failed: {e}");
            }
        }
    }
}

async fn serve_connection(
    stream: UnixStream,
    validator: Arc<TokenValidator>,
    control: Arc<Mutex<BatteryControl<battctl_lib::iokit::IoKitPort>>>,
    cache: Arc<TelemetryCache>,
    budget: Duration,
) {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => return,
            Err(e) => {
                warn!("connection read failed: {e}");
                return;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let request: ControlRequest = match serde_json::from_str(line.trim()) {
            Ok(request) => request,
            Err(e) => {
                warn!("dropping connection with malformed request: {e}");
                return;
            }
        };

        let response = {
            let validator = Arc::clone(&validator);
            let control = Arc::clone(&control);
            let cache = Arc::clone(&cache);
            let handled = tokio::task::spawn_blocking(move || {
                handle_request(&request, validator.as_ref(), &control, &cache, budget)
            })
            .await;
            match handled {
                Ok(response) => response,
                Err(e) => {
                    warn!("request task failed: {e}");
                    Some(battctl_lib::ipc::ControlResponse::error(
                        "internal agent failure",
                    ))
                }
            }
        };

        // No reply is owed to an unauthenticated peer.
        let Some(response) = response else { return };

        let frame = match serde_json::to_string(&response) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("cannot serialize reply: {e}");
                return;
            }
        };
        if let Err(e) = writer.write_all(format!("{frame}\n").as_bytes()).await {
            warn!("connection write failed: {e}");
            return;
        }
    }
}
