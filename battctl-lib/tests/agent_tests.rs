//! Agent-side authentication and dispatch, plus the end-to-end
//! privilege-relay scenarios.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use battctl_lib::agent::{ConnectionValidator, TokenValidator, dispatch, handle_request};
use battctl_lib::ipc::{ControlRequest, ControlResponse, Operation};
use battctl_lib::telemetry::TelemetryCache;
use common::*;

const BUDGET: Duration = Duration::from_secs(2);

fn shared(control: BatteryControl<MockPort>) -> Arc<Mutex<BatteryControl<MockPort>>> {
    Arc::new(Mutex::new(control))
}

fn request(token: &str, operation: Operation) -> ControlRequest {
    ControlRequest {
        token: token.to_string(),
        operation,
    }
}

#[test]
fn test_unauthenticated_request_never_reaches_dispatch() {
    let control = shared(control_with(wide_range_port(), true));
    let cache = TelemetryCache::new();
    let validator = TokenValidator::new("secret");

    let response = handle_request(
        &request("wrong", Operation::SetChargeLimit { value: 80 }),
        &validator,
        &control,
        &cache,
        BUDGET,
    );

    // No reply is owed, and the controller was never touched.
    assert!(response.is_none());
    let control = control.lock().unwrap();
    assert_eq!(control.session().port().calls, 0);
    assert_eq!(control.session().port().write_calls, 0);
}

#[test]
fn test_empty_configured_token_rejects_everything() {
    let validator = TokenValidator::new("");
    assert!(!validator.validate(""));
    assert!(!validator.validate("anything"));
}

#[test]
fn test_authenticated_request_is_dispatched() {
    let control = shared(control_with(wide_range_port(), true));
    let cache = TelemetryCache::new();
    let validator = TokenValidator::new("secret");

    let response = handle_request(
        &request("secret", Operation::SetChargeLimit { value: 60 }),
        &validator,
        &control,
        &cache,
        BUDGET,
    );

    assert_eq!(response, Some(ControlResponse::ok()));
    assert_eq!(
        control.lock().unwrap().session().port().writes,
        vec![(CHARGE_LIMIT_WIDE, vec![60])]
    );
}

#[test]
fn test_dispatch_reports_facade_failures_as_replies() {
    let control = shared(control_with(binary_range_port(), true));
    let cache = TelemetryCache::new();

    let response = dispatch(
        &Operation::SetChargeLimit { value: 55 },
        &control,
        &cache,
        BUDGET,
    );
    match response {
        ControlResponse::Ack {
            success: false,
            message: Some(message),
        } => assert!(message.contains("80%")),
        other => panic!("expected a failed ack, got {other:?}"),
    }
}

#[test]
fn test_get_status_succeeds_with_missing_fields() {
    // Cycle count register absent: the field is omitted, the call
    // still succeeds overall.
    let port = MockPort::new()
        .with_register(CHARGE_LIMIT_WIDE, DataType::Ui8, &[80])
        .with_register(CHARGING_INHIBIT_PRIMARY, DataType::Ui8, &[0])
        .with_register(TEMPERATURE_SENSORS[0], DataType::Sp78, &[0x19, 0x00]);
    let control = shared(control_with(port, true));
    let cache = TelemetryCache::new();

    let response = dispatch(&Operation::GetStatus, &control, &cache, BUDGET);
    match response {
        ControlResponse::Status {
            success,
            charge_limit,
            charging_enabled,
            temperature_c,
            cycle_count,
            ..
        } => {
            assert!(success);
            assert_eq!(charge_limit, Some(80));
            assert_eq!(charging_enabled, Some(true));
            assert_eq!(temperature_c, Some(25.0));
            assert_eq!(cycle_count, None);
        }
        other => panic!("expected a status reply, got {other:?}"),
    }
}

#[test]
fn test_end_to_end_wide_range_privileged_write() {
    // Scenario: wide-range controller, caller already privileged.
    let mut control = control_with(wide_range_port(), true);
    assert_eq!(control.set_charge_limit(55), ControlOutcome::Applied);
    assert_eq!(
        control.session().port().writes,
        vec![(CHARGE_LIMIT_WIDE, vec![55])]
    );
}

#[test]
fn test_end_to_end_binary_range_relay_through_agent() {
    // Scenario: binary-range controller. The unprivileged facade
    // refuses with RequiresElevatedPrivilege and zero writes; the same
    // request replayed in the agent's privileged context writes raw 1.
    let mut unprivileged = control_with(binary_range_port(), false);
    assert_eq!(
        unprivileged.set_charge_limit(80),
        ControlOutcome::RequiresElevatedPrivilege
    );
    assert_eq!(unprivileged.session().port().write_calls, 0);

    let agent_control = shared(control_with(binary_range_port(), true));
    let cache = TelemetryCache::new();
    let validator = TokenValidator::new("secret");
    let response = handle_request(
        &request("secret", Operation::SetChargeLimit { value: 80 }),
        &validator,
        &agent_control,
        &cache,
        BUDGET,
    );

    assert_eq!(response, Some(ControlResponse::ok()));
    assert_eq!(
        agent_control.lock().unwrap().session().port().writes,
        vec![(CHARGE_LIMIT_BINARY, vec![1])]
    );
}

#[test]
fn test_token_file_roundtrip() {
    let path = std::env::temp_dir().join(format!("battctl-test-{}.token", std::process::id()));
    let generated = TokenValidator::generate(&path).unwrap();
    let loaded = TokenValidator::load(&path).unwrap();

    assert_eq!(generated.token(), loaded.token());
    assert_eq!(generated.token().len(), 64); // 32 random bytes, hex
    assert!(loaded.validate(generated.token()));
    assert!(!loaded.validate("not-the-token"));

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o640);
    }

    std::fs::remove_file(&path).unwrap();
}
