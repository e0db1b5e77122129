//! Integration tests for daq-client against a live NI gRPC device server.
//!
//! These tests are ignored by default. Run with:
//! ```
//! DAQMX_URL=http://pxi-chassis:31763 DAQMX_CHANNEL=Dev1/ai0 \
//!     cargo test -p daq-client --test integration -- --ignored
//! ```

use daq_client::{AcquisitionConfig, DeviceAddress, GrpcDaqmx, RemoteSession, SessionState};

/// Device server URL from environment or default to localhost
fn server_url() -> String {
    std::env::var("DAQMX_URL").unwrap_or_else(|_| "localhost:31763".to_string())
}

/// Physical channel from environment or default to the first AI line of Dev1
fn physical_channel() -> String {
    std::env::var("DAQMX_CHANNEL").unwrap_or_else(|_| "Dev1/ai0".to_string())
}

/// Helper to skip test gracefully if the server is unavailable
fn try_connect() -> Option<GrpcDaqmx> {
    let addr = DeviceAddress::parse(&server_url()).ok()?;
    GrpcDaqmx::connect(&addr).ok()
}

#[test]
#[ignore]
fn test_connect_to_server() {
    let url = server_url();
    let addr = DeviceAddress::parse(&url).expect("Failed to parse server URL");

    if GrpcDaqmx::connect(&addr).is_err() {
        eprintln!("Skipping test: device server not available at {}", url);
    }
}

#[test]
#[ignore]
fn test_connect_unreachable_address() {
    let addr = DeviceAddress::parse("http://invalid-host.invalid:31763")
        .expect("Failed to parse invalid URL");

    let result = GrpcDaqmx::connect(&addr);

    let err = result.expect_err("Should fail to connect to an unresolvable host");
    assert!(err.is_transport());
}

#[test]
#[ignore]
fn test_finite_acquisition() {
    let Some(api) = try_connect() else {
        eprintln!("Skipping test: device server not available");
        return;
    };

    let mut session = RemoteSession::create(api, physical_channel()).expect("CreateTask failed");
    session.configure().expect("Failed to configure task");
    session.start().expect("Failed to start task");

    let samples = session.read().expect("Failed to read samples");
    assert_eq!(samples.samples_per_channel(), 1000);
    assert!(samples.as_slice().iter().all(|v| v.is_finite()));

    session.close().expect("ClearTask failed");
}

#[test]
#[ignore]
fn test_unknown_channel_reports_device_error() {
    let Some(api) = try_connect() else {
        eprintln!("Skipping test: device server not available");
        return;
    };

    let mut session = RemoteSession::create_with_config(
        api,
        "NoSuchDevice/ai0",
        AcquisitionConfig::default(),
    )
    .expect("CreateTask failed");

    let err = session.configure().expect_err("Unknown device should fail");
    assert!(err.device_code().is_some_and(|code| code < 0));
    assert!(!err.to_string().is_empty());
    assert_eq!(session.state(), SessionState::Faulted);

    session.close().expect("ClearTask failed");
}
