//! Session lifecycle tests against the simulated device server.

use std::panic::{self, AssertUnwindSafe};

use daq_client::config::SampleMode;
use daq_client::mock::{
    MockCall, ERROR_DUPLICATE_TASK, ERROR_INVALID_TASK, ERROR_READ_BEYOND_FINAL_SAMPLE,
};
use daq_client::{
    AcquisitionConfig, ClientError, DaqmxApi, MockDaqmx, Operation, RemoteSession, SampleBuffer,
    SessionState,
};

fn fixed_name(name: &str) -> AcquisitionConfig {
    AcquisitionConfig {
        session_name: Some(name.to_string()),
        ..Default::default()
    }
}

/// Full acquisition: configure, start, one read.
fn acquire(session: &mut RemoteSession<MockDaqmx>) -> daq_client::Result<SampleBuffer> {
    session.configure()?;
    session.start()?;
    session.read()
}

#[test]
fn test_happy_path_reads_one_block_and_releases_once() {
    let mock = MockDaqmx::new().with_constant(3.3);

    let samples =
        RemoteSession::scoped(mock.clone(), "Dev1/ai0", fixed_name("daq_grpc"), acquire).unwrap();

    assert_eq!(samples.len(), 1000);
    assert_eq!(samples.first(), Some(3.3));
    assert!(samples.as_slice().iter().all(|&v| v == 3.3));

    assert_eq!(
        mock.operations(),
        vec![
            Operation::CreateTask,
            Operation::CreateAiVoltageChan,
            Operation::CfgSampClkTiming,
            Operation::StartTask,
            Operation::GetTaskAttributeUInt32,
            Operation::ReadAnalogF64,
            Operation::ClearTask,
        ]
    );
    assert!(mock.error_lookups().is_empty());
    assert!(mock.active_tasks().is_empty());
}

#[test]
fn test_requests_carry_configured_parameters() {
    let mock = MockDaqmx::new();
    RemoteSession::scoped(mock.clone(), "Dev1/ai0", fixed_name("daq_grpc"), acquire).unwrap();

    for call in mock.calls() {
        match call {
            MockCall::CreateTask(request) => assert_eq!(request.session_name, "daq_grpc"),
            MockCall::CreateAiVoltageChan(request) => {
                assert_eq!(request.physical_channel, "Dev1/ai0");
                assert_eq!(request.min_val, 0.0);
                assert_eq!(request.max_val, 10.0);
                assert_eq!(request.units, 10348);
                assert_eq!(request.terminal_config, -1);
            }
            MockCall::CfgSampClkTiming(request) => {
                assert_eq!(request.rate, 1000.0);
                assert_eq!(request.active_edge, 10280);
                assert_eq!(request.sample_mode, 10178);
                assert_eq!(request.samps_per_chan, 1000);
            }
            MockCall::GetTaskAttributeUInt32(request) => assert_eq!(request.attribute, 8577),
            MockCall::ReadAnalogF64(request) => {
                assert_eq!(request.num_samps_per_chan, 1000);
                assert_eq!(request.array_size_in_samps, 1000);
                assert_eq!(request.timeout, 10.0);
                assert_eq!(request.fill_mode, 0);
            }
            MockCall::ClearTask(request) => {
                assert_eq!(request.task.map(|t| t.name).as_deref(), Some("daq_grpc"));
            }
            other => panic!("unexpected call {other:?}"),
        }
    }
}

#[test]
fn test_channel_failure_stops_and_releases() {
    let mock = MockDaqmx::new()
        .with_status(Operation::CreateAiVoltageChan, -42)
        .with_error_string(-42, "Simulated channel fault");

    let err = RemoteSession::scoped(mock.clone(), "Dev1/ai0", fixed_name("daq_grpc"), acquire)
        .unwrap_err();

    match &err {
        ClientError::Remote(remote) => {
            assert_eq!(remote.operation, Operation::CreateAiVoltageChan);
            assert_eq!(remote.code, -42);
            assert_eq!(remote.message, "Simulated channel fault");
        }
        other => panic!("expected remote error, got {other:?}"),
    }
    assert_eq!(mock.error_lookups(), vec![-42]);
    assert_eq!(mock.count(Operation::CfgSampClkTiming), 0);
    assert_eq!(mock.count(Operation::StartTask), 0);
    assert_eq!(mock.count(Operation::ClearTask), 1);
}

#[test]
fn test_release_exactly_once_at_every_failure_point() {
    let failure_points = [
        Operation::CreateAiVoltageChan,
        Operation::CfgSampClkTiming,
        Operation::StartTask,
        Operation::GetTaskAttributeUInt32,
        Operation::ReadAnalogF64,
    ];

    for operation in failure_points {
        let mock = MockDaqmx::new().with_status(operation, -7);

        let err = RemoteSession::scoped(mock.clone(), "Dev1/ai0", AcquisitionConfig::default(), acquire)
            .unwrap_err();

        assert_eq!(err.device_code(), Some(-7), "failure in {operation}");
        assert_eq!(mock.error_lookups(), vec![-7], "failure in {operation}");
        assert_eq!(mock.count(Operation::ClearTask), 1, "failure in {operation}");
        assert!(mock.active_tasks().is_empty(), "failure in {operation}");

        // Nothing after the failing call is issued except the release
        let operations = mock.operations();
        let failed_at = operations.iter().position(|op| *op == operation).unwrap();
        assert_eq!(
            &operations[failed_at + 1..],
            &[Operation::GetErrorString, Operation::ClearTask]
        );
    }
}

#[test]
fn test_transport_failure_at_every_point_skips_lookup_and_releases_once() {
    let failure_points = [
        (Operation::CreateAiVoltageChan, SessionState::Faulted),
        (Operation::CfgSampClkTiming, SessionState::Faulted),
        (Operation::StartTask, SessionState::Faulted),
        (Operation::GetTaskAttributeUInt32, SessionState::Faulted),
        (Operation::ReadAnalogF64, SessionState::Started),
    ];

    for (operation, expected_state) in failure_points {
        let mock = MockDaqmx::new().with_transport_failure(operation);
        let mut session = RemoteSession::create(mock.clone(), "Dev1/ai0").unwrap();

        let err = acquire(&mut session).unwrap_err();

        assert!(err.is_transport(), "failure in {operation}: {err:?}");
        assert!(matches!(err, ClientError::RpcStatus(_)), "failure in {operation}");
        assert_eq!(err.device_code(), None, "failure in {operation}");
        assert!(mock.error_lookups().is_empty(), "failure in {operation}");
        assert_eq!(session.state(), expected_state, "failure in {operation}");
        assert_eq!(mock.operations().last(), Some(&operation), "failure in {operation}");

        session.close().unwrap();
        assert_eq!(mock.count(Operation::ClearTask), 1, "failure in {operation}");
        assert!(mock.active_tasks().is_empty(), "failure in {operation}");
    }
}

#[test]
fn test_failed_create_is_not_released() {
    let mock = MockDaqmx::new().with_status(Operation::CreateTask, ERROR_DUPLICATE_TASK);

    let err = RemoteSession::create(mock.clone(), "Dev1/ai0").unwrap_err();

    assert_eq!(err.device_code(), Some(ERROR_DUPLICATE_TASK));
    assert_eq!(
        mock.operations(),
        vec![Operation::CreateTask, Operation::GetErrorString]
    );
}

#[test]
fn test_transport_failure_on_create_attempts_release() {
    let mock = MockDaqmx::new().with_transport_failure(Operation::CreateTask);

    let err = RemoteSession::create(mock.clone(), "Dev1/ai0").unwrap_err();

    // The task never existed, so the release itself reports an invalid task
    assert!(err.is_transport());
    match err {
        ClientError::Teardown { primary, teardown } => {
            assert!(matches!(*primary, ClientError::RpcStatus(_)));
            assert_eq!(teardown.device_code(), Some(ERROR_INVALID_TASK));
        }
        other => panic!("expected teardown error, got {other:?}"),
    }
    assert_eq!(mock.count(Operation::ClearTask), 1);
}

#[test]
fn test_transport_failure_on_create_with_fixed_name_skips_release() {
    let mock = MockDaqmx::new().with_transport_failure(Operation::CreateTask);

    let err = RemoteSession::create_with_config(mock.clone(), "Dev1/ai0", fixed_name("daq_grpc"))
        .unwrap_err();

    assert!(matches!(err, ClientError::RpcStatus(_)), "got {err:?}");
    assert_eq!(mock.count(Operation::ClearTask), 0);
    assert!(mock.error_lookups().is_empty());
    assert_eq!(mock.operations(), vec![Operation::CreateTask]);
}

#[test]
fn test_lost_create_reply_does_not_clear_other_clients_task() {
    let mock = MockDaqmx::new();
    let owner = RemoteSession::create_with_config(mock.clone(), "Dev1/ai0", fixed_name("daq_grpc"))
        .unwrap();

    mock.set_transport_failure(Operation::CreateTask, true);
    let err = RemoteSession::create_with_config(mock.clone(), "Dev1/ai1", fixed_name("daq_grpc"))
        .unwrap_err();

    assert!(err.is_transport());
    assert_eq!(mock.count(Operation::ClearTask), 0);
    assert_eq!(mock.active_tasks(), vec!["daq_grpc".to_string()]);

    owner.close().unwrap();
    assert!(mock.active_tasks().is_empty());
}

#[test]
fn test_duplicate_fixed_name_leaves_first_task_alone() {
    let mock = MockDaqmx::new();
    let first = RemoteSession::create_with_config(mock.clone(), "Dev1/ai0", fixed_name("daq_grpc"))
        .unwrap();

    let err = RemoteSession::create_with_config(mock.clone(), "Dev1/ai1", fixed_name("daq_grpc"))
        .unwrap_err();
    assert_eq!(err.device_code(), Some(ERROR_DUPLICATE_TASK));
    assert_eq!(mock.count(Operation::ClearTask), 0);
    assert_eq!(mock.active_tasks(), vec!["daq_grpc".to_string()]);

    first.close().unwrap();
    assert!(mock.active_tasks().is_empty());
}

#[test]
fn test_generated_names_allow_concurrent_sessions() {
    let mock = MockDaqmx::new();
    let a = RemoteSession::create(mock.clone(), "Dev1/ai0").unwrap();
    let b = RemoteSession::create(mock.clone(), "Dev1/ai1").unwrap();

    assert_ne!(a.name(), b.name());
    assert!(a.name().starts_with("daq_grpc-"));
    assert_eq!(mock.active_tasks().len(), 2);

    drop(a);
    drop(b);
    assert_eq!(mock.count(Operation::ClearTask), 2);
    assert!(mock.active_tasks().is_empty());
}

#[test]
fn test_buffer_sized_from_reported_channel_count() {
    let mock = MockDaqmx::new().with_num_channels(4);
    let mut session = RemoteSession::create(mock.clone(), "Dev1/ai0").unwrap();

    let samples = acquire(&mut session).unwrap();

    assert_eq!(session.num_channels(), Some(4));
    assert_eq!(samples.len(), 4000);
    assert_eq!(samples.num_channels(), 4);
    let read = mock
        .calls()
        .into_iter()
        .find_map(|call| match call {
            MockCall::ReadAnalogF64(request) => Some(request),
            _ => None,
        })
        .unwrap();
    assert_eq!(read.array_size_in_samps, 4000);
    assert_eq!(read.num_samps_per_chan, 1000);
}

#[test]
fn test_channel_range_is_grouped_by_channel() {
    let mock = MockDaqmx::new().with_waveform(|channel, _| channel as f64);
    let config = AcquisitionConfig {
        samples_per_channel: 10,
        ..Default::default()
    };

    let samples = RemoteSession::scoped(mock, "Dev1/ai0:2", config, acquire).unwrap();

    assert_eq!(samples.num_channels(), 3);
    assert_eq!(samples.len(), 30);
    for (index, channel) in samples.channels().enumerate() {
        assert_eq!(channel.len(), 10);
        assert!(channel.iter().all(|&v| v == index as f64));
    }
}

#[test]
fn test_failed_read_can_be_retried() {
    let mock = MockDaqmx::new().with_constant(1.5);
    let mut session = RemoteSession::create(mock.clone(), "Dev1/ai0").unwrap();
    session.configure().unwrap();
    session.start().unwrap();

    mock.set_status(Operation::ReadAnalogF64, -200279);
    let err = session.read().unwrap_err();
    assert_eq!(err.device_code(), Some(-200279));
    assert_eq!(session.state(), SessionState::Started);

    mock.set_status(Operation::ReadAnalogF64, 0);
    let samples = session.read().unwrap();
    assert_eq!(samples.first(), Some(1.5));
    assert_eq!(session.reads_completed(), 1);

    session.close().unwrap();
    assert_eq!(mock.count(Operation::ClearTask), 1);
}

#[test]
fn test_finite_acquisition_exhausts_after_one_block() {
    let mock = MockDaqmx::new();
    let mut session = RemoteSession::create(mock.clone(), "Dev1/ai0").unwrap();
    acquire(&mut session).unwrap();

    let err = session.read().unwrap_err();
    assert_eq!(err.device_code(), Some(ERROR_READ_BEYOND_FINAL_SAMPLE));
    assert_eq!(session.state(), SessionState::Started);
}

#[test]
fn test_continuous_acquisition_keeps_reading() {
    let mock = MockDaqmx::new().with_waveform(|_, index| index as f64);
    let config = AcquisitionConfig {
        sample_mode: SampleMode::Continuous,
        samples_per_channel: 100,
        ..Default::default()
    };
    let mut session = RemoteSession::create_with_config(mock.clone(), "Dev1/ai0", config).unwrap();
    session.configure().unwrap();
    session.start().unwrap();

    for block in 0..3u64 {
        let samples = session.read().unwrap();
        assert_eq!(samples.len(), 100);
        assert_eq!(samples.first(), Some((block * 100) as f64));
    }
    assert_eq!(session.reads_completed(), 3);
}

#[test]
fn test_out_of_order_calls_are_rejected_locally() {
    let mock = MockDaqmx::new();
    let mut session = RemoteSession::create(mock.clone(), "Dev1/ai0").unwrap();

    assert!(matches!(
        session.read(),
        Err(ClientError::InvalidState { operation: "read", state: SessionState::Created })
    ));
    assert!(matches!(
        session.start(),
        Err(ClientError::InvalidState { operation: "start", state: SessionState::Created })
    ));
    assert_eq!(mock.operations(), vec![Operation::CreateTask]);
}

#[test]
fn test_faulted_session_only_releases() {
    let mock = MockDaqmx::new().with_status(Operation::CfgSampClkTiming, -200077);
    let mut session = RemoteSession::create(mock.clone(), "Dev1/ai0").unwrap();

    assert!(session.configure().is_err());
    assert_eq!(session.state(), SessionState::Faulted);
    assert!(matches!(
        session.start(),
        Err(ClientError::InvalidState { state: SessionState::Faulted, .. })
    ));
    assert!(matches!(
        session.configure(),
        Err(ClientError::InvalidState { state: SessionState::Faulted, .. })
    ));

    session.close().unwrap();
    assert_eq!(mock.count(Operation::StartTask), 0);
    assert_eq!(mock.count(Operation::ClearTask), 1);
}

#[test]
fn test_close_reports_release_failure() {
    let mock = MockDaqmx::new()
        .with_status(Operation::ClearTask, -88705)
        .with_error_string(-88705, "Device server connection lost.");
    let session = RemoteSession::create(mock.clone(), "Dev1/ai0").unwrap();

    let err = session.close().unwrap_err();

    assert_eq!(err.device_code(), Some(-88705));
    assert!(err.to_string().contains("ClearTask"));
    assert_eq!(mock.count(Operation::ClearTask), 1);
}

#[test]
fn test_finish_chains_release_failure_onto_primary() {
    let mock = MockDaqmx::new()
        .with_status(Operation::StartTask, -42)
        .with_status(Operation::ClearTask, -88705);

    let err = RemoteSession::scoped(mock.clone(), "Dev1/ai0", AcquisitionConfig::default(), acquire)
        .unwrap_err();

    assert_eq!(err.device_code(), Some(-42));
    match err {
        ClientError::Teardown { teardown, .. } => assert_eq!(teardown.device_code(), Some(-88705)),
        other => panic!("expected teardown error, got {other:?}"),
    }
    assert_eq!(mock.error_lookups(), vec![-42, -88705]);
    assert_eq!(mock.count(Operation::ClearTask), 1);
}

#[test]
fn test_release_on_unwind() {
    let mock = MockDaqmx::new();
    let handle = mock.clone();

    let result = panic::catch_unwind(AssertUnwindSafe(move || {
        let mut session = RemoteSession::create(handle, "Dev1/ai0").unwrap();
        session.configure().unwrap();
        panic!("caller failed mid-acquisition");
    }));

    assert!(result.is_err());
    assert_eq!(mock.count(Operation::ClearTask), 1);
    assert!(mock.active_tasks().is_empty());
}

#[test]
fn test_boxed_api() {
    let mock = MockDaqmx::new().with_constant(2.0);
    let api: Box<dyn DaqmxApi> = Box::new(mock.clone());

    let samples =
        RemoteSession::scoped(api, "Dev1/ai0", AcquisitionConfig::default(), |session| {
            session.configure()?;
            session.start()?;
            session.read()
        })
        .unwrap();

    assert_eq!(samples.first(), Some(2.0));
    assert_eq!(mock.count(Operation::ClearTask), 1);
}

#[test]
fn test_borrowed_api_outlives_session() {
    let mut mock = MockDaqmx::new();
    {
        let session = RemoteSession::create(&mut mock, "Dev1/ai0").unwrap();
        session.close().unwrap();
    }
    assert_eq!(mock.count(Operation::ClearTask), 1);
}
