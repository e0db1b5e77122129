//! Remote acquisition session lifecycle.
//!
//! A [`RemoteSession`] owns one task on the NI-DAQmx device server from
//! creation to release:
//!
//! ```text
//! create() ──> Created ──configure()──> Configured ──start()──> Started ──read()*
//!                 │                         │                      │
//!                 └──── failure ────────────┴──> Faulted           │
//!                                                   │              │
//!                       close() / finish() / drop ──┴──────────────┴──> Released
//! ```
//!
//! Every remote call is status-checked (see [`crate::status`]). Operations
//! called out of order are rejected locally without contacting the server.
//!
//! # Release
//!
//! `ClearTask` is issued exactly once per created task, on every exit path:
//! - [`RemoteSession::close`] releases and returns the release result
//! - [`RemoteSession::finish`] releases and chains a release failure onto the
//!   caller's own failure instead of replacing it
//! - dropping the session (including during unwinding) releases and logs a
//!   release failure
//!
//! A failed create returns no session: the server reported that nothing was
//! allocated. If create fails at the transport level instead, the server may
//! have allocated the task before the reply was lost, so a release is
//! attempted before the error is returned. That release is skipped for a
//! fixed `session_name`: the server may have rejected the request as a
//! duplicate, and the task of that name would belong to another client.

use std::fmt;

use daq_proto::nidaqmx::{
    CfgSampClkTimingRequest, ClearTaskRequest, CreateAiVoltageChanRequest, CreateTaskRequest,
    GetTaskAttributeUInt32Request, ReadAnalogF64Request, Session, StartTaskRequest,
};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::api::DaqmxApi;
use crate::buffer::SampleBuffer;
use crate::config::{AcquisitionConfig, ConfigError};
use crate::error::{ClientError, Result};
use crate::status::{check_status, DaqmxStatus, Operation};

/// `TASK_ATTRIBUTE_NUM_CHANS` (`DAQmx_Task_NumChans`)
pub const ATTRIBUTE_NUM_CHANS: i32 = 8577;

/// `GROUP_BY_GROUP_BY_CHANNEL` fill mode
pub const GROUP_BY_CHANNEL: i32 = 0;

/// Lifecycle state of a [`RemoteSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Task exists on the server, no channel bound yet
    Created,
    /// Channel and sample clock configured
    Configured,
    /// Task running, channel count known; reads allowed
    Started,
    /// A configure or start call failed part-way; only release is valid
    Faulted,
    /// `ClearTask` has been issued
    Released,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Created => "created",
            Self::Configured => "configured",
            Self::Started => "started",
            Self::Faulted => "faulted",
            Self::Released => "released",
        };
        f.write_str(label)
    }
}

/// One named acquisition task on a remote NI-DAQmx device server.
///
/// Not meant to be shared between threads: every operation takes `&mut self`
/// and calls are strictly ordered.
pub struct RemoteSession<A: DaqmxApi> {
    api: A,
    name: String,
    physical_channel: String,
    config: AcquisitionConfig,
    state: SessionState,
    num_channels: Option<u32>,
    reads_completed: u64,
}

impl<A: DaqmxApi> RemoteSession<A> {
    /// Create a task for `physical_channel` with the default configuration.
    pub fn create(api: A, physical_channel: impl Into<String>) -> Result<Self> {
        Self::create_with_config(api, physical_channel, AcquisitionConfig::default())
    }

    /// Create a task for `physical_channel` with an explicit configuration.
    ///
    /// The configuration is validated before anything is sent. A transport
    /// failure during `CreateTask` releases the task name only when it was
    /// generated for this session.
    pub fn create_with_config(
        mut api: A,
        physical_channel: impl Into<String>,
        config: AcquisitionConfig,
    ) -> Result<Self> {
        let physical_channel = physical_channel.into();
        if physical_channel.trim().is_empty() {
            return Err(ConfigError::Invalid("physical channel must not be empty".to_string()).into());
        }
        config.validate()?;

        let name = session_name(&config);
        info!(session = %name, channel = %physical_channel, "Creating DAQmx task");

        let request = CreateTaskRequest {
            session_name: name.clone(),
            ..Default::default()
        };
        let response = match api.create_task(request) {
            Ok(response) => response,
            Err(err) if config.session_name.is_some() => {
                warn!(session = %name, error = %err, "CreateTask failed in transport; fixed task name left untouched");
                return Err(err);
            }
            Err(err) => {
                warn!(session = %name, error = %err, "CreateTask failed in transport; releasing possible orphan");
                return Err(match clear_task(&mut api, &name) {
                    Ok(()) => err,
                    Err(teardown) => err.with_teardown(teardown),
                });
            }
        };
        check_status(&mut api, &name, Operation::CreateTask, response.status)?;

        Ok(Self {
            api,
            name,
            physical_channel,
            config,
            state: SessionState::Created,
            num_channels: None,
            reads_completed: 0,
        })
    }

    /// Create a session, run `body` against it, then release it.
    ///
    /// Release happens whether `body` succeeds or fails; a release failure is
    /// chained onto a failure from `body` (see [`RemoteSession::finish`]).
    pub fn scoped<T, F>(
        api: A,
        physical_channel: impl Into<String>,
        config: AcquisitionConfig,
        body: F,
    ) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        let mut session = Self::create_with_config(api, physical_channel, config)?;
        let outcome = body(&mut session);
        session.finish(outcome)
    }

    /// Bind the analog input channel and configure the sample clock.
    ///
    /// The clock is not configured if binding the channel fails.
    #[instrument(skip(self), fields(session = %self.name))]
    pub fn configure(&mut self) -> Result<()> {
        self.require(SessionState::Created, "configure")?;

        let result = self.bind_channel().and_then(|()| self.configure_clock());
        self.state = match result {
            Ok(()) => SessionState::Configured,
            Err(_) => SessionState::Faulted,
        };
        if result.is_ok() {
            debug!(
                channel = %self.physical_channel,
                rate = self.config.sample_rate,
                samples_per_channel = self.config.samples_per_channel,
                "DAQmx task configured"
            );
        }
        result
    }

    /// Start the task and cache its resolved channel count.
    #[instrument(skip(self), fields(session = %self.name))]
    pub fn start(&mut self) -> Result<()> {
        self.require(SessionState::Configured, "start")?;

        match self.start_and_count_channels() {
            Ok(num_channels) => {
                self.num_channels = Some(num_channels);
                self.state = SessionState::Started;
                info!(num_channels, "DAQmx task started");
                Ok(())
            }
            Err(err) => {
                self.state = SessionState::Faulted;
                Err(err)
            }
        }
    }

    /// Read one block of `samples_per_channel` samples from every channel.
    ///
    /// A failed read leaves the session started; the caller may retry.
    /// Reading past the end of a finite acquisition is reported by the
    /// server as a status error.
    #[instrument(skip(self), fields(session = %self.name))]
    pub fn read(&mut self) -> Result<SampleBuffer> {
        self.require(SessionState::Started, "read")?;
        let Some(num_channels) = self.num_channels else {
            return Err(ClientError::Protocol(
                "channel count unknown after start".to_string(),
            ));
        };

        let samples_per_channel = self.config.samples_per_channel;
        let array_size = num_channels.checked_mul(samples_per_channel).ok_or_else(|| {
            ConfigError::Invalid(format!(
                "{num_channels} channels × {samples_per_channel} samples overflows the read array size"
            ))
        })?;
        let num_samps_per_chan = i32::try_from(samples_per_channel).map_err(|_| {
            ConfigError::Invalid(format!(
                "samples_per_channel {samples_per_channel} exceeds the read request limit"
            ))
        })?;

        let request = ReadAnalogF64Request {
            task: Some(self.task()),
            num_samps_per_chan,
            timeout: self.config.read_timeout.as_secs_f64(),
            fill_mode: GROUP_BY_CHANNEL,
            array_size_in_samps: array_size,
        };
        let response = self.call(Operation::ReadAnalogF64, |api| api.read_analog_f64(request))?;

        if response.read_array.len() > array_size as usize {
            return Err(ClientError::Protocol(format!(
                "server returned {} samples for a {array_size}-sample read",
                response.read_array.len()
            )));
        }

        self.reads_completed += 1;
        debug!(
            samples = response.read_array.len(),
            samples_per_channel_read = response.samps_per_chan_read,
            reads_completed = self.reads_completed,
            "DAQmx read complete"
        );
        Ok(SampleBuffer::new(
            response.read_array,
            num_channels,
            response.samps_per_chan_read,
        ))
    }

    /// Release the remote task and report the result.
    pub fn close(mut self) -> Result<()> {
        self.release()
    }

    /// Release the remote task, combining the result with `outcome`.
    ///
    /// - both succeed: `outcome`
    /// - only release fails: the release error
    /// - `outcome` failed: that error, with any release failure chained on
    pub fn finish<T>(mut self, outcome: Result<T>) -> Result<T> {
        let released = self.release();
        match (outcome, released) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(teardown)) => Err(teardown),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(teardown)) => Err(err.with_teardown(teardown)),
        }
    }

    /// Server-side name of the task.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Physical channel specification the session was created for.
    #[must_use]
    pub fn physical_channel(&self) -> &str {
        &self.physical_channel
    }

    /// Configuration the session was created with.
    #[must_use]
    pub fn config(&self) -> &AcquisitionConfig {
        &self.config
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Channel count reported by the server after start.
    #[must_use]
    pub fn num_channels(&self) -> Option<u32> {
        self.num_channels
    }

    /// Number of successful reads.
    #[must_use]
    pub fn reads_completed(&self) -> u64 {
        self.reads_completed
    }

    fn task(&self) -> Session {
        Session {
            name: self.name.clone(),
        }
    }

    fn require(&self, expected: SessionState, operation: &'static str) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            warn!(session = %self.name, operation, state = %self.state, "Rejected out-of-order call");
            Err(ClientError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    /// Issue a call and check the status it returns.
    fn call<R, F>(&mut self, operation: Operation, call: F) -> Result<R>
    where
        R: DaqmxStatus,
        F: FnOnce(&mut A) -> Result<R>,
    {
        let response = call(&mut self.api)?;
        check_status(&mut self.api, &self.name, operation, response.status())?;
        Ok(response)
    }

    fn bind_channel(&mut self) -> Result<()> {
        let request = CreateAiVoltageChanRequest {
            task: Some(self.task()),
            physical_channel: self.physical_channel.clone(),
            terminal_config: self.config.terminal_config.raw(),
            min_val: self.config.min_val,
            max_val: self.config.max_val,
            units: self.config.units.raw(),
            ..Default::default()
        };
        self.call(Operation::CreateAiVoltageChan, |api| {
            api.create_ai_voltage_chan(request)
        })?;
        Ok(())
    }

    fn configure_clock(&mut self) -> Result<()> {
        let request = CfgSampClkTimingRequest {
            task: Some(self.task()),
            rate: self.config.sample_rate,
            active_edge: self.config.active_edge.raw(),
            sample_mode: self.config.sample_mode.raw(),
            samps_per_chan: u64::from(self.config.samples_per_channel),
            ..Default::default()
        };
        self.call(Operation::CfgSampClkTiming, |api| {
            api.cfg_samp_clk_timing(request)
        })?;
        Ok(())
    }

    fn start_and_count_channels(&mut self) -> Result<u32> {
        let request = StartTaskRequest {
            task: Some(self.task()),
        };
        self.call(Operation::StartTask, |api| api.start_task(request))?;

        let request = GetTaskAttributeUInt32Request {
            task: Some(self.task()),
            attribute: ATTRIBUTE_NUM_CHANS,
        };
        let response = self.call(Operation::GetTaskAttributeUInt32, |api| {
            api.get_task_attribute_uint32(request)
        })?;

        if response.value == 0 {
            return Err(ClientError::Protocol(
                "server reported a task with zero channels".to_string(),
            ));
        }
        Ok(response.value)
    }

    /// Issue `ClearTask` unless it has already been issued.
    fn release(&mut self) -> Result<()> {
        if self.state == SessionState::Released {
            return Ok(());
        }
        let previous = std::mem::replace(&mut self.state, SessionState::Released);
        debug!(session = %self.name, state = %previous, "Releasing DAQmx task");
        clear_task(&mut self.api, &self.name)
    }
}

impl<A: DaqmxApi> Drop for RemoteSession<A> {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            error!(session = %self.name, error = %err, "Failed to release DAQmx task");
        }
    }
}

impl<A: DaqmxApi> fmt::Debug for RemoteSession<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteSession")
            .field("name", &self.name)
            .field("physical_channel", &self.physical_channel)
            .field("state", &self.state)
            .field("num_channels", &self.num_channels)
            .field("reads_completed", &self.reads_completed)
            .finish_non_exhaustive()
    }
}

fn clear_task<A: DaqmxApi + ?Sized>(api: &mut A, name: &str) -> Result<()> {
    let request = ClearTaskRequest {
        task: Some(Session {
            name: name.to_string(),
        }),
    };
    let response = api.clear_task(request)?;
    check_status(api, name, Operation::ClearTask, response.status)
}

/// Task name for a new session: the configured name, or a unique one.
fn session_name(config: &AcquisitionConfig) -> String {
    match &config.session_name {
        Some(name) => name.clone(),
        None => format!("{}-{}", config.session_prefix, Uuid::new_v4()),
    }
}
