//! Simulated NI-DAQmx device server.
//!
//! [`MockDaqmx`] implements [`DaqmxApi`] in-process. It keeps a small model
//! of server-side task state (names, channels, timing, samples consumed) so
//! that lifecycle mistakes surface as the same kind of status errors a real
//! server would return, and it records every request for later inspection.
//!
//! Failure injection:
//! - [`MockDaqmx::with_status`]: answer an operation with a fixed nonzero status
//! - [`MockDaqmx::with_transport_failure`]: fail an operation with `UNAVAILABLE`
//! - [`MockDaqmx::with_error_string`]: text returned by `GetErrorString`
//!
//! Clones share state, so a test can keep a handle while a session owns another.
//!
//! ```
//! use daq_client::mock::MockDaqmx;
//! use daq_client::{Operation, RemoteSession};
//!
//! let mock = MockDaqmx::new().with_constant(3.3);
//! let mut session = RemoteSession::create(mock.clone(), "Dev1/ai0")?;
//! session.configure()?;
//! session.start()?;
//! let samples = session.read()?;
//! assert_eq!(samples.len(), 1000);
//! drop(session);
//! assert_eq!(mock.count(Operation::ClearTask), 1);
//! # Ok::<(), daq_client::ClientError>(())
//! ```

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use daq_proto::nidaqmx::{
    CfgSampClkTimingRequest, CfgSampClkTimingResponse, ClearTaskRequest, ClearTaskResponse,
    CreateAiVoltageChanRequest, CreateAiVoltageChanResponse, CreateTaskRequest,
    CreateTaskResponse, GetErrorStringRequest, GetErrorStringResponse,
    GetTaskAttributeUInt32Request, GetTaskAttributeUInt32Response, ReadAnalogF64Request,
    ReadAnalogF64Response, Session, StartTaskRequest, StartTaskResponse,
};
use parking_lot::Mutex;
use tracing::trace;

use crate::api::DaqmxApi;
use crate::config::SampleMode;
use crate::error::{ClientError, Result};
use crate::session::{ATTRIBUTE_NUM_CHANS, GROUP_BY_CHANNEL};
use crate::status::Operation;

/// `Requested value is not a supported value for this property.`
pub const ERROR_INVALID_ATTRIBUTE_VALUE: i32 = -200077;
/// `Task specified is invalid or does not exist.`
pub const ERROR_INVALID_TASK: i32 = -200088;
/// `Task name specified conflicts with an existing task name.`
pub const ERROR_DUPLICATE_TASK: i32 = -200089;
/// `Physical channel specified does not exist on this device.`
pub const ERROR_PHYSICAL_CHAN_DOES_NOT_EXIST: i32 = -200170;
/// `Buffer is too small to fit read data.`
pub const ERROR_READ_BUFFER_TOO_SMALL: i32 = -200229;
/// `Attempted to read samples beyond the final sample acquired.`
pub const ERROR_READ_BEYOND_FINAL_SAMPLE: i32 = -200278;
/// `Task contains no channels.`
pub const ERROR_NO_CHANNELS_IN_TASK: i32 = -200478;

/// One request received by the mock, in arrival order.
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub enum MockCall {
    CreateTask(CreateTaskRequest),
    ClearTask(ClearTaskRequest),
    CreateAiVoltageChan(CreateAiVoltageChanRequest),
    CfgSampClkTiming(CfgSampClkTimingRequest),
    StartTask(StartTaskRequest),
    GetTaskAttributeUInt32(GetTaskAttributeUInt32Request),
    ReadAnalogF64(ReadAnalogF64Request),
    GetErrorString(GetErrorStringRequest),
}

impl MockCall {
    /// The RPC this call corresponds to.
    #[must_use]
    pub fn operation(&self) -> Operation {
        match self {
            Self::CreateTask(_) => Operation::CreateTask,
            Self::ClearTask(_) => Operation::ClearTask,
            Self::CreateAiVoltageChan(_) => Operation::CreateAiVoltageChan,
            Self::CfgSampClkTiming(_) => Operation::CfgSampClkTiming,
            Self::StartTask(_) => Operation::StartTask,
            Self::GetTaskAttributeUInt32(_) => Operation::GetTaskAttributeUInt32,
            Self::ReadAnalogF64(_) => Operation::ReadAnalogF64,
            Self::GetErrorString(_) => Operation::GetErrorString,
        }
    }
}

/// Sample value generator: `(channel index, sample index) -> volts`.
type Waveform = Arc<dyn Fn(usize, u64) -> f64 + Send + Sync>;

#[derive(Debug, Default)]
struct MockTask {
    channels: Vec<String>,
    samples_per_channel: Option<u64>,
    finite: bool,
    started: bool,
    samples_read: u64,
}

struct MockState {
    calls: Vec<MockCall>,
    statuses: HashMap<Operation, i32>,
    transport_failures: HashSet<Operation>,
    error_strings: HashMap<i32, String>,
    num_channels: Option<u32>,
    waveform: Waveform,
    tasks: HashMap<String, MockTask>,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            calls: Vec::new(),
            statuses: HashMap::new(),
            transport_failures: HashSet::new(),
            error_strings: HashMap::new(),
            num_channels: None,
            waveform: Arc::new(|_, _| 0.0),
            tasks: HashMap::new(),
        }
    }
}

impl MockState {
    /// Record the call and apply injected failures.
    ///
    /// `Ok(Some(status))` short-circuits with an injected status.
    fn intercept(&mut self, call: MockCall) -> Result<Option<i32>> {
        let operation = call.operation();
        trace!(operation = %operation, "MockDaqmx received call");
        self.calls.push(call);

        if self.transport_failures.contains(&operation) {
            return Err(ClientError::RpcStatus(tonic::Status::unavailable(format!(
                "simulated transport failure in {operation}"
            ))));
        }

        Ok(self.statuses.get(&operation).copied())
    }

    fn task_mut(&mut self, task: Option<&Session>) -> std::result::Result<&mut MockTask, i32> {
        task.and_then(|session| self.tasks.get_mut(&session.name))
            .ok_or(ERROR_INVALID_TASK)
    }

    fn create_task(&mut self, request: &CreateTaskRequest) -> std::result::Result<(), i32> {
        if self.tasks.contains_key(&request.session_name) {
            return Err(ERROR_DUPLICATE_TASK);
        }
        self.tasks
            .insert(request.session_name.clone(), MockTask::default());
        Ok(())
    }

    fn clear_task(&mut self, request: &ClearTaskRequest) -> std::result::Result<(), i32> {
        request
            .task
            .as_ref()
            .and_then(|session| self.tasks.remove(&session.name))
            .map(|_| ())
            .ok_or(ERROR_INVALID_TASK)
    }

    fn create_channel(
        &mut self,
        request: &CreateAiVoltageChanRequest,
    ) -> std::result::Result<(), i32> {
        let task = self.task_mut(request.task.as_ref())?;
        if task.started {
            return Err(ERROR_INVALID_TASK);
        }
        if request.min_val.is_nan() || request.max_val.is_nan() || request.min_val >= request.max_val {
            return Err(ERROR_INVALID_ATTRIBUTE_VALUE);
        }
        let channels = expand_physical_channels(&request.physical_channel)
            .ok_or(ERROR_PHYSICAL_CHAN_DOES_NOT_EXIST)?;
        task.channels.extend(channels);
        Ok(())
    }

    fn configure_clock(&mut self, request: &CfgSampClkTimingRequest) -> std::result::Result<(), i32> {
        let task = self.task_mut(request.task.as_ref())?;
        if request.rate.is_nan() || request.rate <= 0.0 || request.samps_per_chan == 0 {
            return Err(ERROR_INVALID_ATTRIBUTE_VALUE);
        }
        task.samples_per_channel = Some(request.samps_per_chan);
        task.finite = request.sample_mode == SampleMode::Finite.raw();
        Ok(())
    }

    fn start_task(&mut self, request: &StartTaskRequest) -> std::result::Result<(), i32> {
        let task = self.task_mut(request.task.as_ref())?;
        if task.channels.is_empty() {
            return Err(ERROR_NO_CHANNELS_IN_TASK);
        }
        task.started = true;
        Ok(())
    }

    fn attribute(&mut self, request: &GetTaskAttributeUInt32Request) -> std::result::Result<u32, i32> {
        let num_channels = self.num_channels;
        let task = self.task_mut(request.task.as_ref())?;
        match request.attribute {
            ATTRIBUTE_NUM_CHANS => Ok(num_channels.unwrap_or(task.channels.len() as u32)),
            _ => Err(ERROR_INVALID_ATTRIBUTE_VALUE),
        }
    }

    fn read(&mut self, request: &ReadAnalogF64Request) -> std::result::Result<(Vec<f64>, i32), i32> {
        let num_channels = self.num_channels;
        let waveform = Arc::clone(&self.waveform);
        let task = self.task_mut(request.task.as_ref())?;
        if task.channels.is_empty() {
            return Err(ERROR_NO_CHANNELS_IN_TASK);
        }
        // DAQmx starts a task implicitly on read
        task.started = true;

        let channels = num_channels.map_or(task.channels.len(), |n| n as usize);
        let requested = match request.num_samps_per_chan {
            n if n > 0 => n as u64,
            _ => task.samples_per_channel.unwrap_or(1),
        };
        let available = match (task.finite, task.samples_per_channel) {
            (true, Some(total)) => total.saturating_sub(task.samples_read),
            _ => requested,
        };
        if available == 0 {
            return Err(ERROR_READ_BEYOND_FINAL_SAMPLE);
        }
        let count = requested.min(available);
        if (request.array_size_in_samps as u64) < count * channels as u64 {
            return Err(ERROR_READ_BUFFER_TOO_SMALL);
        }

        let start = task.samples_read;
        let mut data = Vec::with_capacity(count as usize * channels);
        if request.fill_mode == GROUP_BY_CHANNEL {
            for channel in 0..channels {
                data.extend((start..start + count).map(|i| waveform(channel, i)));
            }
        } else {
            for i in start..start + count {
                data.extend((0..channels).map(|channel| waveform(channel, i)));
            }
        }
        task.samples_read += count;

        Ok((data, count as i32))
    }

    fn error_string(&self, code: i32) -> String {
        if let Some(message) = self.error_strings.get(&code) {
            return message.clone();
        }
        let known = match code {
            ERROR_INVALID_ATTRIBUTE_VALUE => {
                "Requested value is not a supported value for this property."
            }
            ERROR_INVALID_TASK => "Task specified is invalid or does not exist.",
            ERROR_DUPLICATE_TASK => "Task name specified conflicts with an existing task name.",
            ERROR_PHYSICAL_CHAN_DOES_NOT_EXIST => {
                "Physical channel specified does not exist on this device."
            }
            ERROR_READ_BUFFER_TOO_SMALL => "Buffer is too small to fit read data.",
            ERROR_READ_BEYOND_FINAL_SAMPLE => {
                "Attempted to read samples beyond the final sample acquired."
            }
            ERROR_NO_CHANNELS_IN_TASK => "Task contains no channels.",
            _ => return format!("Simulated DAQmx error {code}."),
        };
        known.to_string()
    }
}

/// In-process NI-DAQmx device server for tests and `--mock` runs.
#[derive(Clone, Default)]
pub struct MockDaqmx {
    state: Arc<Mutex<MockState>>,
}

impl fmt::Debug for MockDaqmx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MockDaqmx")
            .field("calls", &state.calls.len())
            .field("tasks", &state.tasks.len())
            .finish()
    }
}

impl MockDaqmx {
    /// Healthy server: every call succeeds, samples are `0.0`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `n` channels from the channel-count attribute regardless of the
    /// physical channel string, and size reads accordingly.
    #[must_use]
    pub fn with_num_channels(self, n: u32) -> Self {
        self.state.lock().num_channels = Some(n);
        self
    }

    /// Every sample reads `value`.
    #[must_use]
    pub fn with_constant(self, value: f64) -> Self {
        self.with_waveform(move |_, _| value)
    }

    /// Samples are generated by `waveform(channel, sample_index)`.
    #[must_use]
    pub fn with_waveform<F>(self, waveform: F) -> Self
    where
        F: Fn(usize, u64) -> f64 + Send + Sync + 'static,
    {
        self.state.lock().waveform = Arc::new(waveform);
        self
    }

    /// Answer `operation` with `status` instead of simulating it.
    #[must_use]
    pub fn with_status(self, operation: Operation, status: i32) -> Self {
        self.set_status(operation, status);
        self
    }

    /// Fail `operation` at the transport level.
    #[must_use]
    pub fn with_transport_failure(self, operation: Operation) -> Self {
        self.state.lock().transport_failures.insert(operation);
        self
    }

    /// Text returned by `GetErrorString` for `code`.
    #[must_use]
    pub fn with_error_string(self, code: i32, message: impl Into<String>) -> Self {
        self.state.lock().error_strings.insert(code, message.into());
        self
    }

    /// Change the injected status of `operation`; `0` restores simulation.
    pub fn set_status(&self, operation: Operation, status: i32) {
        let mut state = self.state.lock();
        if status == 0 {
            state.statuses.remove(&operation);
        } else {
            state.statuses.insert(operation, status);
        }
    }

    /// Start or stop failing `operation` in transport.
    pub fn set_transport_failure(&self, operation: Operation, failing: bool) {
        let mut state = self.state.lock();
        if failing {
            state.transport_failures.insert(operation);
        } else {
            state.transport_failures.remove(&operation);
        }
    }

    /// All calls received so far.
    #[must_use]
    pub fn calls(&self) -> Vec<MockCall> {
        self.state.lock().calls.clone()
    }

    /// Operations received so far, in order.
    #[must_use]
    pub fn operations(&self) -> Vec<Operation> {
        self.state.lock().calls.iter().map(MockCall::operation).collect()
    }

    /// Number of calls received for `operation`.
    #[must_use]
    pub fn count(&self, operation: Operation) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|call| call.operation() == operation)
            .count()
    }

    /// Codes passed to `GetErrorString`, in order.
    #[must_use]
    pub fn error_lookups(&self) -> Vec<i32> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                MockCall::GetErrorString(request) => Some(request.error_code),
                _ => None,
            })
            .collect()
    }

    /// Names of tasks that exist on the simulated server.
    #[must_use]
    pub fn active_tasks(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state.lock().tasks.keys().cloned().collect();
        names.sort();
        names
    }
}

fn status_of(outcome: std::result::Result<(), i32>) -> i32 {
    outcome.err().unwrap_or(0)
}

impl DaqmxApi for MockDaqmx {
    fn create_task(&mut self, request: CreateTaskRequest) -> Result<CreateTaskResponse> {
        let mut state = self.state.lock();
        let status = match state.intercept(MockCall::CreateTask(request.clone()))? {
            Some(status) => status,
            None => status_of(state.create_task(&request)),
        };
        Ok(CreateTaskResponse {
            status,
            task: (status == 0).then(|| Session {
                name: request.session_name,
            }),
            new_session_initialized: status == 0,
        })
    }

    fn clear_task(&mut self, request: ClearTaskRequest) -> Result<ClearTaskResponse> {
        let mut state = self.state.lock();
        let status = match state.intercept(MockCall::ClearTask(request.clone()))? {
            Some(status) => status,
            None => status_of(state.clear_task(&request)),
        };
        Ok(ClearTaskResponse { status })
    }

    fn create_ai_voltage_chan(
        &mut self,
        request: CreateAiVoltageChanRequest,
    ) -> Result<CreateAiVoltageChanResponse> {
        let mut state = self.state.lock();
        let status = match state.intercept(MockCall::CreateAiVoltageChan(request.clone()))? {
            Some(status) => status,
            None => status_of(state.create_channel(&request)),
        };
        Ok(CreateAiVoltageChanResponse { status })
    }

    fn cfg_samp_clk_timing(
        &mut self,
        request: CfgSampClkTimingRequest,
    ) -> Result<CfgSampClkTimingResponse> {
        let mut state = self.state.lock();
        let status = match state.intercept(MockCall::CfgSampClkTiming(request.clone()))? {
            Some(status) => status,
            None => status_of(state.configure_clock(&request)),
        };
        Ok(CfgSampClkTimingResponse { status })
    }

    fn start_task(&mut self, request: StartTaskRequest) -> Result<StartTaskResponse> {
        let mut state = self.state.lock();
        let status = match state.intercept(MockCall::StartTask(request.clone()))? {
            Some(status) => status,
            None => status_of(state.start_task(&request)),
        };
        Ok(StartTaskResponse { status })
    }

    fn get_task_attribute_uint32(
        &mut self,
        request: GetTaskAttributeUInt32Request,
    ) -> Result<GetTaskAttributeUInt32Response> {
        let mut state = self.state.lock();
        if let Some(status) = state.intercept(MockCall::GetTaskAttributeUInt32(request.clone()))? {
            return Ok(GetTaskAttributeUInt32Response { status, value: 0 });
        }
        Ok(match state.attribute(&request) {
            Ok(value) => GetTaskAttributeUInt32Response { status: 0, value },
            Err(status) => GetTaskAttributeUInt32Response { status, value: 0 },
        })
    }

    fn read_analog_f64(&mut self, request: ReadAnalogF64Request) -> Result<ReadAnalogF64Response> {
        let mut state = self.state.lock();
        if let Some(status) = state.intercept(MockCall::ReadAnalogF64(request.clone()))? {
            return Ok(ReadAnalogF64Response {
                status,
                ..Default::default()
            });
        }
        Ok(match state.read(&request) {
            Ok((read_array, samps_per_chan_read)) => ReadAnalogF64Response {
                status: 0,
                read_array,
                samps_per_chan_read,
            },
            Err(status) => ReadAnalogF64Response {
                status,
                ..Default::default()
            },
        })
    }

    fn get_error_string(
        &mut self,
        request: GetErrorStringRequest,
    ) -> Result<GetErrorStringResponse> {
        let mut state = self.state.lock();
        if let Some(status) = state.intercept(MockCall::GetErrorString(request.clone()))? {
            return Ok(GetErrorStringResponse {
                status,
                error_string: String::new(),
            });
        }
        Ok(GetErrorStringResponse {
            status: 0,
            error_string: state.error_string(request.error_code),
        })
    }
}

/// Expand a DAQmx physical channel list into individual channel names.
///
/// Accepts comma-separated entries with optional ranges:
/// `Dev1/ai0`, `Dev1/ai0:3`, `Dev1/ai0, Dev2/ai1:2`. Returns `None` when any
/// entry is malformed.
pub fn expand_physical_channels(spec: &str) -> Option<Vec<String>> {
    let mut channels = Vec::new();

    for entry in spec.split(',').map(str::trim) {
        let (device, line) = entry.rsplit_once('/')?;
        if device.is_empty() {
            return None;
        }

        let (first, last) = match line.split_once(':') {
            Some((first, last)) => (first, last),
            None => (line, line),
        };
        let digits_at = first.find(|c: char| c.is_ascii_digit())?;
        let (prefix, first_index) = first.split_at(digits_at);
        if prefix.is_empty() {
            return None;
        }
        let first_index: u32 = first_index.parse().ok()?;
        let last_index: u32 = last.trim_start_matches(prefix).parse().ok()?;

        let indices: Box<dyn Iterator<Item = u32>> = if first_index <= last_index {
            Box::new(first_index..=last_index)
        } else {
            Box::new((last_index..=first_index).rev())
        };
        channels.extend(indices.map(|index| format!("{device}/{prefix}{index}")));
    }

    Some(channels)
}
