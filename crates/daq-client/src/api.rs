//! NI-DAQmx service interface and its gRPC implementation.
//!
//! [`DaqmxApi`] is the boundary between session logic and the transport. Its
//! methods are synchronous: each call blocks until the device server answers
//! or the transport fails. An `Err` from any method is a transport failure;
//! device failures arrive as `Ok` responses with a nonzero `status`.
//!
//! [`GrpcDaqmx`] implements the trait over a tonic channel, driving each RPC
//! to completion on a private current-thread Tokio runtime. It must not be
//! used from inside another Tokio runtime.

use std::sync::Arc;
use std::time::Duration;

use daq_proto::nidaqmx::{
    ni_da_qmx_client::NiDaQmxClient, CfgSampClkTimingRequest, CfgSampClkTimingResponse,
    ClearTaskRequest, ClearTaskResponse, CreateAiVoltageChanRequest, CreateAiVoltageChanResponse,
    CreateTaskRequest, CreateTaskResponse, GetErrorStringRequest, GetErrorStringResponse,
    GetTaskAttributeUInt32Request, GetTaskAttributeUInt32Response, ReadAnalogF64Request,
    ReadAnalogF64Response, StartTaskRequest, StartTaskResponse,
};
use tokio::runtime::Runtime;
use tonic::transport::{Channel, Endpoint};
use tracing::{debug, info};

use crate::connection::{AddressError, ChannelConfig, DeviceAddress};
use crate::error::{ClientError, Result};

/// Maximum decoded message size (read arrays of several channels × 1M samples)
const MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

/// Request/response access to the NI-DAQmx device server.
pub trait DaqmxApi {
    /// `CreateTask`
    fn create_task(&mut self, request: CreateTaskRequest) -> Result<CreateTaskResponse>;

    /// `ClearTask`
    fn clear_task(&mut self, request: ClearTaskRequest) -> Result<ClearTaskResponse>;

    /// `CreateAIVoltageChan`
    fn create_ai_voltage_chan(
        &mut self,
        request: CreateAiVoltageChanRequest,
    ) -> Result<CreateAiVoltageChanResponse>;

    /// `CfgSampClkTiming`
    fn cfg_samp_clk_timing(
        &mut self,
        request: CfgSampClkTimingRequest,
    ) -> Result<CfgSampClkTimingResponse>;

    /// `StartTask`
    fn start_task(&mut self, request: StartTaskRequest) -> Result<StartTaskResponse>;

    /// `GetTaskAttributeUInt32`
    fn get_task_attribute_uint32(
        &mut self,
        request: GetTaskAttributeUInt32Request,
    ) -> Result<GetTaskAttributeUInt32Response>;

    /// `ReadAnalogF64`
    fn read_analog_f64(&mut self, request: ReadAnalogF64Request) -> Result<ReadAnalogF64Response>;

    /// `GetErrorString`
    fn get_error_string(
        &mut self,
        request: GetErrorStringRequest,
    ) -> Result<GetErrorStringResponse>;
}

macro_rules! forward_daqmx_api {
    ($($method:ident($request:ty) -> $response:ty;)*) => {
        $(
            fn $method(&mut self, request: $request) -> Result<$response> {
                (**self).$method(request)
            }
        )*
    };
}

macro_rules! impl_daqmx_api_for_pointer {
    ($($pointer:ty),*) => {
        $(
            impl<T: DaqmxApi + ?Sized> DaqmxApi for $pointer {
                forward_daqmx_api! {
                    create_task(CreateTaskRequest) -> CreateTaskResponse;
                    clear_task(ClearTaskRequest) -> ClearTaskResponse;
                    create_ai_voltage_chan(CreateAiVoltageChanRequest) -> CreateAiVoltageChanResponse;
                    cfg_samp_clk_timing(CfgSampClkTimingRequest) -> CfgSampClkTimingResponse;
                    start_task(StartTaskRequest) -> StartTaskResponse;
                    get_task_attribute_uint32(GetTaskAttributeUInt32Request) -> GetTaskAttributeUInt32Response;
                    read_analog_f64(ReadAnalogF64Request) -> ReadAnalogF64Response;
                    get_error_string(GetErrorStringRequest) -> GetErrorStringResponse;
                }
            }
        )*
    };
}

impl_daqmx_api_for_pointer!(&mut T, Box<T>);

/// Blocking gRPC client for the NI-DAQmx device server.
///
/// Cloning is cheap; clones share the runtime and the underlying HTTP/2
/// connection, so several sessions can be driven over one connection (each
/// from a single thread at a time).
#[derive(Clone, Debug)]
pub struct GrpcDaqmx {
    runtime: Arc<Runtime>,
    client: NiDaQmxClient<Channel>,
    config: ChannelConfig,
}

impl GrpcDaqmx {
    /// Connect to the device server with default channel configuration.
    pub fn connect(address: &DeviceAddress) -> Result<Self> {
        Self::connect_with_config(address, ChannelConfig::default())
    }

    /// Connect with custom channel configuration.
    pub fn connect_with_config(address: &DeviceAddress, config: ChannelConfig) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(ClientError::Runtime)?;

        // Per-call deadlines are set on each request; reads need a longer one
        let endpoint = Endpoint::from_shared(address.as_str().to_string())
            .map_err(|e| AddressError::InvalidUrl(e.to_string()))?
            .connect_timeout(config.connect_timeout)
            .http2_keep_alive_interval(config.keepalive_interval)
            .keep_alive_timeout(config.keepalive_timeout)
            .keep_alive_while_idle(config.keepalive_while_idle);

        debug!(address = %address, "Connecting to NI-DAQmx device server");
        let channel = runtime.block_on(endpoint.connect())?;
        info!(address = %address, "Connected to NI-DAQmx device server");

        Ok(Self {
            runtime: Arc::new(runtime),
            client: NiDaQmxClient::new(channel).max_decoding_message_size(MAX_MESSAGE_SIZE),
            config,
        })
    }

    fn request<T>(&self, message: T, deadline: Option<Duration>) -> tonic::Request<T> {
        let mut request = tonic::Request::new(message);
        if let Some(deadline) = deadline {
            request.set_timeout(deadline);
        }
        request
    }
}

macro_rules! grpc_call {
    ($self:ident, $method:ident, $request:expr, $deadline:expr) => {{
        let request = $self.request($request, $deadline);
        let response = $self.runtime.block_on($self.client.$method(request))?;
        Ok(response.into_inner())
    }};
}

impl DaqmxApi for GrpcDaqmx {
    fn create_task(&mut self, request: CreateTaskRequest) -> Result<CreateTaskResponse> {
        let deadline = Some(self.config.request_timeout);
        grpc_call!(self, create_task, request, deadline)
    }

    fn clear_task(&mut self, request: ClearTaskRequest) -> Result<ClearTaskResponse> {
        let deadline = Some(self.config.request_timeout);
        grpc_call!(self, clear_task, request, deadline)
    }

    fn create_ai_voltage_chan(
        &mut self,
        request: CreateAiVoltageChanRequest,
    ) -> Result<CreateAiVoltageChanResponse> {
        let deadline = Some(self.config.request_timeout);
        grpc_call!(self, create_ai_voltage_chan, request, deadline)
    }

    fn cfg_samp_clk_timing(
        &mut self,
        request: CfgSampClkTimingRequest,
    ) -> Result<CfgSampClkTimingResponse> {
        let deadline = Some(self.config.request_timeout);
        grpc_call!(self, cfg_samp_clk_timing, request, deadline)
    }

    fn start_task(&mut self, request: StartTaskRequest) -> Result<StartTaskResponse> {
        let deadline = Some(self.config.request_timeout);
        grpc_call!(self, start_task, request, deadline)
    }

    fn get_task_attribute_uint32(
        &mut self,
        request: GetTaskAttributeUInt32Request,
    ) -> Result<GetTaskAttributeUInt32Response> {
        let deadline = Some(self.config.request_timeout);
        grpc_call!(self, get_task_attribute_u_int32, request, deadline)
    }

    fn read_analog_f64(&mut self, request: ReadAnalogF64Request) -> Result<ReadAnalogF64Response> {
        let deadline = self.config.read_deadline(request.timeout);
        grpc_call!(self, read_analog_f64, request, deadline)
    }

    fn get_error_string(
        &mut self,
        request: GetErrorStringRequest,
    ) -> Result<GetErrorStringResponse> {
        let deadline = Some(self.config.request_timeout);
        grpc_call!(self, get_error_string, request, deadline)
    }
}
