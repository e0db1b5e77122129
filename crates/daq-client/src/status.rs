//! DAQmx status checking and error-string resolution.
//!
//! Every NI-DAQmx response carries an `i32` status: zero is success, anything
//! else is a device error code. A nonzero status is resolved with a second
//! call, `GetErrorString`, and turned into a [`RemoteOperationError`] carrying
//! both the code and the resolved text.
//!
//! The lookup is never itself status-checked through this path, so a failing
//! lookup cannot recurse; it degrades to a fallback message and the original
//! code is kept.

use std::fmt;

use daq_proto::nidaqmx::{
    CfgSampClkTimingResponse, ClearTaskResponse, CreateAiVoltageChanResponse, CreateTaskResponse,
    GetErrorStringRequest, GetTaskAttributeUInt32Response, ReadAnalogF64Response,
    StartTaskResponse,
};
use tracing::{error, warn};

use crate::api::DaqmxApi;
use crate::error::{RemoteOperationError, Result};

/// NI-DAQmx RPCs issued by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `CreateTask`
    CreateTask,
    /// `ClearTask`
    ClearTask,
    /// `CreateAIVoltageChan`
    CreateAiVoltageChan,
    /// `CfgSampClkTiming`
    CfgSampClkTiming,
    /// `StartTask`
    StartTask,
    /// `GetTaskAttributeUInt32`
    GetTaskAttributeUInt32,
    /// `ReadAnalogF64`
    ReadAnalogF64,
    /// `GetErrorString`
    GetErrorString,
}

impl Operation {
    /// Every RPC, in lifecycle order.
    pub const ALL: [Operation; 8] = [
        Self::CreateTask,
        Self::CreateAiVoltageChan,
        Self::CfgSampClkTiming,
        Self::StartTask,
        Self::GetTaskAttributeUInt32,
        Self::ReadAnalogF64,
        Self::ClearTask,
        Self::GetErrorString,
    ];

    /// The RPC name as declared by the device server.
    #[must_use]
    pub fn rpc_name(self) -> &'static str {
        match self {
            Self::CreateTask => "CreateTask",
            Self::ClearTask => "ClearTask",
            Self::CreateAiVoltageChan => "CreateAIVoltageChan",
            Self::CfgSampClkTiming => "CfgSampClkTiming",
            Self::StartTask => "StartTask",
            Self::GetTaskAttributeUInt32 => "GetTaskAttributeUInt32",
            Self::ReadAnalogF64 => "ReadAnalogF64",
            Self::GetErrorString => "GetErrorString",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.rpc_name())
    }
}

/// Responses that carry a DAQmx status code.
pub trait DaqmxStatus {
    /// Raw status; zero means success.
    fn status(&self) -> i32;
}

macro_rules! impl_daqmx_status {
    ($($response:ty),* $(,)?) => {
        $(
            impl DaqmxStatus for $response {
                fn status(&self) -> i32 {
                    self.status
                }
            }
        )*
    };
}

impl_daqmx_status!(
    CreateTaskResponse,
    ClearTaskResponse,
    CreateAiVoltageChanResponse,
    CfgSampClkTimingResponse,
    StartTaskResponse,
    GetTaskAttributeUInt32Response,
    ReadAnalogF64Response,
);

/// Check a response status, resolving and raising it when nonzero.
///
/// The resolved message is logged at `error` level before the failure is
/// returned to the caller.
pub fn check_status<A: DaqmxApi + ?Sized>(
    api: &mut A,
    session: &str,
    operation: Operation,
    status: i32,
) -> Result<()> {
    if status == 0 {
        return Ok(());
    }

    let message = resolve_error_string(api, status);
    error!(
        session,
        operation = %operation,
        code = status,
        message = %message,
        "DAQmx call failed"
    );

    Err(RemoteOperationError {
        operation,
        code: status,
        message,
    }
    .into())
}

/// Look up the description of a DAQmx status code.
///
/// Never fails: a lookup that cannot be completed is logged and yields a
/// fallback message naming the code.
pub fn resolve_error_string<A: DaqmxApi + ?Sized>(api: &mut A, code: i32) -> String {
    match api.get_error_string(GetErrorStringRequest { error_code: code }) {
        Ok(response) if response.status == 0 && !response.error_string.is_empty() => {
            response.error_string
        }
        Ok(response) if response.status == 0 => {
            format!("DAQmx status {code} (no description available)")
        }
        Ok(response) => {
            warn!(
                code,
                lookup_status = response.status,
                "GetErrorString reported a failure"
            );
            format!(
                "DAQmx status {code} (GetErrorString returned status {})",
                response.status
            )
        }
        Err(err) => {
            warn!(code, error = %err, "Failed to resolve DAQmx error string");
            format!("DAQmx status {code} (error lookup failed: {err})")
        }
    }
}
