//! Protocol buffer bindings for the NI-DAQmx gRPC device server.
//!
//! This crate contains the generated message types and client stub for the
//! `nidaqmx_grpc.NiDAQmx` service, restricted to the calls needed to run a
//! finite analog input acquisition:
//!
//! - `CreateTask` / `ClearTask`
//! - `CreateAIVoltageChan` / `CfgSampClkTiming`
//! - `StartTask` / `GetTaskAttributeUInt32`
//! - `ReadAnalogF64`
//! - `GetErrorString`
//!
//! Session logic lives in `daq-client`; this crate only carries the wire types.

#![allow(missing_docs)] // Generated code doesn't have docs

/// Generated NI-DAQmx protocol buffer types.
pub mod nidaqmx {
    tonic::include_proto!("nidaqmx_grpc");
}

// Re-export commonly used types at crate root
pub use nidaqmx::*;
