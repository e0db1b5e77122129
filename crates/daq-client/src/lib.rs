//! Client for acquisition tasks on a remote NI-DAQmx gRPC device server.
//!
//! The crate drives one analog input task through its whole lifecycle:
//! create, configure channel and sample clock, start, read, and release.
//! Every device call is status-checked; nonzero statuses are resolved to
//! text on the server and surfaced as typed errors.
//!
//! # Modules
//!
//! - [`session`]: [`RemoteSession`] lifecycle with exactly-once release
//! - [`api`]: [`DaqmxApi`] service boundary and the blocking [`GrpcDaqmx`] client
//! - [`status`]: status checking and `GetErrorString` resolution
//! - [`config`]: [`AcquisitionConfig`] loaded with Figment
//! - [`connection`]: device server addresses and channel settings
//! - [`mock`]: in-process simulated device server
//!
//! # Example
//!
//! ```no_run
//! use daq_client::{AcquisitionConfig, DeviceAddress, GrpcDaqmx, RemoteSession};
//!
//! let address = DeviceAddress::parse("localhost:31763")?;
//! let api = GrpcDaqmx::connect(&address)?;
//!
//! let samples = RemoteSession::scoped(api, "Dev1/ai0", AcquisitionConfig::default(), |session| {
//!     session.configure()?;
//!     session.start()?;
//!     session.read()
//! })?;
//! println!("Read {} Samples.", samples.len());
//! # Ok::<(), daq_client::ClientError>(())
//! ```

pub mod api;
pub mod buffer;
pub mod config;
pub mod connection;
pub mod error;
pub mod mock;
pub mod session;
pub mod status;

pub use api::{DaqmxApi, GrpcDaqmx};
pub use buffer::SampleBuffer;
pub use config::{AcquisitionConfig, ConfigError};
pub use connection::{ChannelConfig, DeviceAddress};
pub use error::{ClientError, RemoteOperationError, Result};
pub use mock::MockDaqmx;
pub use session::{RemoteSession, SessionState};
pub use status::Operation;
