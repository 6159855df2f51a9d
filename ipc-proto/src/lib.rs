//! IPC wire protocol for the hive orchestrator: request + response envelope.
//!
//! One connection carries exactly one request object and one response object.
//! This crate defines the wire shapes only; it does not depend on the
//! orchestrator runtime. Tool servers and the hub both build against it.

pub mod request;
pub mod response;

pub use request::{parse_request, IpcRequest, RequestParseError};
pub use response::IpcResponse;
