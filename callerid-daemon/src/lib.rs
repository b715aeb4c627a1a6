//! Caller-id daemon: request bridge, sync orchestration, call screening and
//! the socket runtime that serves them.

pub mod bridge;
mod error;
pub mod orchestrator;
pub mod protocol;
mod runtime;
pub mod screening;

pub use bridge::{CallerIdBridge, CallerListOutcome};
pub use error::{BridgeError, DaemonError};
pub use orchestrator::{
    CapabilityGate, KeepAlive, KeepAliveToken, StaticGate, SyncHandle, SyncOrchestrator,
};
pub use protocol::{request, request_status, request_stop, send_request, DaemonRequest, DaemonResponse};
pub use runtime::{dispatch, run, start_blocking, DaemonState, LocalBridge};
pub use screening::{CallEvent, CallScreener, Notice};
