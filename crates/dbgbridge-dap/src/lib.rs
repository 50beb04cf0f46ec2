//! dbgbridge-dap: Debug Adapter Protocol client and the debug session
//! facade the control server is written against.
//!
//! Protocol types, message framing, the adapter connection, session
//! lifecycle and breakpoint bookkeeping live here. [`DebugSession`] is
//! the seam: [`DapDebugSession`] drives a real adapter and
//! [`facade::mock::MockDebugSession`] stands in for it in tests.

pub mod backend;
pub mod breakpoint;
pub mod capabilities;
pub mod client;
pub mod connection;
pub mod error;
pub mod facade;
pub mod protocol;
pub mod session;
pub mod transport;

pub use backend::DapDebugSession;
pub use breakpoint::{Breakpoint, BreakpointManager};
pub use capabilities::DapCapabilities;
pub use client::DapClient;
pub use connection::DapConnection;
pub use error::DapError;
pub use facade::{
    BreakpointSpec, DebugSession, FrameLocation, SessionBreakpoint, SessionEvent, StackTrace,
};
pub use session::{DapSession, SessionState};
