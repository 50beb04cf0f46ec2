//! dbgbridge-server: the HTTP control endpoint, breakpoint registry and
//! event correlator.
//!
//! Handlers translate query parameters into [`DebugSession`] calls and
//! registry updates. The [`EventCorrelator`] watches session stops and
//! fires the callbacks registered for the stopped location.
//!
//! [`DebugSession`]: dbgbridge_dap::DebugSession

pub mod callback;
pub mod correlator;
pub mod error;
pub mod handlers;
pub mod registry;
pub mod router;

pub use callback::{CallbackSender, HttpCallbackSender};
pub use correlator::{CorrelatorState, EventCorrelator};
pub use error::{ApiError, CallbackError};
pub use handlers::AppState;
pub use registry::{Breakpoint, BreakpointRegistry, CallbackRegistration};
pub use router::{router, serve};
