//! DAP capabilities tracking.

use crate::protocol::Capabilities;

/// Resolved capabilities of the debug adapter, stored as plain booleans.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DapCapabilities {
    /// Whether the adapter supports `configurationDone`.
    pub supports_configuration_done_request: bool,
    /// Whether the adapter supports `setFunctionBreakpoints`.
    pub supports_function_breakpoints: bool,
    /// Whether the adapter supports conditional breakpoints.
    pub supports_conditional_breakpoints: bool,
    /// Whether the adapter supports log points.
    pub supports_log_points: bool,
    /// Whether the adapter supports the `terminate` request.
    pub supports_terminate_request: bool,
}

impl DapCapabilities {
    /// Build [`DapCapabilities`] from the protocol-level [`Capabilities`]
    /// returned by the adapter in the `initialize` response.
    pub fn from_initialize_response(caps: &Capabilities) -> Self {
        Self {
            supports_configuration_done_request: caps
                .supports_configuration_done_request
                .unwrap_or(false),
            supports_function_breakpoints: caps.supports_function_breakpoints.unwrap_or(false),
            supports_conditional_breakpoints: caps
                .supports_conditional_breakpoints
                .unwrap_or(false),
            supports_log_points: caps.supports_log_points.unwrap_or(false),
            supports_terminate_request: caps.supports_terminate_request.unwrap_or(false),
        }
    }
}
