pub mod launcher;
pub mod logging;
pub mod protocol;
pub mod schemas;
pub mod session;

pub use launcher::{build_launch_spec, build_launch_spec_for, LaunchSpec, Platform};
pub use logging::log_tool_call;
pub use protocol::{ToolDescriptor, ToolOutput};
pub use schemas::tool_schemas;
pub use session::{
    McpSession, SessionError, SessionLauncher, SessionOptions, StdioLauncher, ToolSession,
};
