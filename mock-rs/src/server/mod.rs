//! Server lifecycle and its event sources

mod lifecycle;
mod signals;

pub use lifecycle::{MockServer, ServerEvent, ServerHandle, ServerState};
pub use signals::forward_os_signals;
