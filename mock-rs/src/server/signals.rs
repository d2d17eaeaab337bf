//! OS signal source for a running server
//!
//! SIGHUP reloads, SIGINT/SIGTERM stop. Where unix signals are unavailable
//! only Ctrl-C is forwarded; reloads go through `POST /_reload` instead.

use super::lifecycle::{ServerEvent, ServerHandle};
use crate::errors::Result;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Forward process signals to `handle` until the server stops
#[cfg(unix)]
pub fn forward_os_signals(handle: ServerHandle) -> Result<JoinHandle<()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup())?;
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;

    Ok(tokio::spawn(async move {
        loop {
            let (name, event) = tokio::select! {
                Some(()) = hangup.recv() => ("SIGHUP", ServerEvent::Reload),
                Some(()) = interrupt.recv() => ("SIGINT", ServerEvent::Stop),
                Some(()) = terminate.recv() => ("SIGTERM", ServerEvent::Stop),
                else => break,
            };

            info!("Received {}", name);
            if handle.send(event).is_err() {
                debug!("Server gone, no longer forwarding signals");
                break;
            }
        }
    }))
}

#[cfg(not(unix))]
pub fn forward_os_signals(handle: ServerHandle) -> Result<JoinHandle<()>> {
    Ok(tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl-C");
            if handle.send(ServerEvent::Stop).is_err() {
                debug!("Server gone, no longer forwarding signals");
                break;
            }
        }
    }))
}
