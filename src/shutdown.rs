// src/shutdown.rs
// Signal handling: the first signal drains the server, a second one exits at once

use actix_web::dev::ServerHandle;
use futures_util::StreamExt;
use signal_hook::consts::{SIGHUP, SIGINT, SIGTERM};
use signal_hook_tokio::{Handle, Signals};
use std::io;
use std::time::Duration;

/// How long in-flight requests get once a stop was requested.
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

pub const SHUTDOWN_SIGNALS: [i32; 3] = [SIGINT, SIGTERM, SIGHUP];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    Graceful,
    Force,
}

/// What the `received`-th shutdown signal (counting from 1) asks for.
pub fn action_for(received: usize) -> SignalAction {
    if received <= 1 {
        SignalAction::Graceful
    } else {
        SignalAction::Force
    }
}

pub struct ShutdownManager {
    signal_handle: Option<Handle>,
}

impl ShutdownManager {
    /// Start listening for shutdown signals on behalf of `server`.
    pub fn install(server: ServerHandle) -> io::Result<Self> {
        let signals = Signals::new(SHUTDOWN_SIGNALS)?;
        let signal_handle = signals.handle();
        tokio::spawn(watch_signals(signals, server));

        Ok(Self {
            signal_handle: Some(signal_handle),
        })
    }

    /// Stop listening; pending signals are dropped.
    pub fn close(&mut self) {
        if let Some(handle) = self.signal_handle.take() {
            handle.close();
        }
    }
}

impl Drop for ShutdownManager {
    fn drop(&mut self) {
        self.close();
    }
}

async fn watch_signals(mut signals: Signals, server: ServerHandle) {
    let logger = crate::logger::get_logger();
    let mut received = 0;

    while let Some(signal) = signals.next().await {
        received += 1;
        log::debug!("received signal {}", signal);

        match action_for(received) {
            SignalAction::Graceful => {
                logger.shutdown_message();
                let server = server.clone();
                tokio::spawn(async move { server.stop(true).await });
            }
            SignalAction::Force => {
                logger.force_shutdown_message();
                std::process::exit(1);
            }
        }
    }
}
