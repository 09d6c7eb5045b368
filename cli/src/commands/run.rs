//! Run command - start every session and keep them alive until a signal.

use std::time::Duration;

use anyhow::{Context, Result};
use k10ls_core::{Config, ForwardEngine};
use tracing::{info, warn};

pub async fn run(config: Config, grace: Duration) -> Result<()> {
    // Handlers go in before any context connects.
    let signals = Signals::install()?;
    let engine = ForwardEngine::new(config);

    info!("k10ls starting, press Ctrl+C to stop");
    let shutdown = async move {
        let signal = signals.recv().await;
        info!(signal, "Shutting down");
    };

    let report = engine.run_until(shutdown, grace).await;
    if report.aborted > 0 || report.panicked > 0 {
        warn!(
            aborted = report.aborted,
            panicked = report.panicked,
            "Shutdown was not clean"
        );
    }
    Ok(())
}

#[cfg(unix)]
struct Signals {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl Signals {
    fn install() -> Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            interrupt: signal(SignalKind::interrupt()).context("failed to install SIGINT handler")?,
            terminate: signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?,
        })
    }

    async fn recv(mut self) -> &'static str {
        tokio::select! {
            _ = self.interrupt.recv() => "SIGINT",
            _ = self.terminate.recv() => "SIGTERM",
        }
    }
}

#[cfg(windows)]
struct Signals(tokio::signal::windows::CtrlC);

#[cfg(windows)]
impl Signals {
    fn install() -> Result<Self> {
        let ctrl_c = tokio::signal::windows::ctrl_c().context("failed to install Ctrl+C handler")?;
        Ok(Self(ctrl_c))
    }

    async fn recv(mut self) -> &'static str {
        self.0.recv().await;
        "Ctrl+C"
    }
}
