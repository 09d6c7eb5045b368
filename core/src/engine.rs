//! k10ls Engine - Entry point that ties configuration, cluster adapters
//! and session dispatching together.
//!
//! The CLI loads a [`Config`], builds a [`ForwardEngine`] and hands it a
//! shutdown signal through [`Engine::run_until`]. Callers that drive the
//! lifecycle themselves use [`Engine::start`] and [`Engine::shutdown`], and
//! can poll [`Engine::statuses`] in between.

use std::future::Future;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::adapters::{KubeClientFactory, KubeTunnelProvider};
use crate::application::{Dispatcher, SessionGroup, SessionHandle, ShutdownReport};
use crate::config::{Config, ConfigStore};
use crate::domain::{SessionSpec, SessionStatus};
use crate::error::Result;
use crate::ports::{ClientFactory, TunnelProvider};

/// Default time given to sessions to stop after a shutdown request.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Engine wired to the real cluster adapters.
pub type ForwardEngine = Engine<KubeClientFactory, KubeTunnelProvider>;

/// One session's spec with its latest status.
#[derive(Debug, Clone)]
pub struct SessionView {
    pub spec: SessionSpec,
    pub status: SessionStatus,
}

/// Runs every configured session until shut down.
pub struct Engine<F: ClientFactory, P: TunnelProvider<F::Client>> {
    config: Config,
    dispatcher: Dispatcher<F, P>,
    /// Root token of the current run; replaced on every `start`.
    shutdown: Mutex<CancellationToken>,

    // State (protected by locks for thread safety)
    handles: RwLock<Vec<SessionHandle>>,
    failed_contexts: RwLock<Vec<String>>,
    group: Mutex<Option<SessionGroup>>,
}

impl ForwardEngine {
    /// Create an engine using kubeconfig-based clients and API tunnels.
    pub fn new(config: Config) -> Self {
        Engine::with_adapters(config, KubeClientFactory::new(), KubeTunnelProvider::new())
    }

    /// Load configuration from `store` and create an engine.
    pub async fn load(store: &ConfigStore) -> Result<Self> {
        let config = store.load().await?;
        Ok(Self::new(config))
    }
}

impl<F, P> Engine<F, P>
where
    F: ClientFactory,
    P: TunnelProvider<F::Client>,
{
    pub fn with_adapters(config: Config, factory: F, tunnels: P) -> Self {
        Self {
            config,
            dispatcher: Dispatcher::new(factory, tunnels),
            shutdown: Mutex::new(CancellationToken::new()),
            handles: RwLock::new(Vec::new()),
            failed_contexts: RwLock::new(Vec::new()),
            group: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Sessions that `start` would launch.
    pub fn plan(&self) -> Vec<SessionSpec> {
        self.config.plan()
    }

    /// Whether the engine has been started and not yet shut down.
    pub fn is_running(&self) -> bool {
        self.group.lock().is_some()
    }

    /// Launch all sessions. Returns the number started.
    ///
    /// Contexts whose client cannot be built are skipped; when every context
    /// fails the engine still counts as running with zero sessions, and only
    /// `shutdown` ends it. Calling it again while running is a no-op. After a
    /// shutdown it starts over with a fresh cancellation token.
    pub async fn start(&self) -> usize {
        if self.is_running() {
            return self.handles.read().len();
        }

        let token = CancellationToken::new();
        *self.shutdown.lock() = token.clone();
        let group = self.dispatcher.dispatch(&self.config, &token).await;

        let failed: Vec<String> = group
            .failed_contexts()
            .iter()
            .map(|f| f.context.clone())
            .collect();
        if group.is_empty() && !failed.is_empty() {
            error!(
                contexts = ?failed,
                "No context could be initialized, no sessions running"
            );
        }

        let started = group.len();
        *self.failed_contexts.write() = failed;
        *self.handles.write() = group.handles().to_vec();
        *self.group.lock() = Some(group);

        info!(sessions = started, "Engine started");
        started
    }

    /// Starts the engine and runs until `signal` completes, then shuts down.
    ///
    /// `signal` is polled from the start, so a request that arrives while
    /// contexts are still connecting stops the engine without waiting for
    /// dispatch to finish.
    pub async fn run_until<S>(&self, signal: S, grace: Duration) -> ShutdownReport
    where
        S: Future<Output = ()>,
    {
        tokio::pin!(signal);

        tokio::select! {
            _ = self.start() => {
                (&mut signal).await;
            }
            _ = &mut signal => {
                info!("Shutdown requested during startup");
            }
        }

        self.shutdown(grace).await
    }

    /// Contexts skipped because their client could not be created.
    pub fn failed_contexts(&self) -> Vec<String> {
        self.failed_contexts.read().clone()
    }

    /// Spec and latest status of every running session.
    pub fn statuses(&self) -> Vec<SessionView> {
        self.handles
            .read()
            .iter()
            .map(|h| SessionView {
                spec: h.spec().clone(),
                status: h.status(),
            })
            .collect()
    }

    /// Cancel every session and wait up to `grace` for them to stop.
    pub async fn shutdown(&self, grace: Duration) -> ShutdownReport {
        self.shutdown.lock().cancel();
        let group = self.group.lock().take();

        match group {
            Some(group) => {
                let report = group.shutdown(grace).await;
                if report.aborted > 0 {
                    warn!(aborted = report.aborted, "Some sessions were aborted");
                }
                report
            }
            None => ShutdownReport::default(),
        }
    }
}
