//! Dispatching: one client per context, one supervised session per target.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::{timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::resolver::EndpointResolver;
use super::supervisor::{SessionHandle, SessionSupervisor};
use crate::config::Config;
use crate::domain::{SessionState, SessionStatus};
use crate::error::ClientInitError;
use crate::ports::{ClientFactory, TunnelProvider};

/// A context whose client could not be built. Its targets are skipped.
#[derive(Debug)]
pub struct ContextFailure {
    pub context: String,
    pub error: ClientInitError,
}

/// Outcome of [`SessionGroup::shutdown`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Sessions that reached `Cancelled` within the grace period.
    pub cancelled: usize,
    /// Sessions still running at the deadline, aborted.
    pub aborted: usize,
    /// Session tasks that panicked.
    pub panicked: usize,
}

/// All sessions launched by one dispatch.
pub struct SessionGroup {
    tasks: JoinSet<SessionStatus>,
    handles: Vec<SessionHandle>,
    failed: Vec<ContextFailure>,
    shutdown: CancellationToken,
}

impl SessionGroup {
    pub fn handles(&self) -> &[SessionHandle] {
        &self.handles
    }

    pub fn failed_contexts(&self) -> &[ContextFailure] {
        &self.failed
    }

    /// Number of running sessions.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Latest status of every session, in launch order.
    pub fn statuses(&self) -> Vec<SessionStatus> {
        self.handles.iter().map(SessionHandle::status).collect()
    }

    /// Cancels every session without waiting.
    pub fn cancel(&self) {
        self.shutdown.cancel();
    }

    /// Cancels every session and waits up to `grace` for them to finish.
    /// Stragglers are aborted.
    pub async fn shutdown(mut self, grace: Duration) -> ShutdownReport {
        self.shutdown.cancel();
        let deadline = Instant::now() + grace;
        let mut report = ShutdownReport::default();

        loop {
            match timeout_at(deadline, self.tasks.join_next()).await {
                Ok(Some(Ok(status))) => {
                    if status.state == SessionState::Cancelled {
                        report.cancelled += 1;
                    }
                }
                Ok(Some(Err(err))) => {
                    if err.is_panic() {
                        error!(error = %err, "Session task panicked");
                        report.panicked += 1;
                    }
                }
                Ok(None) => break,
                Err(_) => {
                    report.aborted = self.tasks.len();
                    warn!(
                        remaining = report.aborted,
                        grace = ?grace,
                        "Sessions did not stop in time, aborting"
                    );
                    self.tasks.shutdown().await;
                    break;
                }
            }
        }

        info!(
            cancelled = report.cancelled,
            aborted = report.aborted,
            "All sessions stopped"
        );
        report
    }
}

/// Launches sessions for every context and target in a [`Config`].
pub struct Dispatcher<F, P> {
    factory: F,
    tunnels: Arc<P>,
}

impl<F, P> Dispatcher<F, P>
where
    F: ClientFactory,
    P: TunnelProvider<F::Client>,
{
    pub fn new(factory: F, tunnels: P) -> Self {
        Self {
            factory,
            tunnels: Arc::new(tunnels),
        }
    }

    pub fn tunnels(&self) -> &Arc<P> {
        &self.tunnels
    }

    /// Connects each context and spawns one supervisor per target.
    ///
    /// Client-initialization failures are recorded per context and never
    /// stop the other contexts. Every session gets a child of `shutdown`.
    pub async fn dispatch(&self, config: &Config, shutdown: &CancellationToken) -> SessionGroup {
        let mut group = SessionGroup {
            tasks: JoinSet::new(),
            handles: Vec::with_capacity(config.target_count()),
            failed: Vec::new(),
            shutdown: shutdown.clone(),
        };

        for context in &config.contexts {
            let credentials = config.credentials_for(context);
            info!(
                context = %context.name,
                targets = context.targets.len(),
                kubeconfig = ?credentials,
                "Connecting to context"
            );

            let client = match self
                .factory
                .connect(credentials.as_deref(), &context.name)
                .await
            {
                Ok(client) => Arc::new(client),
                Err(err) => {
                    error!(
                        context = %context.name,
                        error = %err,
                        "Failed to initialize client, skipping context"
                    );
                    group.failed.push(ContextFailure {
                        context: context.name.clone(),
                        error: err,
                    });
                    continue;
                }
            };

            let resolver = EndpointResolver::new(client);
            for spec in config.session_specs(context) {
                let (supervisor, handle) = SessionSupervisor::new(
                    spec,
                    resolver.clone(),
                    Arc::clone(&self.tunnels),
                    config.retry_delay,
                    shutdown.child_token(),
                );
                group.tasks.spawn(supervisor.run());
                group.handles.push(handle);
            }
        }

        info!(
            sessions = group.handles.len(),
            failed_contexts = group.failed.len(),
            "Dispatch complete"
        );
        group
    }
}
