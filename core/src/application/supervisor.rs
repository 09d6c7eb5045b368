//! Session supervision: the resolve → connect → forward → retry loop that
//! keeps one target's tunnel alive for the life of the process.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::resolver::EndpointResolver;
use crate::domain::{equivalent_command, ResolvedEndpoint, SessionSpec, SessionState, SessionStatus};
use crate::error::{Error, TunnelError};
use crate::ports::{ClusterReader, TunnelChannel, TunnelProvider};

/// Delay between a failed attempt and the next one.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// How one attempt ended.
enum Exit {
    Cancelled,
    Failed(Error),
}

/// Observer side of a running session.
#[derive(Clone)]
pub struct SessionHandle {
    spec: Arc<SessionSpec>,
    status: watch::Receiver<SessionStatus>,
    cancel: CancellationToken,
}

impl SessionHandle {
    pub fn spec(&self) -> &SessionSpec {
        &self.spec
    }

    /// Latest published status.
    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    /// Cancels this session only.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Waits until the session publishes `state`. Returns the matching status,
    /// or `None` if the session ended first.
    pub async fn wait_for(&self, state: SessionState) -> Option<SessionStatus> {
        let mut rx = self.status.clone();
        loop {
            {
                let current = rx.borrow_and_update();
                if current.state == state {
                    return Some(current.clone());
                }
            }
            rx.changed().await.ok()?;
        }
    }
}

/// Drives one session until cancelled.
pub struct SessionSupervisor<C: ClusterReader, P: TunnelProvider<C>> {
    spec: Arc<SessionSpec>,
    resolver: EndpointResolver<C>,
    tunnels: Arc<P>,
    retry_delay: Duration,
    cancel: CancellationToken,
    status: watch::Sender<SessionStatus>,
}

impl<C: ClusterReader, P: TunnelProvider<C>> SessionSupervisor<C, P> {
    /// Creates a supervisor and the handle used to observe it.
    pub fn new(
        spec: SessionSpec,
        resolver: EndpointResolver<C>,
        tunnels: Arc<P>,
        retry_delay: Duration,
        cancel: CancellationToken,
    ) -> (Self, SessionHandle) {
        let spec = Arc::new(spec);
        let (status, rx) = watch::channel(SessionStatus::new(spec.id));
        let handle = SessionHandle {
            spec: Arc::clone(&spec),
            status: rx,
            cancel: cancel.clone(),
        };
        let supervisor = Self {
            spec,
            resolver,
            tunnels,
            retry_delay,
            cancel,
            status,
        };
        (supervisor, handle)
    }

    /// Runs until cancelled and returns the final status.
    ///
    /// Every failure is logged and followed by a retry after the fixed delay;
    /// there is no attempt cap.
    pub async fn run(self) -> SessionStatus {
        info!(
            context = %self.spec.context,
            target = %self.spec.target.kind,
            namespace = %self.spec.namespace,
            address = %self.spec.address,
            "Session started"
        );

        while !self.cancel.is_cancelled() {
            match self.attempt().await {
                Exit::Cancelled => break,
                Exit::Failed(err) => {
                    let attempt = self.status.borrow().attempt;
                    warn!(
                        context = %self.spec.context,
                        target = %self.spec.target.kind,
                        namespace = %self.spec.namespace,
                        attempt,
                        error = %err,
                        retry_in = ?self.retry_delay,
                        "Port-forward failed"
                    );
                    self.transition(SessionState::Disconnected, |s| {
                        s.last_error = Some(err.to_string());
                    });

                    tokio::select! {
                        _ = self.cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.retry_delay) => {}
                    }
                }
            }
        }

        self.transition(SessionState::Cancelled, |_| {});
        info!(
            context = %self.spec.context,
            target = %self.spec.target.kind,
            "Session cancelled"
        );
        self.status.borrow().clone()
    }

    async fn attempt(&self) -> Exit {
        self.transition(SessionState::Resolving, |s| {
            s.attempt += 1;
            s.endpoint = None;
        });

        let resolved = tokio::select! {
            _ = self.cancel.cancelled() => return Exit::Cancelled,
            resolved = self.resolver.resolve(&self.spec.namespace, &self.spec.target) => resolved,
        };
        let endpoint = match resolved {
            Ok(endpoint) => endpoint,
            Err(err) => return Exit::Failed(err.into()),
        };
        if self.spec.target.kind.needs_lookup() {
            debug!(
                context = %self.spec.context,
                target = %self.spec.target.kind,
                pod = %endpoint.pod,
                "Target resolved"
            );
        }

        self.transition(SessionState::Connecting, |s| {
            s.endpoint = Some(endpoint.clone());
        });

        let client = self.resolver.client();
        let opened = tokio::select! {
            _ = self.cancel.cancelled() => return Exit::Cancelled,
            opened = self.tunnels.open(
                client.as_ref(),
                &endpoint,
                &self.spec.address,
                self.spec.ports(),
            ) => opened,
        };
        let channel = match opened {
            Ok(channel) => channel,
            Err(err) => return Exit::Failed(err.into()),
        };

        self.transition(SessionState::Active, |s| {
            s.last_error = None;
        });
        self.log_active(&endpoint, &channel);

        match channel.forward(self.cancel.clone()).await {
            Ok(()) if self.cancel.is_cancelled() => Exit::Cancelled,
            Ok(()) => Exit::Failed(TunnelError::Closed.into()),
            Err(err) => Exit::Failed(err.into()),
        }
    }

    fn log_active(&self, endpoint: &ResolvedEndpoint, channel: &P::Channel) {
        let local = channel
            .local_addrs()
            .iter()
            .map(|a| a.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        let ports = self
            .spec
            .ports()
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join(" ");

        info!(
            context = %self.spec.context,
            target = %self.spec.target.kind,
            pod = %endpoint.pod,
            namespace = %endpoint.namespace,
            local = %local,
            ports = %ports,
            "Started port-forward"
        );
        info!(
            command = %equivalent_command(
                &self.spec.context,
                &endpoint.namespace,
                &format!("pod/{}", endpoint.pod),
                self.spec.ports(),
                &self.spec.address,
            ),
            "Equivalent kubectl command"
        );
    }

    fn transition(&self, state: SessionState, update: impl FnOnce(&mut SessionStatus)) {
        let mut attempt = 0;
        self.status.send_modify(|status| {
            status.state = state;
            update(status);
            attempt = status.attempt;
        });
        info!(
            context = %self.spec.context,
            target = %self.spec.target.kind,
            namespace = %self.spec.namespace,
            attempt,
            state = %state,
            "Session state changed"
        );
    }
}
