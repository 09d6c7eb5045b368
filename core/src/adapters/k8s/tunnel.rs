//! Tunnels over the pod `portforward` subresource.
//!
//! Each accepted local connection gets its own upstream stream. The tunnel
//! ends when a listener fails, an upstream stream cannot be opened, or the
//! pod stops running.

use std::net::SocketAddr;
use std::time::Duration;

use k8s_openapi::api::core::v1::Pod;
use kube::api::Api;
use tokio::io::{copy_bidirectional, AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::client::KubeCluster;
use crate::domain::{PortMapping, ResolvedEndpoint};
use crate::error::TunnelError;
use crate::ports::{TunnelChannel, TunnelProvider};

/// How often an active tunnel re-checks that its pod is still running.
pub const POD_CHECK_INTERVAL: Duration = Duration::from_secs(5);

const RUNNING: &str = "Running";

/// Binds one listener per mapping on `address`, in mapping order.
pub async fn bind_listeners(
    address: &str,
    ports: &[PortMapping],
) -> Result<Vec<(TcpListener, PortMapping)>, TunnelError> {
    let mut listeners = Vec::with_capacity(ports.len());
    for mapping in ports {
        let listener = TcpListener::bind((address, mapping.local))
            .await
            .map_err(|source| TunnelError::Bind {
                address: address.to_string(),
                port: mapping.local,
                source,
            })?;
        listeners.push((listener, *mapping));
    }
    Ok(listeners)
}

fn pod_phase(pod: &Pod) -> String {
    pod.status
        .as_ref()
        .and_then(|status| status.phase.clone())
        .unwrap_or_else(|| "Unknown".to_string())
}

/// Opens [`KubeTunnel`]s using a context's [`KubeCluster`].
#[derive(Debug, Clone)]
pub struct KubeTunnelProvider {
    pod_check_interval: Duration,
}

impl KubeTunnelProvider {
    pub fn new() -> Self {
        Self {
            pod_check_interval: POD_CHECK_INTERVAL,
        }
    }

    pub fn with_pod_check_interval(mut self, interval: Duration) -> Self {
        self.pod_check_interval = interval;
        self
    }
}

impl Default for KubeTunnelProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl TunnelProvider<KubeCluster> for KubeTunnelProvider {
    type Channel = KubeTunnel;

    async fn open(
        &self,
        client: &KubeCluster,
        endpoint: &ResolvedEndpoint,
        address: &str,
        ports: &[PortMapping],
    ) -> Result<KubeTunnel, TunnelError> {
        let pods = client.pods(&endpoint.namespace);
        let pod = pods.get(&endpoint.pod).await.map_err(|e| TunnelError::Upstream {
            pod: endpoint.pod.clone(),
            message: e.to_string(),
        })?;

        let phase = pod_phase(&pod);
        if phase != RUNNING {
            return Err(TunnelError::PodNotRunning {
                pod: endpoint.pod.clone(),
                phase,
            });
        }

        let listeners = bind_listeners(address, ports).await?;
        Ok(KubeTunnel {
            pods,
            pod: endpoint.pod.clone(),
            listeners,
            pod_check_interval: self.pod_check_interval,
        })
    }
}

/// An opened tunnel with its local listeners bound.
pub struct KubeTunnel {
    pods: Api<Pod>,
    pod: String,
    listeners: Vec<(TcpListener, PortMapping)>,
    pod_check_interval: Duration,
}

impl TunnelChannel for KubeTunnel {
    fn local_addrs(&self) -> Vec<SocketAddr> {
        self.listeners
            .iter()
            .filter_map(|(listener, _)| listener.local_addr().ok())
            .collect()
    }

    async fn forward(self, cancel: CancellationToken) -> Result<(), TunnelError> {
        let mut tasks = JoinSet::new();
        for (listener, mapping) in self.listeners {
            tasks.spawn(accept_loop(
                self.pods.clone(),
                self.pod.clone(),
                listener,
                mapping,
                cancel.clone(),
            ));
        }
        tasks.spawn(watch_pod(
            self.pods.clone(),
            self.pod.clone(),
            self.pod_check_interval,
            cancel.clone(),
        ));

        let outcome = tokio::select! {
            _ = cancel.cancelled() => None,
            joined = tasks.join_next() => joined,
        };
        tasks.shutdown().await;

        match outcome {
            None => Ok(()),
            Some(Ok(Ok(()))) if cancel.is_cancelled() => Ok(()),
            Some(Ok(Ok(()))) => Err(TunnelError::Closed),
            Some(Ok(Err(err))) => Err(err),
            Some(Err(join)) => Err(TunnelError::Upstream {
                pod: self.pod,
                message: join.to_string(),
            }),
        }
    }
}

async fn accept_loop(
    pods: Api<Pod>,
    pod: String,
    listener: TcpListener,
    mapping: PortMapping,
    cancel: CancellationToken,
) -> Result<(), TunnelError> {
    let mut connections = JoinSet::new();
    loop {
        let (socket, peer) = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            accepted = listener.accept() => accepted?,
        };
        while connections.try_join_next().is_some() {}
        trace!(%peer, pod = %pod, port = mapping.remote, "Accepted connection");

        let mut forwarder = pods
            .portforward(&pod, &[mapping.remote])
            .await
            .map_err(|e| TunnelError::Upstream {
                pod: pod.clone(),
                message: e.to_string(),
            })?;
        let upstream = forwarder
            .take_stream(mapping.remote)
            .ok_or_else(|| TunnelError::Upstream {
                pod: pod.clone(),
                message: format!("no stream for port {}", mapping.remote),
            })?;

        connections.spawn(async move {
            relay(socket, upstream, peer).await;
            if let Err(err) = forwarder.join().await {
                debug!(%peer, error = %err, "Port-forward stream ended with error");
            }
        });
    }
}

async fn relay<S>(mut socket: TcpStream, mut upstream: S, peer: SocketAddr)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match copy_bidirectional(&mut socket, &mut upstream).await {
        Ok((sent, received)) => trace!(%peer, sent, received, "Connection closed"),
        Err(err) => debug!(%peer, error = %err, "Connection closed with error"),
    }
}

async fn watch_pod(
    pods: Api<Pod>,
    pod: String,
    interval: Duration,
    cancel: CancellationToken,
) -> Result<(), TunnelError> {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            _ = ticker.tick() => {}
        }

        let current = pods.get_opt(&pod).await.map_err(|e| TunnelError::Upstream {
            pod: pod.clone(),
            message: e.to_string(),
        })?;
        match current {
            Some(p) if pod_phase(&p) == RUNNING => {}
            Some(p) => {
                return Err(TunnelError::PodNotRunning {
                    pod,
                    phase: pod_phase(&p),
                })
            }
            None => {
                return Err(TunnelError::Upstream {
                    message: "pod no longer exists".to_string(),
                    pod,
                })
            }
        }
    }
}
