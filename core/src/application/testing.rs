//! In-memory cluster and tunnel fakes shared by the application tests.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::domain::{PortMapping, ResolvedEndpoint};
use crate::error::{ClientInitError, ClusterError, TunnelError};
use crate::ports::{ClientFactory, ClusterReader, ServiceGroup, TunnelChannel, TunnelProvider};

/// Cluster with fixed services and pod listings.
#[derive(Default)]
pub struct FakeCluster {
    services: HashMap<(String, String), BTreeMap<String, String>>,
    pods: HashMap<(String, String), Vec<String>>,
    failure: Option<String>,
    calls: AtomicUsize,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_service(mut self, namespace: &str, name: &str, selector: &[(&str, &str)]) -> Self {
        let selector = selector
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.services
            .insert((namespace.to_string(), name.to_string()), selector);
        self
    }

    pub fn with_pods(mut self, namespace: &str, query: &str, pods: &[&str]) -> Self {
        self.pods.insert(
            (namespace.to_string(), query.to_string()),
            pods.iter().map(|p| p.to_string()).collect(),
        );
        self
    }

    pub fn failing(mut self, message: &str) -> Self {
        self.failure = Some(message.to_string());
        self
    }

    /// Number of read calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn record_call(&self) -> Result<(), ClusterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.failure {
            Some(message) => Err(ClusterError(message.clone())),
            None => Ok(()),
        }
    }
}

impl ClusterReader for FakeCluster {
    async fn get_service(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ServiceGroup>, ClusterError> {
        self.record_call()?;
        Ok(self
            .services
            .get(&(namespace.to_string(), name.to_string()))
            .map(|selector| ServiceGroup {
                name: name.to_string(),
                selector: selector.clone(),
            }))
    }

    async fn list_pods(&self, namespace: &str, label_query: &str) -> Result<Vec<String>, ClusterError> {
        self.record_call()?;
        Ok(self
            .pods
            .get(&(namespace.to_string(), label_query.to_string()))
            .cloned()
            .unwrap_or_default())
    }
}

/// Hands out clones of prepared clusters keyed by context name.
#[derive(Default)]
pub struct FakeFactory {
    clusters: HashMap<String, Arc<FakeCluster>>,
    hanging: HashSet<String>,
    connects: Mutex<Vec<(Option<PathBuf>, String)>>,
}

impl FakeFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_context(mut self, name: &str, cluster: FakeCluster) -> Self {
        self.clusters.insert(name.to_string(), Arc::new(cluster));
        self
    }

    /// `connect` for this context never completes.
    pub fn with_hanging_context(mut self, name: &str) -> Self {
        self.hanging.insert(name.to_string());
        self
    }

    pub fn cluster(&self, name: &str) -> Arc<FakeCluster> {
        Arc::clone(&self.clusters[name])
    }

    pub fn connects(&self) -> Vec<(Option<PathBuf>, String)> {
        self.connects.lock().clone()
    }
}

/// Shares one `FakeCluster` between the factory and the test.
pub struct SharedCluster(pub Arc<FakeCluster>);

impl ClusterReader for SharedCluster {
    async fn get_service(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ServiceGroup>, ClusterError> {
        self.0.get_service(namespace, name).await
    }

    async fn list_pods(&self, namespace: &str, label_query: &str) -> Result<Vec<String>, ClusterError> {
        self.0.list_pods(namespace, label_query).await
    }
}

impl ClientFactory for FakeFactory {
    type Client = SharedCluster;

    async fn connect(
        &self,
        credentials: Option<&Path>,
        context: &str,
    ) -> Result<SharedCluster, ClientInitError> {
        self.connects
            .lock()
            .push((credentials.map(Path::to_path_buf), context.to_string()));
        if self.hanging.contains(context) {
            return std::future::pending().await;
        }
        self.clusters
            .get(context)
            .map(|cluster| SharedCluster(Arc::clone(cluster)))
            .ok_or_else(|| ClientInitError::Context {
                context: context.to_string(),
                message: "context not found in kubeconfig".to_string(),
            })
    }
}

/// What a fake tunnel does on one open call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    /// `open` fails.
    FailOpen,
    /// `open` never completes.
    HangOpen,
    /// `open` succeeds, `forward` fails straight away.
    CloseImmediately,
    /// `open` succeeds, `forward` runs until cancelled.
    Hold,
}

/// One recorded `open` call.
#[derive(Debug, Clone)]
pub struct OpenRecord {
    pub pod: String,
    pub address: String,
    pub ports: Vec<PortMapping>,
    pub at: Instant,
}

#[derive(Default)]
struct Stats {
    opens: Mutex<Vec<OpenRecord>>,
    active: AtomicUsize,
    cancelled: AtomicUsize,
}

/// Tunnel provider driven by a per-pod script. The last step of a script repeats.
pub struct FakeTunnels {
    scripts: Mutex<HashMap<String, VecDeque<Behavior>>>,
    fallback: Behavior,
    stats: Arc<Stats>,
}

impl FakeTunnels {
    pub fn new(fallback: Behavior) -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            fallback,
            stats: Arc::new(Stats::default()),
        }
    }

    pub fn with_script(self, pod: &str, steps: &[Behavior]) -> Self {
        self.scripts
            .lock()
            .insert(pod.to_string(), steps.iter().copied().collect());
        self
    }

    pub fn opens(&self) -> Vec<OpenRecord> {
        self.stats.opens.lock().clone()
    }

    /// Channels currently inside `forward`.
    pub fn active(&self) -> usize {
        self.stats.active.load(Ordering::SeqCst)
    }

    /// Channels whose `forward` returned because of cancellation.
    pub fn cancelled(&self) -> usize {
        self.stats.cancelled.load(Ordering::SeqCst)
    }

    fn next_behavior(&self, pod: &str) -> Behavior {
        let mut scripts = self.scripts.lock();
        match scripts.get_mut(pod) {
            Some(steps) if steps.len() > 1 => steps.pop_front().unwrap_or(self.fallback),
            Some(steps) => steps.front().copied().unwrap_or(self.fallback),
            None => self.fallback,
        }
    }
}

pub struct FakeChannel {
    behavior: Behavior,
    addrs: Vec<SocketAddr>,
    stats: Arc<Stats>,
}

impl TunnelChannel for FakeChannel {
    fn local_addrs(&self) -> Vec<SocketAddr> {
        self.addrs.clone()
    }

    async fn forward(self, cancel: CancellationToken) -> Result<(), TunnelError> {
        if self.behavior == Behavior::CloseImmediately {
            return Err(TunnelError::Closed);
        }
        self.stats.active.fetch_add(1, Ordering::SeqCst);
        cancel.cancelled().await;
        self.stats.active.fetch_sub(1, Ordering::SeqCst);
        self.stats.cancelled.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl<C: Send + Sync + 'static> TunnelProvider<C> for FakeTunnels {
    type Channel = FakeChannel;

    async fn open(
        &self,
        _client: &C,
        endpoint: &ResolvedEndpoint,
        address: &str,
        ports: &[PortMapping],
    ) -> Result<FakeChannel, TunnelError> {
        self.stats.opens.lock().push(OpenRecord {
            pod: endpoint.pod.clone(),
            address: address.to_string(),
            ports: ports.to_vec(),
            at: Instant::now(),
        });

        let behavior = self.next_behavior(&endpoint.pod);
        match behavior {
            Behavior::FailOpen => Err(TunnelError::Upstream {
                pod: endpoint.pod.clone(),
                message: "unable to upgrade connection".to_string(),
            }),
            Behavior::HangOpen => std::future::pending().await,
            Behavior::CloseImmediately | Behavior::Hold => {
                let ip = address
                    .parse::<IpAddr>()
                    .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
                Ok(FakeChannel {
                    behavior,
                    addrs: ports.iter().map(|p| SocketAddr::new(ip, p.local)).collect(),
                    stats: Arc::clone(&self.stats),
                })
            }
        }
    }
}
