//! Error types for the k10ls-core library.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for k10ls operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error for the library.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration could not be loaded or is invalid.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A cluster client could not be created.
    #[error("Cluster client error: {0}")]
    ClientInit(#[from] ClientInitError),

    /// A target could not be resolved to a pod.
    #[error("Resolution error: {0}")]
    Resolution(#[from] ResolutionError),

    /// A tunnel failed to open or terminated.
    #[error("Tunnel error: {0}")]
    Tunnel(#[from] TunnelError),
}

/// Malformed or unreadable configuration. Fatal before any session starts.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// A cluster client could not be built for one context.
#[derive(Error, Debug)]
pub enum ClientInitError {
    #[error("Failed to load kubeconfig {path}: {message}")]
    Kubeconfig { path: PathBuf, message: String },

    #[error("Context {context} not usable: {message}")]
    Context { context: String, message: String },

    #[error("In-cluster configuration unavailable: {0}")]
    InCluster(String),

    #[error("Failed to create client: {0}")]
    Client(String),
}

/// Failure to turn a target into a pod. Recoverable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("service {name} not found in namespace {namespace}")]
    NotFound { name: String, namespace: String },

    #[error("service {name} has no selector")]
    NoSelector { name: String },

    #[error("no pods found matching {query} in namespace {namespace}")]
    NoMembers { query: String, namespace: String },

    #[error("cluster request failed: {0}")]
    Cluster(String),
}

/// Failure of a tunnel, while opening or while active. Recoverable.
#[derive(Error, Debug)]
pub enum TunnelError {
    #[error("failed to bind {address}:{port}: {source}")]
    Bind {
        address: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("pod {pod} is not running (phase: {phase})")]
    PodNotRunning { pod: String, phase: String },

    #[error("port-forward to {pod} failed: {message}")]
    Upstream { pod: String, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("tunnel closed by remote")]
    Closed,
}

impl TunnelError {
    /// Returns true if the failure is a local bind conflict.
    pub fn is_bind_conflict(&self) -> bool {
        matches!(
            self,
            Self::Bind { source, .. } if source.kind() == std::io::ErrorKind::AddrInUse
        )
    }
}

/// Failure of a raw read call against the cluster.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ClusterError(pub String);

impl From<ClusterError> for ResolutionError {
    fn from(err: ClusterError) -> Self {
        ResolutionError::Cluster(err.0)
    }
}

impl From<kube::Error> for ClusterError {
    fn from(err: kube::Error) -> Self {
        ClusterError(err.to_string())
    }
}
