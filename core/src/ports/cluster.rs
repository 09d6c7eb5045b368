//! Cluster access ports (interfaces).

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{ClientInitError, ClusterError};

/// A service as seen by the resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceGroup {
    pub name: String,
    /// Member selector; empty when the service selects nothing.
    pub selector: BTreeMap<String, String>,
}

/// Read-only access to one cluster context.
///
/// Implementations must support concurrent read calls from many sessions
/// through a shared reference: every method takes `&self` and nothing here
/// mutates cluster state, so callers share one instance behind an `Arc`
/// without any locking of their own.
pub trait ClusterReader: Send + Sync + 'static {
    /// Looks up a service by name. `Ok(None)` when it does not exist.
    fn get_service(
        &self,
        namespace: &str,
        name: &str,
    ) -> impl std::future::Future<Output = Result<Option<ServiceGroup>, ClusterError>> + Send;

    /// Lists pod names matching a label query, in the order the API returns them.
    fn list_pods(
        &self,
        namespace: &str,
        label_query: &str,
    ) -> impl std::future::Future<Output = Result<Vec<String>, ClusterError>> + Send;
}

/// Builds cluster clients, one per context.
pub trait ClientFactory: Send + Sync {
    type Client: ClusterReader;

    /// Creates a client bound to `context`.
    ///
    /// `credentials` is an explicit kubeconfig path; `None` means in-cluster
    /// configuration.
    fn connect(
        &self,
        credentials: Option<&Path>,
        context: &str,
    ) -> impl std::future::Future<Output = Result<Self::Client, ClientInitError>> + Send;
}
