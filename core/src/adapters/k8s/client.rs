//! Cluster client construction and read-only lookups.

use std::path::Path;

use k8s_openapi::api::core::v1::{Pod, Service};
use kube::api::{Api, ListParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use tracing::debug;

use crate::error::{ClientInitError, ClusterError};
use crate::ports::{ClientFactory, ClusterReader, ServiceGroup};

/// Builds `kube` clients from a kubeconfig file, or from the in-cluster
/// service account when no file is given.
#[derive(Debug, Clone, Copy, Default)]
pub struct KubeClientFactory;

impl KubeClientFactory {
    pub fn new() -> Self {
        Self
    }

    async fn load_config(
        &self,
        credentials: Option<&Path>,
        context: &str,
    ) -> Result<Config, ClientInitError> {
        let Some(path) = credentials else {
            debug!(context, "No kubeconfig, using in-cluster configuration");
            return Config::incluster().map_err(|e| ClientInitError::InCluster(e.to_string()));
        };

        let kubeconfig = Kubeconfig::read_from(path).map_err(|e| ClientInitError::Kubeconfig {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let options = KubeConfigOptions {
            context: Some(context.to_string()),
            ..Default::default()
        };

        Config::from_custom_kubeconfig(kubeconfig, &options)
            .await
            .map_err(|e| ClientInitError::Context {
                context: context.to_string(),
                message: e.to_string(),
            })
    }
}

impl ClientFactory for KubeClientFactory {
    type Client = KubeCluster;

    async fn connect(
        &self,
        credentials: Option<&Path>,
        context: &str,
    ) -> Result<KubeCluster, ClientInitError> {
        let config = self.load_config(credentials, context).await?;
        debug!(context, cluster_url = %config.cluster_url, "Creating cluster client");
        let client = Client::try_from(config).map_err(|e| ClientInitError::Client(e.to_string()))?;
        Ok(KubeCluster::new(client))
    }
}

/// One context's API client. `kube::Client` is cheap to clone and safe to
/// share across tasks.
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

impl ClusterReader for KubeCluster {
    async fn get_service(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ServiceGroup>, ClusterError> {
        let services: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        let service = services.get_opt(name).await?;

        Ok(service.map(|svc| ServiceGroup {
            name: name.to_string(),
            selector: svc.spec.and_then(|spec| spec.selector).unwrap_or_default(),
        }))
    }

    async fn list_pods(&self, namespace: &str, label_query: &str) -> Result<Vec<String>, ClusterError> {
        let params = ListParams::default().labels(label_query);
        let pods = self.pods(namespace).list(&params).await?;

        Ok(pods
            .items
            .into_iter()
            .filter_map(|pod| pod.metadata.name)
            .collect())
    }
}
