//! Endpoint resolution: target descriptor to a single pod.

use std::sync::Arc;

use tracing::debug;

use crate::domain::{selector_query, ResolvedEndpoint, Target, TargetKind};
use crate::error::ResolutionError;
use crate::ports::ClusterReader;

/// Resolves targets against one cluster context.
///
/// Multi-member results resolve to the first pod in listing order. No
/// readiness filtering and no rotation across retries.
pub struct EndpointResolver<C: ClusterReader> {
    client: Arc<C>,
}

impl<C: ClusterReader> Clone for EndpointResolver<C> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
        }
    }
}

impl<C: ClusterReader> EndpointResolver<C> {
    pub fn new(client: Arc<C>) -> Self {
        Self { client }
    }

    /// Returns the shared client.
    pub fn client(&self) -> &Arc<C> {
        &self.client
    }

    /// Resolves `target` in `namespace` to exactly one pod.
    pub async fn resolve(
        &self,
        namespace: &str,
        target: &Target,
    ) -> Result<ResolvedEndpoint, ResolutionError> {
        match &target.kind {
            TargetKind::Pod(name) => Ok(ResolvedEndpoint::new(name.as_str(), namespace)),
            TargetKind::Service(name) => self.resolve_service(namespace, name).await,
            TargetKind::LabelSelector(query) => self.first_matching(namespace, query).await,
        }
    }

    async fn resolve_service(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<ResolvedEndpoint, ResolutionError> {
        let service = self
            .client
            .get_service(namespace, name)
            .await?
            .ok_or_else(|| ResolutionError::NotFound {
                name: name.to_string(),
                namespace: namespace.to_string(),
            })?;

        if service.selector.is_empty() {
            return Err(ResolutionError::NoSelector {
                name: name.to_string(),
            });
        }

        let query = selector_query(&service.selector);
        debug!(service = name, selector = %query, "Resolving service members");
        self.first_matching(namespace, &query).await
    }

    async fn first_matching(
        &self,
        namespace: &str,
        query: &str,
    ) -> Result<ResolvedEndpoint, ResolutionError> {
        let pods = self.client.list_pods(namespace, query).await?;
        let pod = pods
            .into_iter()
            .next()
            .ok_or_else(|| ResolutionError::NoMembers {
                query: query.to_string(),
                namespace: namespace.to_string(),
            })?;
        Ok(ResolvedEndpoint::new(pod, namespace))
    }
}
