//! Kubernetes API adapters built on `kube`.

mod client;
mod tunnel;

#[cfg(test)]
mod testing;

pub use client::{KubeClientFactory, KubeCluster};
pub use tunnel::{bind_listeners, KubeTunnel, KubeTunnelProvider, POD_CHECK_INTERVAL};
