//! Forwarding target domain model.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// What a target points at inside the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "kebab-case")]
pub enum TargetKind {
    /// A single pod, referenced by exact name.
    Pod(String),
    /// A service, resolved through its member selector.
    Service(String),
    /// Pods matched directly by a label query.
    LabelSelector(String),
}

impl TargetKind {
    /// Short resource prefix as used by kubectl (`pod`, `svc`, `label`).
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Pod(_) => "pod",
            Self::Service(_) => "svc",
            Self::LabelSelector(_) => "label",
        }
    }

    /// The name or query carried by the variant.
    pub fn value(&self) -> &str {
        match self {
            Self::Pod(v) | Self::Service(v) | Self::LabelSelector(v) => v,
        }
    }

    /// Whether resolving this kind needs a call to the cluster.
    pub fn needs_lookup(&self) -> bool {
        !matches!(self, Self::Pod(_))
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.prefix(), self.value())
    }
}

/// A local to remote port pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortMapping {
    pub local: u16,
    pub remote: u16,
}

impl PortMapping {
    pub fn new(local: u16, remote: u16) -> Self {
        Self { local, remote }
    }
}

impl fmt::Display for PortMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.local, self.remote)
    }
}

/// A declared forwarding target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub kind: TargetKind,
    /// Namespace override; falls back to the context namespace.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Bind address override; falls back to the context and global defaults.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    pub ports: Vec<PortMapping>,
}

impl Target {
    /// Creates a target without overrides.
    pub fn new(kind: TargetKind, ports: Vec<PortMapping>) -> Self {
        Self {
            kind,
            namespace: None,
            address: None,
            ports,
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }
}

/// The pod a target resolved to for one connection attempt.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResolvedEndpoint {
    pub pod: String,
    pub namespace: String,
}

impl ResolvedEndpoint {
    pub fn new(pod: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            pod: pod.into(),
            namespace: namespace.into(),
        }
    }
}

impl fmt::Display for ResolvedEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.pod)
    }
}

/// Formats a service selector as a label query (`a=1,b=2`).
///
/// Keys come out sorted, matching the Kubernetes `labels.Set` string form.
pub fn selector_query(selector: &BTreeMap<String, String>) -> String {
    selector
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_kind_display() {
        assert_eq!(TargetKind::Pod("api-0".to_string()).to_string(), "pod/api-0");
        assert_eq!(TargetKind::Service("web".to_string()).to_string(), "svc/web");
        assert_eq!(
            TargetKind::LabelSelector("app=db".to_string()).to_string(),
            "label/app=db"
        );
    }

    #[test]
    fn test_only_pods_skip_lookup() {
        assert!(!TargetKind::Pod("p".to_string()).needs_lookup());
        assert!(TargetKind::Service("s".to_string()).needs_lookup());
        assert!(TargetKind::LabelSelector("a=b".to_string()).needs_lookup());
    }

    #[test]
    fn test_selector_query_sorted() {
        let mut selector = BTreeMap::new();
        selector.insert("tier".to_string(), "backend".to_string());
        selector.insert("app".to_string(), "web".to_string());
        assert_eq!(selector_query(&selector), "app=web,tier=backend");
        assert_eq!(selector_query(&BTreeMap::new()), "");
    }

    #[test]
    fn test_port_mapping_display() {
        assert_eq!(PortMapping::new(8080, 80).to_string(), "8080:80");
    }
}
