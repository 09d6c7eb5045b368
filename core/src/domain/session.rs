//! Session domain model: lifecycle state, status snapshots and the
//! override precedence applied when a session is created.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::target::{PortMapping, ResolvedEndpoint, Target, TargetKind};

/// Bind address used when no layer sets one.
pub const DEFAULT_ADDRESS: &str = "0.0.0.0";

/// Namespace used when no layer sets one.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    #[default]
    Idle,
    Resolving,
    Connecting,
    Active,
    Disconnected,
    Cancelled,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Resolving => "resolving",
            Self::Connecting => "connecting",
            Self::Active => "active",
            Self::Disconnected => "disconnected",
            Self::Cancelled => "cancelled",
        }
    }

    /// `Cancelled` is the only state a session never leaves.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything fixed about a session at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSpec {
    pub id: Uuid,
    pub context: String,
    pub target: Target,
    /// Effective namespace after precedence.
    pub namespace: String,
    /// Effective bind address after precedence.
    pub address: String,
}

impl SessionSpec {
    /// Builds a spec, applying namespace and address precedence once.
    pub fn new(
        context: impl Into<String>,
        target: Target,
        context_namespace: Option<&str>,
        context_address: Option<&str>,
        global_address: Option<&str>,
    ) -> Self {
        let namespace = effective_namespace(target.namespace.as_deref(), context_namespace);
        let address = effective_address(
            target.address.as_deref(),
            context_address,
            global_address,
        );
        Self {
            id: Uuid::new_v4(),
            context: context.into(),
            target,
            namespace,
            address,
        }
    }

    pub fn ports(&self) -> &[PortMapping] {
        &self.target.ports
    }

    /// Human-readable label, e.g. `staging:svc/web`.
    pub fn label(&self) -> String {
        format!("{}:{}", self.context, self.target.kind)
    }

    /// kubectl command for this target before resolution. Label selectors
    /// have no kubectl equivalent until a pod is picked.
    pub fn kubectl_command(&self) -> Option<String> {
        match &self.target.kind {
            TargetKind::LabelSelector(_) => None,
            kind => Some(equivalent_command(
                &self.context,
                &self.namespace,
                &kind.to_string(),
                self.ports(),
                &self.address,
            )),
        }
    }
}

/// Runtime status of one session, published on every transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStatus {
    pub id: Uuid,
    pub state: SessionState,
    /// Number of resolve/connect attempts started so far.
    pub attempt: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<ResolvedEndpoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl SessionStatus {
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            state: SessionState::Idle,
            attempt: 0,
            endpoint: None,
            last_error: None,
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

/// Target → context → global → `0.0.0.0`.
pub fn effective_address(
    target: Option<&str>,
    context: Option<&str>,
    global: Option<&str>,
) -> String {
    non_empty(target)
        .or_else(|| non_empty(context))
        .or_else(|| non_empty(global))
        .unwrap_or(DEFAULT_ADDRESS)
        .to_string()
}

/// Target → context → `default`.
pub fn effective_namespace(target: Option<&str>, context: Option<&str>) -> String {
    non_empty(target)
        .or_else(|| non_empty(context))
        .unwrap_or(DEFAULT_NAMESPACE)
        .to_string()
}

/// The kubectl invocation that would open the same tunnel. Log output only.
///
/// `resource` is a kubectl resource reference such as `pod/api-0`.
pub fn equivalent_command(
    context: &str,
    namespace: &str,
    resource: &str,
    ports: &[PortMapping],
    address: &str,
) -> String {
    let ports = ports
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(" ");
    format!(
        "kubectl --context {} -n {} port-forward {} {} --address {}",
        context, namespace, resource, ports, address
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_precedence() {
        assert_eq!(
            effective_address(Some("10.0.0.1"), Some("127.0.0.1"), Some("0.0.0.0")),
            "10.0.0.1"
        );
        assert_eq!(
            effective_address(None, Some("127.0.0.1"), Some("0.0.0.0")),
            "127.0.0.1"
        );
        assert_eq!(effective_address(None, None, Some("192.168.1.5")), "192.168.1.5");
        assert_eq!(effective_address(None, None, None), "0.0.0.0");
    }

    #[test]
    fn test_empty_strings_are_unset() {
        assert_eq!(effective_address(Some(""), Some(""), Some("::1")), "::1");
        assert_eq!(effective_namespace(Some(""), Some("")), "default");
    }

    #[test]
    fn test_namespace_precedence() {
        assert_eq!(effective_namespace(Some("team"), Some("apps")), "team");
        assert_eq!(effective_namespace(None, Some("apps")), "apps");
        assert_eq!(effective_namespace(None, None), "default");
    }

    #[test]
    fn test_session_spec_applies_precedence() {
        let target = Target::new(
            TargetKind::Service("web".to_string()),
            vec![PortMapping::new(9000, 80)],
        )
        .with_namespace("frontend");
        let spec = SessionSpec::new("staging", target, Some("apps"), Some("127.0.0.1"), None);

        assert_eq!(spec.namespace, "frontend");
        assert_eq!(spec.address, "127.0.0.1");
        assert_eq!(spec.label(), "staging:svc/web");
    }

    #[test]
    fn test_equivalent_command() {
        let cmd = equivalent_command(
            "staging",
            "apps",
            "pod/api-0",
            &[PortMapping::new(8080, 8081), PortMapping::new(9090, 9090)],
            "127.0.0.1",
        );
        assert_eq!(
            cmd,
            "kubectl --context staging -n apps port-forward pod/api-0 8080:8081 9090:9090 --address 127.0.0.1"
        );
    }

    #[test]
    fn test_kubectl_command_before_resolution() {
        let svc = SessionSpec::new(
            "dev",
            Target::new(
                TargetKind::Service("web".to_string()),
                vec![PortMapping::new(9000, 80)],
            ),
            None,
            None,
            None,
        );
        assert_eq!(
            svc.kubectl_command().unwrap(),
            "kubectl --context dev -n default port-forward svc/web 9000:80 --address 0.0.0.0"
        );

        let label = SessionSpec::new(
            "dev",
            Target::new(
                TargetKind::LabelSelector("app=db".to_string()),
                vec![PortMapping::new(5432, 5432)],
            ),
            None,
            None,
            None,
        );
        assert_eq!(label.kubectl_command(), None);
    }

    #[test]
    fn test_only_cancelled_is_terminal() {
        assert!(SessionState::Cancelled.is_terminal());
        assert!(!SessionState::Disconnected.is_terminal());
        assert_eq!(SessionState::Active.to_string(), "active");
    }
}
