//! k10ls Core Library
//!
//! Keeps Kubernetes port-forwards alive. Each configured target (a pod, a
//! service or a label selector) gets its own supervised session that
//! resolves the target to a pod, opens local listeners and retries on a
//! fixed delay whenever anything fails, until shutdown.
//!
//! # Architecture
//! This library follows hexagonal architecture (ports & adapters):
//! - `domain`: Targets, sessions and precedence rules
//! - `ports`: Trait definitions (cluster reads, tunnels)
//! - `adapters`: `kube`-based implementations
//! - `application`: Resolver, supervisor and dispatcher

// Hexagonal architecture layers
pub mod adapters;
pub mod application;
pub mod domain;
pub mod ports;

pub mod config;
pub mod engine;
pub mod error;

// Re-export domain types (primary API)
pub use domain::{
    PortMapping, ResolvedEndpoint, SessionSpec, SessionState, SessionStatus, Target, TargetKind,
};

// Re-export other commonly used types
pub use application::{SessionHandle, ShutdownReport};
pub use config::{Config, ConfigStore};
pub use engine::{Engine, ForwardEngine, SessionView, DEFAULT_SHUTDOWN_GRACE};
pub use error::{Error, Result};
