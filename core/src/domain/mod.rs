//! Domain layer - Pure business logic and data models.
//!
//! This module contains domain entities that represent core business concepts.
//! These types have no I/O dependencies and can be tested in isolation.

mod session;
mod target;

// Re-export all domain types
pub use session::{
    effective_address, effective_namespace, equivalent_command, SessionSpec, SessionState,
    SessionStatus, DEFAULT_ADDRESS, DEFAULT_NAMESPACE,
};
pub use target::{selector_query, PortMapping, ResolvedEndpoint, Target, TargetKind};
