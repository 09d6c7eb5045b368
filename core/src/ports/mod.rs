//! Ports layer - Trait definitions (interfaces).
//!
//! This module defines the interfaces that the application layer uses
//! to interact with external systems. Implementations live in `adapters`.

mod cluster;
mod tunnel;

pub use cluster::{ClientFactory, ClusterReader, ServiceGroup};
pub use tunnel::{TunnelChannel, TunnelProvider};
