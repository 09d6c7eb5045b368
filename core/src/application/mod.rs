//! Application layer - Forwarding use cases.
//!
//! Services here orchestrate domain logic through the `ports` traits:
//! - `resolver`: target descriptor to exactly one pod
//! - `supervisor`: the per-target retry loop
//! - `dispatcher`: one client per context, one supervisor per target

mod dispatcher;
mod resolver;
mod supervisor;

#[cfg(test)]
pub(crate) mod testing;

pub use dispatcher::{ContextFailure, Dispatcher, SessionGroup, ShutdownReport};
pub use resolver::EndpointResolver;
pub use supervisor::{SessionHandle, SessionSupervisor, DEFAULT_RETRY_DELAY};
