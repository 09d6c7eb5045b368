//! Tunnel channel port (interface).

use std::net::SocketAddr;

use tokio_util::sync::CancellationToken;

use crate::domain::{PortMapping, ResolvedEndpoint};
use crate::error::TunnelError;

/// An opened tunnel: local listeners are bound, nothing is forwarded yet.
pub trait TunnelChannel: Send + 'static {
    /// Local addresses the tunnel listens on, in port-mapping order.
    fn local_addrs(&self) -> Vec<SocketAddr>;

    /// Forwards traffic until the tunnel fails or `cancel` fires.
    ///
    /// Returns `Ok(())` only when cancelled. A tunnel that ends on its own
    /// always reports why, `TunnelError::Closed` at minimum.
    fn forward(
        self,
        cancel: CancellationToken,
    ) -> impl std::future::Future<Output = Result<(), TunnelError>> + Send;
}

/// Opens tunnels to resolved pods using a client of type `C`.
pub trait TunnelProvider<C>: Send + Sync + 'static {
    type Channel: TunnelChannel;

    /// Opens a tunnel to `endpoint`, binding every `ports[i].local` on `address`.
    fn open(
        &self,
        client: &C,
        endpoint: &ResolvedEndpoint,
        address: &str,
        ports: &[PortMapping],
    ) -> impl std::future::Future<Output = Result<Self::Channel, TunnelError>> + Send;
}
