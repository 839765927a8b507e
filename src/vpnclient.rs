//! Connection lifecycle: handshake, tunnel, host adapter and relay.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{info, warn};

use crate::adapter::{self, Adapter};
use crate::client::{Established, VpnClient};
use crate::config::ClientSettings;
use crate::error::Result;
use crate::net::TlsSessionCache;
use crate::protocol::Session;
use crate::relay::relay;
use crate::tunnel::{spawn_tunnel, TunnelOptions};

/// A logged-in session with both adapters ready.
pub struct ActiveSession {
    pub session: Session,
    pub tunnel: Arc<dyn Adapter>,
    pub host: Arc<dyn Adapter>,
    dhcp_interface: Option<String>,
}

impl ActiveSession {
    /// Connect with `settings`, start the tunnel and create the host adapter.
    pub async fn establish(settings: &ClientSettings, cache: TlsSessionCache) -> Result<Self> {
        let mut client = VpnClient::new(settings.handshake.clone(), cache);
        let established = client.connect().await?;

        let mut tunnel = settings.tunnel.clone();
        tunnel.compress = established.session.use_compress;

        let host = adapter::create_host_adapter(
            &settings.adapter_name,
            settings.adapter_mac.as_deref(),
        )
        .await?;

        let mut active = match Self::start(established, tunnel, host.clone()).await {
            Ok(active) => active,
            Err(e) => {
                host.destroy().await;
                return Err(e);
            }
        };
        if settings.invoke_dhcp {
            active.dhcp_interface = Some(settings.adapter_name.clone());
        }
        Ok(active)
    }

    /// Start the tunnel over an established stream and pair it with `host`.
    pub async fn start<S>(
        established: Established<S>,
        options: TunnelOptions,
        host: Arc<dyn Adapter>,
    ) -> Result<Self>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let Established {
            session,
            stream,
            leftover,
        } = established;
        let tunnel = spawn_tunnel(stream, leftover, options).await?;
        info!(
            session = %session.session_name,
            adapter = host.name(),
            "Session ready"
        );
        Ok(Self {
            session,
            tunnel: Arc::new(tunnel),
            host,
            dhcp_interface: None,
        })
    }

    /// Relay frames until either side fails.
    pub async fn run(&self) -> Result<()> {
        if let Some(name) = self.dhcp_interface.clone() {
            tokio::spawn(async move {
                match adapter::invoke_dhcp(&name).await {
                    Ok(()) => info!(adapter = %name, "DHCP requested"),
                    Err(e) => warn!(adapter = %name, "DHCP request failed: {}", e),
                }
            });
        }
        relay(self.tunnel.clone(), self.host.clone()).await
    }

    /// Tear down both adapters.
    pub async fn shutdown(&self) {
        self.tunnel.destroy().await;
        self.host.destroy().await;
        info!("Session closed");
    }
}
