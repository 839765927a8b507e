//! SoftEther VPN client handshake.
//!
//! Drives one connection from TCP connect to an established session:
//! signature upload, hello, login and welcome. The resulting stream is
//! handed to the tunnel together with any bytes read past the welcome.

mod state;

pub use state::HandshakeState;

use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::net::{connect_tls, ConnectTarget, PackConnection, TlsSessionCache};
use crate::protocol::{Hello, LoginRequest, NodeInfo, Session, Watermark};

/// Everything needed to log in to one hub.
#[derive(Debug, Clone)]
pub struct HandshakeSettings {
    pub target: ConnectTarget,
    pub login: LoginRequest,
    pub watermark: Watermark,
    /// Upper bound on each server response.
    pub response_timeout: Duration,
}

/// A logged-in connection ready for tunnelling.
pub struct Established<S> {
    pub session: Session,
    pub stream: S,
    /// Bytes received after the welcome; they belong to the tunnel.
    pub leftover: Bytes,
}

/// SoftEther VPN client.
pub struct VpnClient {
    settings: HandshakeSettings,
    cache: TlsSessionCache,
    state: HandshakeState,
}

impl VpnClient {
    /// Create a client. The session cache is shared by every connection made
    /// with it and may be shared with other clients.
    pub fn new(settings: HandshakeSettings, cache: TlsSessionCache) -> Self {
        Self {
            settings,
            cache,
            state: HandshakeState::Disconnected,
        }
    }

    /// Get the current handshake state.
    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Connect over TLS and log in.
    pub async fn connect(&mut self) -> Result<Established<TlsStream<TcpStream>>> {
        // Local validation happens before any network I/O.
        self.settings.login.validate()?;

        info!(
            server = %self.settings.target.host,
            port = self.settings.target.port,
            hub = %self.settings.login.hub,
            "Connecting to VPN server"
        );
        let conn = connect_tls(&self.settings.target, &self.cache).await?;
        self.handshake(conn.stream, conn.local_addr, conn.peer_addr)
            .await
    }

    /// Run the handshake over an already connected stream.
    pub async fn handshake<S>(
        &mut self,
        stream: S,
        local_addr: Option<SocketAddr>,
        peer_addr: Option<SocketAddr>,
    ) -> Result<Established<S>>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        self.settings.login.validate()?;
        self.state = HandshakeState::Disconnected;

        let result = self.drive(stream, local_addr, peer_addr).await;
        if let Err(e) = &result {
            warn!(state = %self.state, "Handshake failed: {e}");
            self.state = HandshakeState::Disconnected;
        }
        result
    }

    async fn drive<S>(
        &mut self,
        stream: S,
        local_addr: Option<SocketAddr>,
        peer_addr: Option<SocketAddr>,
    ) -> Result<Established<S>>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let settings = &self.settings;
        let mut conn = PackConnection::new(
            stream,
            settings.target.host.clone(),
            settings.response_timeout,
        );
        self.transition(HandshakeState::TlsConnected);

        let settings = &self.settings;
        conn.upload_signature(&settings.watermark).await?;
        self.transition(HandshakeState::SignatureSent);

        let hello = Hello::from_pack(&conn.recv_pack().await?)?;
        info!(
            server = %hello.server_string,
            version = hello.server_version,
            build = hello.server_build,
            "Server hello"
        );
        self.transition(HandshakeState::HelloReceived);

        let settings = &self.settings;
        let node = NodeInfo::new(
            &settings.login.hub,
            &settings.target.host,
            local_addr,
            peer_addr,
        )
        .with_server(&hello);
        let login = settings.login.to_pack(&hello, &node)?;
        conn.send_pack(login).await?;
        self.transition(HandshakeState::AuthSent);

        let welcome = conn.recv_pack().await?;
        let session = Session::from_welcome(&welcome, &hello)?;
        self.transition(HandshakeState::WelcomeReceived);

        let (stream, leftover) = conn.into_parts();
        debug!(leftover = leftover.len(), "Handing stream to tunnel");
        info!(
            session = %session.session_name,
            connection = %session.connection_name,
            "Session established"
        );
        self.transition(HandshakeState::Established);

        Ok(Established {
            session,
            stream,
            leftover,
        })
    }

    fn transition(&mut self, next: HandshakeState) {
        debug_assert_eq!(self.state.next(), Some(next));
        info!(from = %self.state, to = %next, "Handshake state");
        self.state = next;
    }
}
