//! TLS transport and the Pack-over-HTTP exchange.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use rustls::client::{ClientSessionMemoryCache, Resumption};
use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::protocol::{
    http_date, HttpCodec, HttpRequest, HttpResponse, Pack, Watermark, CONTENT_TYPE_PACK,
    CONTENT_TYPE_SIGNATURE, HTTP_KEEP_ALIVE, SIGNATURE_TARGET, VPN_TARGET,
};

/// Process-wide TLS session cache.
///
/// Cloning shares the same store. Pass it to every connect so resumed
/// sessions survive across connections without global state.
#[derive(Clone)]
pub struct TlsSessionCache(Arc<ClientSessionMemoryCache>);

impl TlsSessionCache {
    pub fn new(capacity: usize) -> Self {
        Self(Arc::new(ClientSessionMemoryCache::new(capacity)))
    }
}

impl Default for TlsSessionCache {
    fn default() -> Self {
        Self::new(32)
    }
}

impl std::fmt::Debug for TlsSessionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("TlsSessionCache")
    }
}

/// Where and how to open the TLS connection.
#[derive(Debug, Clone)]
pub struct ConnectTarget {
    pub host: String,
    pub port: u16,
    pub connect_timeout: Duration,
    /// Accept any server certificate.
    pub insecure_skip_verify: bool,
}

/// An open TLS connection plus the socket addresses it runs between.
pub struct TlsConnection {
    pub stream: TlsStream<TcpStream>,
    pub local_addr: Option<SocketAddr>,
    pub peer_addr: Option<SocketAddr>,
}

/// Open a TCP connection and run the TLS handshake.
pub async fn connect_tls(target: &ConnectTarget, cache: &TlsSessionCache) -> Result<TlsConnection> {
    let addr = resolve_address(&target.host, target.port).await?;
    info!("Connecting to {} ({})", target.host, addr);

    let stream = timeout(target.connect_timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| Error::Timeout(format!("connecting to {addr}")))?
        .map_err(|e| Error::connection(format!("{addr}: {e}")))?;
    stream.set_nodelay(true)?;
    let local_addr = stream.local_addr().ok();
    let peer_addr = stream.peer_addr().ok();

    let connector = TlsConnector::from(Arc::new(tls_config(target.insecure_skip_verify, cache)?));
    let server_name = ServerName::try_from(target.host.clone())
        .map_err(|_| Error::Tls(format!("invalid server name {:?}", target.host)))?;

    let stream = timeout(target.connect_timeout, connector.connect(server_name, stream))
        .await
        .map_err(|_| Error::Timeout("TLS handshake".into()))?
        .map_err(|e| Error::Tls(e.to_string()))?;

    debug!("TLS handshake completed");
    Ok(TlsConnection {
        stream,
        local_addr,
        peer_addr,
    })
}

fn tls_config(insecure: bool, cache: &TlsSessionCache) -> Result<rustls::ClientConfig> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let builder = rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| Error::Tls(e.to_string()))?;

    let mut config = if insecure {
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoVerifier))
            .with_no_client_auth()
    } else {
        let mut roots = rustls::RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        builder.with_root_certificates(roots).with_no_client_auth()
    };
    config.resumption = Resumption::store(cache.0.clone());
    Ok(config)
}

async fn resolve_address(host: &str, port: u16) -> Result<SocketAddr> {
    if let Ok(ip) = host.parse::<std::net::IpAddr>() {
        return Ok(SocketAddr::new(ip, port));
    }

    tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| Error::DnsResolution(format!("{host}: {e}")))?
        .next()
        .ok_or_else(|| Error::DnsResolution(format!("no addresses found for {host}")))
}

/// Certificate verifier that accepts any certificate.
/// Used when `insecure_skip_verify` is set (servers commonly run self-signed).
#[derive(Debug)]
struct NoVerifier;

impl rustls::client::danger::ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> std::result::Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}

/// Control-plane exchanges over an established stream.
///
/// Generic over the stream so the handshake can run over TLS in production
/// and an in-memory pipe in tests.
pub struct PackConnection<S> {
    stream: S,
    host: String,
    codec: HttpCodec,
    read_buf: Vec<u8>,
    response_timeout: Duration,
}

impl<S> PackConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, host: impl Into<String>, response_timeout: Duration) -> Self {
        Self {
            stream,
            host: host.into(),
            codec: HttpCodec::new(),
            read_buf: vec![0u8; 16 * 1024],
            response_timeout,
        }
    }

    /// POST the watermark to the signature endpoint.
    pub async fn upload_signature(&mut self, watermark: &Watermark) -> Result<()> {
        let body = watermark.body();
        let len = body.len();
        let request = HttpRequest::post(SIGNATURE_TARGET)
            .header("Content-Type", CONTENT_TYPE_SIGNATURE)
            .header("Connection", "Keep-Alive")
            .body(body);
        self.write_request(&request).await?;
        debug!("Sent signature ({len} bytes)");
        Ok(())
    }

    /// Pad and POST a Pack to the control endpoint.
    pub async fn send_pack(&mut self, mut pack: Pack) -> Result<()> {
        pack.add_padding()?;
        let body = pack.to_bytes();
        let request = HttpRequest::post(VPN_TARGET)
            .header("Date", http_date(SystemTime::now()))
            .header("Keep-Alive", HTTP_KEEP_ALIVE)
            .header("Connection", "Keep-Alive")
            .header("Content-Type", CONTENT_TYPE_PACK)
            .body(body);
        self.write_request(&request).await
    }

    /// Read one response and decode its Pack body.
    pub async fn recv_pack(&mut self) -> Result<Pack> {
        let response = timeout(self.response_timeout, self.read_response())
            .await
            .map_err(|_| Error::Timeout("waiting for server response".into()))??;

        let pack = Pack::from_bytes(&response.body)?;
        debug!("Received pack: {}", pack.describe());
        Ok(pack)
    }

    async fn read_response(&mut self) -> Result<HttpResponse> {
        if self.codec.remaining_len() > 0 {
            if let Some(response) = self.codec.feed(&[])? {
                return Ok(response);
            }
        }
        loop {
            let n = self.stream.read(&mut self.read_buf).await?;
            if n == 0 {
                return Err(Error::connection("connection closed by server"));
            }
            if let Some(response) = self.codec.feed(&self.read_buf[..n])? {
                return Ok(response);
            }
        }
    }

    /// Send a Pack and wait for the answer.
    pub async fn call(&mut self, pack: Pack) -> Result<Pack> {
        self.send_pack(pack).await?;
        self.recv_pack().await
    }

    /// Release the stream together with any bytes read past the last response.
    pub fn into_parts(mut self) -> (S, Bytes) {
        let leftover = self.codec.take_remaining();
        (self.stream, leftover)
    }

    async fn write_request(&mut self, request: &HttpRequest) -> Result<()> {
        let data = request.build(&self.host);
        self.stream.write_all(&data).await?;
        self.stream.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    const RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);

    fn pack_response(pack: &Pack) -> Vec<u8> {
        let body = pack.to_bytes();
        let mut out = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/octet-stream\r\nContent-Length: {}\r\n\r\n",
            body.len()
        )
        .into_bytes();
        out.extend_from_slice(&body);
        out
    }

    async fn read_request(server: &mut tokio::io::DuplexStream) -> String {
        let mut buf = vec![0u8; 64 * 1024];
        let n = server.read(&mut buf).await.unwrap();
        String::from_utf8_lossy(&buf[..n]).into_owned()
    }

    #[tokio::test]
    async fn test_call_roundtrip_and_leftover() {
        let (client, mut server) = duplex(64 * 1024);
        let mut conn = PackConnection::new(client, "vpn.example.com", RESPONSE_TIMEOUT);

        let mut request = Pack::new();
        request.add_str("method", "login").unwrap();
        conn.send_pack(request).await.unwrap();

        let text = read_request(&mut server).await;
        assert!(text.starts_with("POST /vpnsvc/vpn.cgi HTTP/1.1\r\n"));
        assert!(text.contains("Content-Type: application/octet-stream\r\n"));
        assert!(text.contains("Keep-Alive: timeout=15; max=19\r\n"));
        assert!(text.contains("Connection: Keep-Alive\r\n"));
        assert!(text.contains("Date: "));
        assert!(text.contains("Host: vpn.example.com\r\n"));

        let mut reply = Pack::new();
        reply.add_int("error", 0).unwrap();
        let mut wire = pack_response(&reply);
        wire.extend_from_slice(b"\x00\x00\x00\x00");
        server.write_all(&wire).await.unwrap();

        let pack = conn.recv_pack().await.unwrap();
        assert_eq!(pack, reply);

        let (_stream, leftover) = conn.into_parts();
        assert_eq!(leftover.as_ref(), &[0, 0, 0, 0]);
    }

    #[tokio::test]
    async fn test_signature_upload() {
        let (client, mut server) = duplex(64 * 1024);
        let mut conn = PackConnection::new(client, "10.0.0.1", RESPONSE_TIMEOUT);
        conn.upload_signature(&Watermark::default()).await.unwrap();

        let text = read_request(&mut server).await;
        assert!(text.starts_with("POST /vpnsvc/connect.cgi HTTP/1.1\r\n"));
        assert!(text.contains("Content-Type: image/jpeg\r\n"));
        assert!(text.ends_with("\r\n\r\nVPNCONNECT"));
    }

    #[tokio::test]
    async fn test_not_a_vpn_server() {
        let (client, mut server) = duplex(4096);
        let mut conn = PackConnection::new(client, "h", RESPONSE_TIMEOUT);
        server
            .write_all(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n")
            .await
            .unwrap();
        assert!(matches!(
            conn.recv_pack().await,
            Err(Error::NotAVpnServer(_))
        ));
    }

    #[tokio::test]
    async fn test_closed_connection() {
        let (client, server) = duplex(4096);
        drop(server);
        let mut conn = PackConnection::new(client, "h", RESPONSE_TIMEOUT);
        assert!(matches!(
            conn.recv_pack().await,
            Err(Error::ConnectionFailed(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_response_timeout() {
        let (client, _server) = duplex(4096);
        let mut conn = PackConnection::new(client, "h", Duration::from_secs(1));
        assert!(matches!(conn.recv_pack().await, Err(Error::Timeout(_))));
    }

    #[test]
    fn test_tls_config_modes() {
        let cache = TlsSessionCache::default();
        assert!(tls_config(true, &cache).is_ok());
        assert!(tls_config(false, &cache).is_ok());
    }
}
