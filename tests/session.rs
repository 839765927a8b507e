//! End-to-end session over an in-memory stream: handshake, tunnel and relay.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};

use sevpn_client::adapter::{Adapter, ChannelAdapter};
use sevpn_client::crypto::hash_password;
use sevpn_client::net::ConnectTarget;
use sevpn_client::protocol::{
    encode_batch, read_message, ClientAuth, ConnectionOptions, LoginRequest, Pack, TunnelMessage,
    Watermark, TUNNEL_PROBE,
};
use sevpn_client::{
    ActiveSession, Error, HandshakeSettings, HandshakeState, TlsSessionCache, TunnelOptions,
    VpnClient,
};

fn settings() -> HandshakeSettings {
    HandshakeSettings {
        target: ConnectTarget {
            host: "vpn.example.com".into(),
            port: 443,
            connect_timeout: Duration::from_secs(5),
            insecure_skip_verify: false,
        },
        login: LoginRequest {
            hub: "VPN".into(),
            username: "bob".into(),
            auth: ClientAuth::Password(hash_password("hunter2", "bob")),
            options: ConnectionOptions::default(),
        },
        watermark: Watermark::default(),
        response_timeout: Duration::from_secs(5),
    }
}

fn http_response(pack: &Pack) -> Vec<u8> {
    let body = pack.to_bytes();
    let mut out = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/octet-stream\r\nContent-Length: {}\r\n\r\n",
        body.len()
    )
    .into_bytes();
    out.extend_from_slice(&body);
    out
}

async fn read_request_body(server: &mut DuplexStream) -> Vec<u8> {
    let mut data = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = server.read(&mut buf).await.unwrap();
        assert!(n > 0, "client closed mid-request");
        data.extend_from_slice(&buf[..n]);
        let Some(head_end) = data.windows(4).position(|w| w == b"\r\n\r\n") else {
            continue;
        };
        let head = String::from_utf8_lossy(&data[..head_end]).into_owned();
        let len: usize = head
            .lines()
            .find_map(|l| l.strip_prefix("Content-Length: "))
            .and_then(|v| v.trim().parse().ok())
            .unwrap();
        if data.len() >= head_end + 4 + len {
            return data[head_end + 4..head_end + 4 + len].to_vec();
        }
    }
}

/// Plays the server side of the handshake and returns the stream positioned
/// at the start of the tunnel.
async fn serve_handshake(mut server: DuplexStream) -> DuplexStream {
    assert_eq!(read_request_body(&mut server).await, b"VPNCONNECT");

    let mut hello = Pack::new();
    hello.add_str("hello", "SoftEther VPN Server").unwrap();
    hello.add_int("version", 444).unwrap();
    hello.add_int("build", 9807).unwrap();
    hello.add_data("random", vec![0x42; 20]).unwrap();
    server.write_all(&http_response(&hello)).await.unwrap();

    let login = Pack::from_bytes(&read_request_body(&mut server).await).unwrap();
    assert_eq!(login.get_str("hubname"), "VPN");
    assert_eq!(login.get_str("username"), "bob");

    let mut welcome = Pack::new();
    welcome.add_str("session_name", "SID-BOB-1").unwrap();
    welcome.add_str("connection_name", "CID-7").unwrap();
    welcome.add_data("session_key", vec![0x33; 20]).unwrap();
    welcome.add_int("use_encrypt", 1).unwrap();
    welcome.add_int("max_connection", 1).unwrap();
    let mut wire = http_response(&welcome);
    // First tunnel message arrives in the same segment as the welcome.
    wire.extend_from_slice(&encode_batch(&[Bytes::from_static(b"early-frame")], false).unwrap());
    server.write_all(&wire).await.unwrap();
    server
}

#[tokio::test]
async fn test_session_relays_frames_between_server_and_host() {
    let (client_io, server_io) = duplex(256 * 1024);
    let server = tokio::spawn(serve_handshake(server_io));

    let mut client = VpnClient::new(settings(), TlsSessionCache::default());
    let established = client.handshake(client_io, None, None).await.unwrap();
    assert_eq!(client.state(), HandshakeState::Established);
    assert_eq!(established.session.session_name, "SID-BOB-1");

    let (host, host_far) = ChannelAdapter::pair("feth0", "host-stack", 16);
    let options = TunnelOptions {
        keepalive_interval: Duration::from_secs(60),
        ..TunnelOptions::default()
    };
    let active = Arc::new(
        ActiveSession::start(established, options, Arc::new(host))
            .await
            .unwrap(),
    );
    let relay = tokio::spawn({
        let active = active.clone();
        async move { active.run().await }
    });

    let mut server = server.await.unwrap();
    let mut probe = [0u8; 5];
    server.read_exact(&mut probe).await.unwrap();
    assert_eq!(probe, TUNNEL_PROBE);

    // Server to host, including the frame that arrived with the welcome.
    assert_eq!(&host_far.read().await.unwrap()[0][..], b"early-frame");
    let inbound = vec![Bytes::from_static(b"arp-reply"), Bytes::from_static(b"dhcp-offer")];
    server
        .write_all(&encode_batch(&inbound, false).unwrap())
        .await
        .unwrap();
    assert_eq!(host_far.read().await.unwrap(), inbound);

    // Host to server.
    host_far
        .write(vec![Bytes::from_static(b"dhcp-discover")])
        .await
        .unwrap();
    assert_eq!(
        read_message(&mut server, false).await.unwrap(),
        TunnelMessage::Frames(vec![Bytes::from_static(b"dhcp-discover")])
    );

    // Losing the server ends the relay with an error.
    drop(server);
    let result = relay.await.unwrap();
    assert!(matches!(result, Err(Error::ChannelClosed)));
    active.shutdown().await;
}

#[tokio::test]
async fn test_rejected_login_produces_no_session() {
    let (client_io, mut server_io) = duplex(64 * 1024);
    let server = tokio::spawn(async move {
        read_request_body(&mut server_io).await;
        let mut hello = Pack::new();
        hello.add_str("hello", "SoftEther VPN Server").unwrap();
        hello.add_data("random", vec![0x42; 20]).unwrap();
        server_io.write_all(&http_response(&hello)).await.unwrap();

        read_request_body(&mut server_io).await;
        let mut refusal = Pack::new();
        refusal.add_int("error", 9).unwrap();
        server_io.write_all(&http_response(&refusal)).await.unwrap();
        server_io
    });

    let mut client = VpnClient::new(settings(), TlsSessionCache::default());
    let err = client.handshake(client_io, None, None).await.err().unwrap();
    assert_eq!(err.server_code(), Some(9));
    assert_eq!(client.state(), HandshakeState::Disconnected);
    drop(server.await.unwrap());
}
