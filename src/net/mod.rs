//! Networking: TLS connect and the Pack-over-HTTP control channel.

mod connection;

pub use connection::{
    connect_tls, ConnectTarget, PackConnection, TlsConnection, TlsSessionCache,
};
