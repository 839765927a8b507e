//! SoftEther-protocol VPN client library.
//!
//! The client logs in to a virtual hub over HTTPS, turns the connection into
//! an Ethernet frame tunnel and relays frames to a macOS feth interface.

pub mod adapter;
pub mod client;
pub mod config;
pub mod crypto;
pub mod error;
pub mod net;
pub mod protocol;
pub mod relay;
pub mod tunnel;
pub mod vpnclient;

pub use adapter::{Adapter, ChannelAdapter, FrameBatch};
pub use client::{Established, HandshakeSettings, HandshakeState, VpnClient};
pub use config::{ClientConfig, ClientSettings, DEFAULT_CONFIG_FILE};
pub use error::{Error, Result};
pub use net::TlsSessionCache;
pub use relay::relay;
pub use tunnel::{spawn_tunnel, TunnelOptions};
pub use vpnclient::ActiveSession;
