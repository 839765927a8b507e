//! Hello and login messages.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use tracing::debug;

use super::constants::*;
use super::pack::{Pack, PackError};
use crate::crypto::{self, PasswordHash, Ticket, DIGEST_LEN};
use crate::error::{Error, Result};

/// Parsed Hello response from server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hello {
    /// Server random challenge (20 bytes).
    pub random: [u8; DIGEST_LEN],
    pub server_version: u32,
    pub server_build: u32,
    /// Server identification string.
    pub server_string: String,
}

impl Hello {
    /// Parse a Hello response from a Pack.
    pub fn from_pack(pack: &Pack) -> Result<Self> {
        let error = pack.get_int("error");
        if error != 0 {
            return Err(Error::server(error));
        }

        let server_string = pack.get_str("hello");
        if server_string.is_empty() {
            return Err(Error::InvalidHello("missing server string"));
        }

        let random = <[u8; DIGEST_LEN]>::try_from(pack.get_data("random"))
            .map_err(|_| Error::InvalidHello("random must be 20 bytes"))?;

        Ok(Self {
            random,
            server_version: pack.get_int("version"),
            server_build: pack.get_int("build"),
            server_string: server_string.to_string(),
        })
    }
}

/// Client authentication modes.
///
/// Only the first three can be sent; the rest are recognised so configuration
/// can name them and fail cleanly before connecting.
#[derive(Debug, Clone)]
pub enum ClientAuth {
    Anonymous,
    Password(PasswordHash),
    Ticket(Ticket),
    PlainPassword,
    Certificate,
    SecureDevice,
    OpenSslEngine,
}

impl ClientAuth {
    /// Short name used in logs and configuration.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Anonymous => "anonymous",
            Self::Password(_) => "password",
            Self::Ticket(_) => "ticket",
            Self::PlainPassword => "plain_password",
            Self::Certificate => "certificate",
            Self::SecureDevice => "secure_device",
            Self::OpenSslEngine => "openssl_engine",
        }
    }

    /// Fail with `UnsupportedAuthMode` for modes this client cannot send.
    pub fn ensure_supported(&self) -> Result<()> {
        match self {
            Self::Anonymous | Self::Password(_) | Self::Ticket(_) => Ok(()),
            other => Err(Error::UnsupportedAuthMode(other.name())),
        }
    }
}

/// Session options requested at login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionOptions {
    pub max_connection: u32,
    pub use_encrypt: bool,
    pub use_compress: bool,
    pub half_connection: bool,
    pub require_bridge_routing_mode: bool,
    pub require_monitor_mode: bool,
    /// Sent inverted as the `qos` flag.
    pub disable_qos: bool,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            max_connection: 1,
            use_encrypt: true,
            use_compress: false,
            half_connection: false,
            require_bridge_routing_mode: false,
            require_monitor_mode: false,
            disable_qos: false,
        }
    }
}

/// Everything the login message needs besides the server challenge.
#[derive(Debug, Clone)]
pub struct LoginRequest {
    pub hub: String,
    pub username: String,
    pub auth: ClientAuth,
    pub options: ConnectionOptions,
}

impl LoginRequest {
    /// Build the login Pack answering `hello`.
    pub fn to_pack(&self, hello: &Hello, node: &NodeInfo) -> Result<Pack> {
        self.validate()?;

        let mut pack = Pack::new();
        pack.add_str("method", "login")?;
        pack.add_str("hubname", self.hub.as_str())?;
        pack.add_str("username", self.username.as_str())?;

        match &self.auth {
            ClientAuth::Anonymous => {
                pack.add_int("authtype", AUTHTYPE_ANONYMOUS)?;
            }
            ClientAuth::Password(hash) => {
                pack.add_int("authtype", AUTHTYPE_PASSWORD)?;
                let response = crypto::secure_password(hash, &hello.random);
                pack.add_data("secure_password", response.to_vec())?;
            }
            ClientAuth::Ticket(ticket) => {
                pack.add_int("authtype", AUTHTYPE_TICKET)?;
                pack.add_data("ticket", ticket.as_bytes().to_vec())?;
            }
            _ => return Err(Error::UnsupportedAuthMode(self.auth.name())),
        }

        add_client_version(&mut pack)?;
        pack.add_int("protocol", CONNECTION_TCP)?;
        pack.add_str("hello", CLIENT_STRING)?;
        pack.add_int("version", CLIENT_VERSION)?;
        pack.add_int("build", CLIENT_BUILD)?;
        pack.add_int("client_id", CLIENT_ID)?;

        let o = &self.options;
        pack.add_int("max_connection", o.max_connection)?;
        pack.add_bool("use_encrypt", o.use_encrypt)?;
        pack.add_bool("use_compress", o.use_compress)?;
        pack.add_bool("half_connection", o.half_connection)?;
        pack.add_bool("require_bridge_routing_mode", o.require_bridge_routing_mode)?;
        pack.add_bool("require_monitor_mode", o.require_monitor_mode)?;
        pack.add_bool("qos", !o.disable_qos)?;

        pack.add_bool("support_bulk_on_rudp", true)?;
        pack.add_bool("support_hmac_on_bulk_of_rudp", true)?;
        pack.add_bool("support_udp_recovery", true)?;
        pack.add_data("unique_id", crypto::unique_id().to_vec())?;
        pack.add_int("rudp_bulk_max_version", 2)?;
        pack.add_str("branded_ctos", BRAND_STRING)?;

        node.write_to(&mut pack)?;
        OsInfo::current().write_to(&mut pack)?;

        debug!(auth = self.auth.name(), "login pack: {}", pack.describe());
        Ok(pack)
    }

    /// Local checks run before any network I/O.
    ///
    /// Anonymous and password logins name a hub and a user; a ticket carries
    /// its own identity.
    pub fn validate(&self) -> Result<()> {
        self.auth.ensure_supported()?;
        if matches!(self.auth, ClientAuth::Ticket(_)) {
            return Ok(());
        }
        if self.hub.is_empty() || self.username.is_empty() {
            return Err(Error::config(format!(
                "{} login needs a hub name and a username",
                self.auth.name()
            )));
        }
        Ok(())
    }
}

fn add_client_version(pack: &mut Pack) -> std::result::Result<(), PackError> {
    pack.add_str("client_str", CLIENT_STRING)?;
    pack.add_int("client_ver", CLIENT_VERSION)?;
    pack.add_int("client_build", CLIENT_BUILD)
}

/// Description of this client and the path to the server.
#[derive(Debug, Clone, Default)]
pub struct NodeInfo {
    pub client_hostname: String,
    pub server_hostname: String,
    pub hub_name: String,
    pub client_addr: Option<SocketAddr>,
    pub server_addr: Option<SocketAddr>,
    pub server_version: u32,
    pub server_build: u32,
    pub server_product: String,
}

impl NodeInfo {
    /// Node info for a connection to `server_hostname`, with whatever socket
    /// addresses are known.
    pub fn new(
        hub_name: &str,
        server_hostname: &str,
        client_addr: Option<SocketAddr>,
        server_addr: Option<SocketAddr>,
    ) -> Self {
        Self {
            client_hostname: local_hostname(),
            server_hostname: server_hostname.to_string(),
            hub_name: hub_name.to_string(),
            client_addr,
            server_addr,
            ..Self::default()
        }
    }

    /// Record what the server said about itself in its hello.
    pub fn with_server(mut self, hello: &Hello) -> Self {
        self.server_version = hello.server_version;
        self.server_build = hello.server_build;
        self.server_product = hello.server_string.clone();
        self
    }

    fn write_to(&self, pack: &mut Pack) -> std::result::Result<(), PackError> {
        pack.add_str("ClientProductName", CLIENT_STRING)?;
        pack.add_str("ServerProductName", self.server_product.as_str())?;
        pack.add_str("ClientOsName", std::env::consts::OS)?;
        pack.add_str("ClientOsVer", "")?;
        pack.add_str("ClientOsProductId", "")?;
        pack.add_str("ClientHostname", self.client_hostname.as_str())?;
        pack.add_str("ServerHostname", self.server_hostname.as_str())?;
        pack.add_str("ProxyHostname", "")?;
        pack.add_str("HubName", self.hub_name.as_str())?;
        pack.add_data("UniqueId", crypto::random_bytes::<16>().to_vec())?;

        pack.add_int("ClientProductVer", CLIENT_VERSION)?;
        pack.add_int("ClientProductBuild", CLIENT_BUILD)?;
        pack.add_int("ServerProductVer", self.server_version)?;
        pack.add_int("ServerProductBuild", self.server_build)?;

        add_endpoint(pack, "ClientIpAddress", "ClientPort", self.client_addr)?;
        add_endpoint(pack, "ServerIpAddress", "ServerPort2", self.server_addr)?;
        add_endpoint(pack, "ProxyIpAddress", "ProxyPort", None)
    }
}

/// Write `<ip>` (ip32 layout), `<ip>6` and `<port>` for an optional address.
fn add_endpoint(
    pack: &mut Pack,
    ip_name: &str,
    port_name: &str,
    addr: Option<SocketAddr>,
) -> std::result::Result<(), PackError> {
    let (v4, v6) = match addr.map(|a| a.ip()) {
        Some(IpAddr::V4(ip)) => (ip, [0u8; 16]),
        Some(IpAddr::V6(ip)) => (Ipv4Addr::UNSPECIFIED, ip.octets()),
        None => (Ipv4Addr::UNSPECIFIED, [0u8; 16]),
    };
    pack.add_ip32(ip_name, v4)?;
    pack.add_data(&format!("{ip_name}6"), v6.to_vec())?;
    pack.add_int(port_name, addr.map_or(0, |a| u32::from(a.port())))
}

/// Operating system description sent with the login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OsInfo {
    pub is_windows: bool,
    pub title: String,
}

impl OsInfo {
    pub fn current() -> Self {
        Self {
            is_windows: cfg!(windows),
            title: format!("{}/{}", std::env::consts::OS, std::env::consts::ARCH),
        }
    }

    fn write_to(&self, pack: &mut Pack) -> std::result::Result<(), PackError> {
        pack.add_bool("V_IsWindows", self.is_windows)?;
        pack.add_bool("V_IsNT", self.is_windows)?;
        pack.add_bool("V_IsServer", false)?;
        pack.add_bool("V_IsBeta", false)?;
        pack.add_int("V_VerMajor", 0)?;
        pack.add_int("V_VerMinor", 0)?;
        pack.add_int("V_Build", 0)?;
        pack.add_int("V_ServicePack", 0)?;
        pack.add_str("V_Title", self.title.as_str())
    }
}

#[cfg(unix)]
fn local_hostname() -> String {
    let mut buf = [0u8; 256];
    // SAFETY: the buffer outlives the call and its length is passed along.
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr().cast::<libc::c_char>(), buf.len()) };
    if rc != 0 {
        return String::new();
    }
    let len = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..len]).into_owned()
}

#[cfg(not(unix))]
fn local_hostname() -> String {
    std::env::var("COMPUTERNAME").unwrap_or_default()
}
