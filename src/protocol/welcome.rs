//! Welcome message and the session it establishes.

use tracing::{debug, info, warn};

use super::auth::Hello;
use super::constants::{BRAND_STRING, SHA_SIZE};
use super::pack::Pack;
use crate::error::{Error, Result};

macro_rules! policy {
    (
        bools { $($b:ident => $bn:literal,)* }
        ints { $($i:ident => $in:literal,)* }
    ) => {
        /// Hub policy granted to the session.
        ///
        /// Each field travels as `policy:<Name>`; flags are read as booleans,
        /// limits as integers.
        #[derive(Debug, Clone, Default, PartialEq, Eq)]
        pub struct Policy {
            $(pub $b: bool,)*
            $(pub $i: u32,)*
        }

        impl Policy {
            pub fn from_pack(pack: &Pack) -> Self {
                Self {
                    $($b: pack.get_bool(concat!("policy:", $bn)),)*
                    $($i: pack.get_int(concat!("policy:", $in)),)*
                }
            }
        }
    };
}

policy! {
    bools {
        access => "Access",
        dhcp_filter => "DHCPFilter",
        dhcp_no_server => "DHCPNoServer",
        dhcp_force => "DHCPForce",
        no_bridge => "NoBridge",
        no_routing => "NoRouting",
        privacy_filter => "PrivacyFilter",
        no_server => "NoServer",
        check_mac => "CheckMac",
        check_ip => "CheckIP",
        arp_dhcp_only => "ArpDhcpOnly",
        monitor_port => "MonitorPort",
        no_broadcast_limiter => "NoBroadcastLimiter",
        fix_password => "FixPassword",
        no_qos => "NoQoS",
        rs_and_ra_filter => "RSandRAFilter",
        ra_filter => "RAFilter",
        dhcpv6_filter => "DHCPv6Filter",
        dhcpv6_no_server => "DHCPv6NoServer",
        no_routing_v6 => "NoRoutingV6",
        check_ipv6 => "CheckIPv6",
        no_server_v6 => "NoServerV6",
        no_save_password => "NoSavePassword",
        filter_ipv4 => "FilterIPv4",
        filter_ipv6 => "FilterIPv6",
        filter_non_ip => "FilterNonIP",
        no_ipv6_default_router_in_ra => "NoIPv6DefaultRouterInRA",
        no_ipv6_default_router_in_ra_when_ipv6 => "NoIPv6DefaultRouterInRAWhenIPv6",
        ver3 => "Ver3",
    }
    ints {
        max_connection => "MaxConnection",
        time_out => "TimeOut",
        max_mac => "MaxMac",
        max_ip => "MaxIP",
        max_upload => "MaxUpload",
        max_download => "MaxDownload",
        multi_logins => "MultiLogins",
        max_ipv6 => "MaxIPv6",
        auto_disconnect => "AutoDisconnect",
        vlan_id => "VLanId",
    }
}

/// An established session. Built once from the welcome, read-only after.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    pub session_key: [u8; SHA_SIZE],
    pub session_key_32: u32,
    pub policy: Policy,
    pub session_name: String,
    pub connection_name: String,
    pub max_connection: u32,
    pub use_compress: bool,
    pub server_string: String,
    pub server_version: u32,
    pub server_build: u32,
    /// Optional message of the day shown by the hub.
    pub message: Option<String>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("session_name", &self.session_name)
            .field("connection_name", &self.connection_name)
            .field("max_connection", &self.max_connection)
            .field("use_compress", &self.use_compress)
            .field("server_string", &self.server_string)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Validate a welcome Pack and build the session from it.
    pub fn from_welcome(pack: &Pack, hello: &Hello) -> Result<Self> {
        let error = pack.get_int("error");
        if error != 0 {
            return Err(Error::server(error));
        }

        let brand = pack.get_str("branded_cfroms");
        if !brand.is_empty() && brand != BRAND_STRING {
            return Err(Error::BrandMismatch(brand.to_string()));
        }

        let message = Some(pack.get_str("Msg"))
            .filter(|m| !m.is_empty())
            .map(str::to_string);
        if let Some(msg) = &message {
            info!("Server message: {msg}");
        }

        if pack.get_bool("Redirect") {
            warn!("Server requested a cluster redirect; staying on this server");
        }

        let key = pack.get_data("session_key");
        let session_key =
            <[u8; SHA_SIZE]>::try_from(key).map_err(|_| Error::InvalidSessionKey(key.len()))?;

        if pack.get_int("use_encrypt") == 0 {
            return Err(Error::EncryptionNotNegotiated);
        }

        let session = Self {
            session_key,
            session_key_32: pack.get_int("session_key_32"),
            policy: Policy::from_pack(pack),
            session_name: pack.get_str("session_name").to_string(),
            connection_name: pack.get_str("connection_name").to_string(),
            max_connection: pack.get_int("max_connection"),
            use_compress: pack.get_bool("use_compress"),
            server_string: hello.server_string.clone(),
            server_version: hello.server_version,
            server_build: hello.server_build,
            message,
        };
        debug!(policy = ?session.policy, "welcome accepted");
        Ok(session)
    }
}
