//! Configuration management for the VPN client.
//!
//! The file is JSON. Keys are snake_case; the PascalCase names used by older
//! configuration files are accepted as aliases.

use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::adapter::FethPair;
use crate::client::HandshakeSettings;
use crate::crypto::{hash_password, PasswordHash, Ticket};
use crate::error::{Error, Result};
use crate::net::ConnectTarget;
use crate::protocol::{ClientAuth, ConnectionOptions, LoginRequest, Watermark, TUNNEL_PROBE};
use crate::tunnel::{TunnelOptions, DEFAULT_KEEPALIVE_INTERVAL};

pub const DEFAULT_CONFIG_FILE: &str = "config.json";
pub const DEFAULT_PORT: u16 = 443;
pub const DEFAULT_HUB: &str = "DEFAULT";
pub const DEFAULT_ADAPTER: &str = "feth0";

/// Authentication mode named in the configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthType {
    Anonymous,
    #[default]
    Password,
    Ticket,
    PlainPassword,
    Certificate,
    SecureDevice,
    #[serde(rename = "openssl_engine")]
    OpenSslEngine,
}

/// VPN client configuration as stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Server hostname or IP address
    #[serde(alias = "Host")]
    pub host: String,

    #[serde(default = "default_port", alias = "Port")]
    pub port: u16,

    /// Virtual hub name
    #[serde(default = "default_hub", alias = "HubName")]
    pub hub_name: String,

    #[serde(default, alias = "Username")]
    pub username: String,

    #[serde(default)]
    pub auth_type: AuthType,

    /// Base64 of the 20-byte credential digest
    #[serde(default, alias = "HashedPassword", skip_serializing_if = "Option::is_none")]
    pub hashed_password: Option<String>,

    /// Plain password, hashed locally when no digest is given
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Base64 of a 20-byte session ticket
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticket: Option<String>,

    /// Skip TLS certificate verification (insecure)
    #[serde(default, alias = "InsecureSkipVerify")]
    pub insecure_skip_verify: bool,

    /// MAC address for the host interface, `xx:xx:xx:xx:xx:xx`
    #[serde(default, alias = "LocalAdapterMAC", skip_serializing_if = "Option::is_none")]
    pub local_adapter_mac: Option<String>,

    #[serde(default = "default_adapter")]
    pub adapter_name: String,

    #[serde(default = "default_max_connection")]
    pub max_connection: u32,

    #[serde(default = "default_true")]
    pub use_encrypt: bool,

    #[serde(default)]
    pub use_compress: bool,

    #[serde(default)]
    pub half_connection: bool,

    #[serde(default)]
    pub require_bridge_routing_mode: bool,

    #[serde(default)]
    pub require_monitor_mode: bool,

    #[serde(default)]
    pub disable_qos: bool,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Upper bound on each handshake response
    #[serde(default = "default_response_timeout")]
    pub response_timeout_secs: u64,

    #[serde(default = "default_keepalive_interval")]
    pub keepalive_interval_secs: u64,

    /// Watermark image uploaded as the connection signature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watermark_file: Option<PathBuf>,

    /// Hex bytes written before the first tunnel frame
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tunnel_probe: Option<String>,

    /// Run DHCP on the host interface once the tunnel is up
    #[serde(default)]
    pub invoke_dhcp: bool,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_hub() -> String {
    DEFAULT_HUB.to_string()
}
fn default_adapter() -> String {
    DEFAULT_ADAPTER.to_string()
}
fn default_max_connection() -> u32 {
    1
}
fn default_true() -> bool {
    true
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_response_timeout() -> u64 {
    30
}
fn default_keepalive_interval() -> u64 {
    DEFAULT_KEEPALIVE_INTERVAL.as_secs()
}

/// Validated settings ready to drive a connection.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub handshake: HandshakeSettings,
    pub adapter_name: String,
    pub adapter_mac: Option<String>,
    pub tunnel: TunnelOptions,
    pub invoke_dhcp: bool,
}

impl ClientConfig {
    /// Load configuration from a JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("failed to read {}: {e}", path.display())))?;
        Self::from_json(&content)
            .map_err(|e| Error::config(format!("{}: {e}", path.display())))
    }

    /// Parse configuration from a JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::config(format!("invalid JSON: {e}")))
    }

    /// Save configuration to a JSON file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| Error::config(format!("failed to serialize: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check every field and resolve the settings used to connect.
    pub fn validate(&self) -> Result<ClientSettings> {
        if self.host.trim().is_empty() {
            return Err(Error::config("host is required"));
        }
        if self.port == 0 {
            return Err(Error::config("port must be non-zero"));
        }
        if self.hub_name.is_empty() {
            return Err(Error::config("hub_name is required"));
        }
        if !matches!(self.auth_type, AuthType::Ticket) && self.username.is_empty() {
            return Err(Error::config("username is required"));
        }
        if self.max_connection == 0 || self.max_connection > 32 {
            return Err(Error::config("max_connection must be between 1 and 32"));
        }
        if self.keepalive_interval_secs == 0 {
            return Err(Error::config("keepalive_interval_secs must be non-zero"));
        }

        let auth = self.resolve_auth()?;
        auth.ensure_supported()?;

        FethPair::parse(&self.adapter_name)?;
        let adapter_mac = self
            .local_adapter_mac
            .as_deref()
            .map(normalize_mac)
            .transpose()?;

        let watermark = match &self.watermark_file {
            Some(path) => Watermark::from_file(path)?,
            None => Watermark::ConnectMarker,
        };

        let probe = match &self.tunnel_probe {
            Some(text) => Bytes::from(
                hex::decode(text.trim())
                    .map_err(|e| Error::config(format!("tunnel_probe is not hex: {e}")))?,
            ),
            None => Bytes::from_static(&TUNNEL_PROBE),
        };

        Ok(ClientSettings {
            handshake: HandshakeSettings {
                target: ConnectTarget {
                    host: self.host.trim().to_string(),
                    port: self.port,
                    connect_timeout: Duration::from_secs(self.connect_timeout_secs),
                    insecure_skip_verify: self.insecure_skip_verify,
                },
                login: LoginRequest {
                    hub: self.hub_name.clone(),
                    username: self.username.clone(),
                    auth,
                    options: ConnectionOptions {
                        max_connection: self.max_connection,
                        use_encrypt: self.use_encrypt,
                        use_compress: self.use_compress,
                        half_connection: self.half_connection,
                        require_bridge_routing_mode: self.require_bridge_routing_mode,
                        require_monitor_mode: self.require_monitor_mode,
                        disable_qos: self.disable_qos,
                    },
                },
                watermark,
                response_timeout: Duration::from_secs(self.response_timeout_secs),
            },
            adapter_name: self.adapter_name.clone(),
            adapter_mac,
            tunnel: TunnelOptions {
                probe,
                compress: self.use_compress,
                keepalive_interval: Duration::from_secs(self.keepalive_interval_secs),
            },
            invoke_dhcp: self.invoke_dhcp,
        })
    }

    fn resolve_auth(&self) -> Result<ClientAuth> {
        Ok(match self.auth_type {
            AuthType::Anonymous => ClientAuth::Anonymous,
            AuthType::Password => match (&self.hashed_password, &self.password) {
                (Some(hashed), _) => ClientAuth::Password(
                    PasswordHash::from_base64(hashed.trim()).ok_or(Error::BadHashedPassword)?,
                ),
                (None, Some(password)) => {
                    ClientAuth::Password(hash_password(password, &self.username))
                }
                (None, None) => {
                    return Err(Error::config(
                        "password authentication needs hashed_password or password",
                    ))
                }
            },
            AuthType::Ticket => {
                let ticket = self
                    .ticket
                    .as_deref()
                    .ok_or_else(|| Error::config("ticket authentication needs a ticket"))?;
                ClientAuth::Ticket(
                    Ticket::from_base64(ticket.trim())
                        .ok_or_else(|| Error::config("ticket must be a base64 20-byte value"))?,
                )
            }
            AuthType::PlainPassword => ClientAuth::PlainPassword,
            AuthType::Certificate => ClientAuth::Certificate,
            AuthType::SecureDevice => ClientAuth::SecureDevice,
            AuthType::OpenSslEngine => ClientAuth::OpenSslEngine,
        })
    }
}

/// Check `xx:xx:xx:xx:xx:xx` and return it in lowercase.
fn normalize_mac(mac: &str) -> Result<String> {
    let invalid = || Error::config(format!("invalid MAC address {mac:?}"));
    let parts: Vec<&str> = mac.trim().split(':').collect();
    if parts.len() != 6 {
        return Err(invalid());
    }
    let mut octets = Vec::with_capacity(6);
    for part in parts {
        if part.len() != 2 {
            return Err(invalid());
        }
        octets.extend(hex::decode(part).map_err(|_| invalid())?);
    }
    if octets[0] & 0x01 != 0 {
        return Err(Error::config(format!("MAC address {mac:?} is multicast")));
    }
    Ok(octets
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(":"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    // Digest of "password1" for "username1".
    const HASH: &str = "yQutDhGqXao5a5j3FHs3jI7qazw=";

    fn minimal() -> ClientConfig {
        ClientConfig::from_json(&format!(
            r#"{{"host": "vpn.example.com", "username": "username1", "hashed_password": "{HASH}"}}"#
        ))
        .unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = minimal();
        assert_eq!(config.port, 443);
        assert_eq!(config.hub_name, "DEFAULT");
        assert_eq!(config.adapter_name, "feth0");
        assert_eq!(config.auth_type, AuthType::Password);
        assert!(config.use_encrypt);
        assert!(!config.use_compress);

        let settings = config.validate().unwrap();
        assert_eq!(settings.handshake.target.port, 443);
        assert_eq!(settings.handshake.watermark, Watermark::ConnectMarker);
        assert_eq!(&settings.tunnel.probe[..], &TUNNEL_PROBE);
        assert_eq!(settings.tunnel.keepalive_interval, Duration::from_secs(3));
        assert!(matches!(settings.handshake.login.auth, ClientAuth::Password(_)));
    }

    #[test]
    fn test_legacy_keys() {
        let config = ClientConfig::from_json(&format!(
            r#"{{
                "Host": "10.0.0.1",
                "Port": 5555,
                "HubName": "VPN",
                "Username": "username1",
                "HashedPassword": "{HASH}",
                "InsecureSkipVerify": true,
                "LocalAdapterMAC": "5E:00:53:AB:CD:EF"
            }}"#
        ))
        .unwrap();
        assert_eq!(config.port, 5555);
        assert!(config.insecure_skip_verify);

        let settings = config.validate().unwrap();
        assert_eq!(settings.handshake.login.hub, "VPN");
        assert_eq!(settings.adapter_mac.as_deref(), Some("5e:00:53:ab:cd:ef"));
    }

    #[test]
    fn test_plain_password_is_hashed_locally() {
        let mut config = minimal();
        config.hashed_password = None;
        config.password = Some("password1".into());
        match config.validate().unwrap().handshake.login.auth {
            ClientAuth::Password(hash) => assert_eq!(hash.to_base64(), HASH),
            other => panic!("unexpected auth {other:?}"),
        }
    }

    #[test]
    fn test_bad_hashed_password() {
        let mut config = minimal();
        config.hashed_password = Some("c2hvcnQ=".into());
        assert!(matches!(config.validate(), Err(Error::BadHashedPassword)));

        config.hashed_password = Some("not base64!".into());
        assert!(matches!(config.validate(), Err(Error::BadHashedPassword)));
    }

    #[test]
    fn test_unsupported_auth_rejected_locally() {
        let mut config = minimal();
        config.auth_type = AuthType::Certificate;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, Error::UnsupportedAuthMode("certificate")));
        assert!(err.is_local());
    }

    #[test]
    fn test_anonymous_and_ticket() {
        let mut config = minimal();
        config.auth_type = AuthType::Anonymous;
        config.hashed_password = None;
        assert!(matches!(
            config.validate().unwrap().handshake.login.auth,
            ClientAuth::Anonymous
        ));

        // Anonymous logins still name a user, and must fail before connecting.
        config.username = String::new();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.is_local());

        let mut config = minimal();
        config.auth_type = AuthType::Ticket;
        assert!(config.validate().is_err());
        config.ticket = Some(HASH.into());
        config.username = String::new();
        assert!(matches!(
            config.validate().unwrap().handshake.login.auth,
            ClientAuth::Ticket(_)
        ));
    }

    #[test]
    fn test_adapter_and_mac_validation() {
        let mut config = minimal();
        config.adapter_name = "eth0".into();
        assert!(matches!(config.validate(), Err(Error::InvalidAdapterName(_))));

        for mac in ["00:11:22:33:44", "00:11:22:33:44:zz", "0011.2233.4455", "01:00:5e:00:00:01"] {
            let mut config = minimal();
            config.local_adapter_mac = Some(mac.into());
            assert!(config.validate().is_err(), "{mac} should be rejected");
        }
    }

    #[test]
    fn test_probe_and_watermark_file() {
        let mut image = NamedTempFile::new().unwrap();
        image.write_all(b"\xff\xd8\xff\xe0watermark").unwrap();

        let mut config = minimal();
        config.tunnel_probe = Some("0102030405".into());
        config.watermark_file = Some(image.path().to_path_buf());
        let settings = config.validate().unwrap();
        assert_eq!(&settings.tunnel.probe[..], &[1, 2, 3, 4, 5]);
        assert!(matches!(settings.handshake.watermark, Watermark::Image(_)));

        config.tunnel_probe = Some("xyz".into());
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_missing_fields() {
        assert!(ClientConfig::from_json(r#"{"username": "u"}"#).is_err());

        let mut config = minimal();
        config.host = " ".into();
        assert!(config.validate().is_err());

        let mut config = minimal();
        config.hashed_password = None;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_file_round_trip() {
        let file = NamedTempFile::new().unwrap();
        let config = minimal();
        config.save(file.path()).unwrap();

        let loaded = ClientConfig::from_file(file.path()).unwrap();
        assert_eq!(loaded.host, "vpn.example.com");
        assert_eq!(loaded.hashed_password.as_deref(), Some(HASH));

        assert!(ClientConfig::from_file("/nonexistent/config.json").is_err());
    }
}
