//! Error types for the SoftEther client.

use thiserror::Error;

use crate::protocol::{ErrorCode, PackError};

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the client.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TLS errors
    #[error("TLS error: {0}")]
    Tls(String),

    /// Connection errors
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// DNS resolution error
    #[error("DNS resolution failed: {0}")]
    DnsResolution(String),

    /// Timeout
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Malformed or oversized Pack
    #[error("Pack error: {0}")]
    Pack(#[from] PackError),

    /// The peer answered with something other than a VPN control response
    #[error("Destination server is not a VPN server: {0}")]
    NotAVpnServer(String),

    /// Hello message is missing mandatory fields
    #[error("Invalid hello: {0}")]
    InvalidHello(&'static str),

    /// Authentication mode we do not implement
    #[error("Unsupported authentication mode: {0}")]
    UnsupportedAuthMode(&'static str),

    /// Server returned an error code
    #[error("Server error {}: {}", .0.code(), .0.description())]
    Server(ErrorCode),

    /// Server branding string differs from ours
    #[error("Branding mismatch: server sent {0:?}")]
    BrandMismatch(String),

    /// Session key has the wrong length
    #[error("Invalid session key length: {0}")]
    InvalidSessionKey(usize),

    /// Server refused to enable encryption
    #[error("Server did not enable encryption for the session")]
    EncryptionNotNegotiated,

    /// Adapter name outside the feth naming scheme
    #[error("Invalid adapter name {0:?}: valid names are feth0 to feth1023")]
    InvalidAdapterName(String),

    /// Host adapter setup or I/O failure
    #[error("Adapter error: {0}")]
    Adapter(String),

    /// Stored password hash is not a base64 20-byte digest
    #[error("Hashed password must be a base64-encoded 20-byte digest")]
    BadHashedPassword,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Protocol error
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Channel closed
    #[error("Internal channel closed unexpectedly")]
    ChannelClosed,
}

impl Error {
    /// Create a new connection error.
    pub fn connection<S: Into<String>>(msg: S) -> Self {
        Self::ConnectionFailed(msg.into())
    }

    /// Create a new protocol error.
    pub fn protocol<S: Into<String>>(msg: S) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create a new adapter error.
    pub fn adapter<S: Into<String>>(msg: S) -> Self {
        Self::Adapter(msg.into())
    }

    /// Create a new configuration error.
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Create an error from a numeric server code.
    pub fn server(code: u32) -> Self {
        Self::Server(ErrorCode::from_code(code))
    }

    /// Numeric protocol error code carried by this error, if any.
    ///
    /// Local validation failures map onto the code the server would use for
    /// the same condition.
    pub fn server_code(&self) -> Option<u32> {
        match self {
            Self::Server(code) => Some(code.code()),
            Self::NotAVpnServer(_) => Some(ErrorCode::ServerIsNotVpn.code()),
            Self::BrandMismatch(_) => Some(ErrorCode::BrandedCFromS.code()),
            Self::UnsupportedAuthMode(_) => Some(ErrorCode::AuthtypeNotSupported.code()),
            Self::Pack(_) | Self::InvalidHello(_) | Self::InvalidSessionKey(_) => {
                Some(ErrorCode::ProtocolError.code())
            }
            Self::InvalidAdapterName(_) => Some(ErrorCode::VlanInvalidName.code()),
            _ => None,
        }
    }

    /// Whether the error came from configuration or local validation and
    /// happened before any network I/O.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            Self::Config(_)
                | Self::BadHashedPassword
                | Self::InvalidAdapterName(_)
                | Self::UnsupportedAuthMode(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_error_keeps_code() {
        let err = Error::server(9);
        assert_eq!(err.server_code(), Some(9));
        assert!(matches!(err, Error::Server(ErrorCode::AuthFailed)));

        let err = Error::server(4000);
        assert_eq!(err.server_code(), Some(4000));
        assert!(err.to_string().contains("4000"));
    }

    #[test]
    fn test_local_errors() {
        assert!(Error::BadHashedPassword.is_local());
        assert!(Error::InvalidAdapterName("eth0".into()).is_local());
        assert!(!Error::ChannelClosed.is_local());
        assert_eq!(Error::BrandMismatch("x".into()).server_code(), Some(125));
        assert_eq!(Error::NotAVpnServer("status 404".into()).server_code(), Some(2));
    }
}
