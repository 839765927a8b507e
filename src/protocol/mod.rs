//! SoftEther protocol implementation.
//!
//! This module contains:
//! - Pack: Binary serialization format
//! - HTTP: Request/response framing for the handshake
//! - Auth: Hello parsing and the login message
//! - Welcome: Session establishment and hub policy
//! - Tunnel: Data channel framing
//! - Watermark: Signature upload body

mod auth;
mod constants;
mod error_code;
mod http;
mod pack;
mod tunnel;
mod watermark;
mod welcome;

pub use auth::{ClientAuth, ConnectionOptions, Hello, LoginRequest, NodeInfo, OsInfo};
pub use constants::*;
pub use error_code::ErrorCode;
pub use http::{http_date, validate_pack_response, HttpCodec, HttpRequest, HttpResponse};
pub use pack::{Pack, PackElement, PackError, PackValue, ValueType};
pub use tunnel::{
    compress, decompress, encode_batch, encode_keepalive, keepalive_size, read_message,
    TunnelMessage,
};
pub use watermark::{Watermark, CONNECT_MARKER};
pub use welcome::{Policy, Session};
