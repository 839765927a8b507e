//! SoftEther protocol constants.

/// VPN target path for control-plane Packs.
pub const VPN_TARGET: &str = "/vpnsvc/vpn.cgi";

/// Signature target path for the watermark upload.
pub const SIGNATURE_TARGET: &str = "/vpnsvc/connect.cgi";

/// Content type for signature requests.
pub const CONTENT_TYPE_SIGNATURE: &str = "image/jpeg";

/// Content type for Pack data.
pub const CONTENT_TYPE_PACK: &str = "application/octet-stream";

/// Keep-Alive header advertised with every control-plane request.
pub const HTTP_KEEP_ALIVE: &str = "timeout=15; max=19";

/// Upper bound (exclusive) of the Pack padding size; the watermark padding
/// uses twice this.
pub const HTTP_PACK_RAND_SIZE_MAX: usize = 1000;

/// Name of the padding element added to outgoing Packs.
pub const PADDING_ELEMENT: &str = "pencore";

/// Client identification string.
pub const CLIENT_STRING: &str = "SoftEther (Rust) VPN Client";

/// Client version number.
pub const CLIENT_VERSION: u32 = 444;

/// Client build number.
pub const CLIENT_BUILD: u32 = 9807;

/// Client id sent at login.
pub const CLIENT_ID: u32 = 123;

/// Branding string for the connection limit.
pub const BRAND_STRING: &str = "Branded_VPN";

/// SHA-1/SHA-0 digest size.
pub const SHA_SIZE: usize = 20;

/// Maximum size of a single DATA value (384 MiB).
pub const MAX_VALUE_SIZE: usize = 384 * 1024 * 1024;

/// Maximum number of values per Pack element.
pub const MAX_VALUE_NUM: usize = 262_144;

/// Maximum number of elements in a Pack.
pub const MAX_ELEMENT_NUM: usize = 262_144;

/// Maximum length of an element name.
pub const MAX_ELEMENT_NAME_LEN: usize = 63;

/// Maximum size of a serialized Pack (512 MiB).
pub const MAX_PACK_SIZE: usize = 512 * 1024 * 1024;

/// Keepalive magic number.
pub const KEEPALIVE_MAGIC: u32 = 0xFFFF_FFFF;

/// Keepalive padding sizes are drawn from `1..MAX_KEEPALIVE_SIZE`.
pub const MAX_KEEPALIVE_SIZE: usize = 512;

/// Maximum size of a response status line plus headers.
pub const MAX_HEADER_SIZE: usize = 64 * 1024;

/// Maximum frames accepted in one inbound batch.
pub const MAX_RECV_BLOCKS: usize = 8192;

/// Maximum size of one inbound frame.
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

/// Bytes written to the connection before tunnel framing starts.
///
/// Interoperability shim: the reference server only switches into tunnel
/// mode after seeing a 5-byte write. Overridable via configuration.
pub const TUNNEL_PROBE: [u8; 5] = [0; 5];

/// Connection protocol value for TCP sessions.
pub const CONNECTION_TCP: u32 = 0;

/// Authentication type codes on the wire.
pub const AUTHTYPE_ANONYMOUS: u32 = 0;
pub const AUTHTYPE_PASSWORD: u32 = 1;
pub const AUTHTYPE_TICKET: u32 = 99;
