//! Signature upload body.
//!
//! The first request on a connection proves to the server that the peer is a
//! VPN client. Servers accept either their full watermark image followed by
//! random padding, or the short `VPNCONNECT` marker on its own.
//!
//! The default is the marker, deliberately sent without the 0 to 1999 random
//! bytes that follow an image. Configure an image to get the padded form.

use std::path::Path;

use bytes::{Bytes, BytesMut};
use rand::{Rng, RngCore};

use super::constants::HTTP_PACK_RAND_SIZE_MAX;
use crate::error::{Error, Result};

/// Marker accepted in place of the watermark image.
pub const CONNECT_MARKER: &[u8] = b"VPNCONNECT";

/// What to upload as the connection signature.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Watermark {
    /// Send [`CONNECT_MARKER`] unpadded.
    #[default]
    ConnectMarker,
    /// Send these bytes followed by up to 2000 random bytes.
    Image(Bytes),
}

impl Watermark {
    /// Load a watermark image from disk.
    pub fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)
            .map_err(|e| Error::config(format!("watermark {}: {e}", path.display())))?;
        if data.is_empty() {
            return Err(Error::config(format!("watermark {} is empty", path.display())));
        }
        Ok(Self::Image(Bytes::from(data)))
    }

    /// Build the upload body.
    pub fn body(&self) -> Bytes {
        match self {
            Self::ConnectMarker => Bytes::from_static(CONNECT_MARKER),
            Self::Image(image) => {
                let mut rng = rand::thread_rng();
                let pad = rng.gen_range(0..HTTP_PACK_RAND_SIZE_MAX * 2);
                let mut body = BytesMut::zeroed(image.len() + pad);
                body[..image.len()].copy_from_slice(image);
                rng.fill_bytes(&mut body[image.len()..]);
                body.freeze()
            }
        }
    }
}
