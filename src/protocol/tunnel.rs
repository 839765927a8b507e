//! SoftEther tunnel data channel framing.
//!
//! After the welcome the connection carries Ethernet frames in batches.
//!
//! ## Wire Format
//!
//! Data batch:
//! ```text
//! [num_frames:u32] ([frame_len:u32] [frame:bytes])*
//! ```
//!
//! Keep-alive:
//! ```text
//! [0xFFFFFFFF:u32] [size:u32] [padding:bytes]
//! ```
//!
//! With compression negotiated each frame body is zlib-compressed on its own.

use std::io::{Read, Write};

use bytes::{BufMut, Bytes, BytesMut};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use rand::{Rng, RngCore};
use tokio::io::{AsyncRead, AsyncReadExt};

use super::constants::*;
use crate::error::{Error, Result};

/// One message read off the tunnel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TunnelMessage {
    /// A batch of frames, possibly empty.
    Frames(Vec<Bytes>),
    /// A keepalive whose padding has already been discarded.
    Keepalive(usize),
}

/// Read one message, draining keepalive padding.
pub async fn read_message<R>(reader: &mut R, compressed: bool) -> Result<TunnelMessage>
where
    R: AsyncRead + Unpin,
{
    let count = reader.read_u32().await?;
    if count == KEEPALIVE_MAGIC {
        let size = reader.read_u32().await?;
        let drained = tokio::io::copy(&mut reader.take(u64::from(size)), &mut tokio::io::sink()).await?;
        if drained != u64::from(size) {
            return Err(Error::Io(std::io::ErrorKind::UnexpectedEof.into()));
        }
        return Ok(TunnelMessage::Keepalive(size as usize));
    }

    let count = count as usize;
    if count > MAX_RECV_BLOCKS {
        return Err(Error::protocol(format!("batch of {count} frames exceeds limit")));
    }

    let mut frames = Vec::with_capacity(count);
    for _ in 0..count {
        let len = reader.read_u32().await? as usize;
        if len > MAX_FRAME_SIZE {
            return Err(Error::protocol(format!("frame of {len} bytes exceeds limit")));
        }
        let mut buf = BytesMut::zeroed(len);
        reader.read_exact(&mut buf).await?;
        let frame = if compressed {
            Bytes::from(decompress(&buf)?)
        } else {
            buf.freeze()
        };
        frames.push(frame);
    }
    Ok(TunnelMessage::Frames(frames))
}

/// Encode a batch of frames.
pub fn encode_batch(frames: &[Bytes], compressed: bool) -> Result<Bytes> {
    let body: usize = frames.iter().map(|f| f.len() + 4).sum();
    let mut buf = BytesMut::with_capacity(4 + body);
    buf.put_u32(frames.len() as u32);
    for frame in frames {
        if compressed {
            let packed = compress(frame)?;
            buf.put_u32(packed.len() as u32);
            buf.put_slice(&packed);
        } else {
            buf.put_u32(frame.len() as u32);
            buf.put_slice(frame);
        }
    }
    Ok(buf.freeze())
}

/// Encode a keepalive with `size` random padding bytes.
pub fn encode_keepalive(size: usize) -> Bytes {
    let mut padding = vec![0u8; size];
    rand::thread_rng().fill_bytes(&mut padding);

    let mut buf = BytesMut::with_capacity(8 + size);
    buf.put_u32(KEEPALIVE_MAGIC);
    buf.put_u32(size as u32);
    buf.put_slice(&padding);
    buf.freeze()
}

/// Random keepalive padding size in `1..MAX_KEEPALIVE_SIZE`.
pub fn keepalive_size() -> usize {
    rand::thread_rng().gen_range(1..MAX_KEEPALIVE_SIZE)
}

/// Compress data with zlib.
pub fn compress(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::with_capacity(data.len()), Compression::default());
    encoder
        .write_all(data)
        .and_then(|_| encoder.finish())
        .map_err(|e| Error::protocol(format!("compression failed: {e}")))
}

/// Decompress one zlib frame, refusing output above the frame limit.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(data.len() * 2);
    ZlibDecoder::new(data)
        .take(MAX_FRAME_SIZE as u64 + 1)
        .read_to_end(&mut out)
        .map_err(|e| Error::protocol(format!("decompression failed: {e}")))?;
    if out.len() > MAX_FRAME_SIZE {
        return Err(Error::protocol("decompressed frame exceeds limit"));
    }
    Ok(out)
}
