//! Tunnel tasks.
//!
//! Once the session is established the connection is split in two: an
//! inbound task that turns wire messages into frame batches and an outbound
//! task that writes batches and keeps the link alive when idle. Both talk to
//! the rest of the client through a [`ChannelAdapter`].

use std::io::Cursor;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, WriteHalf};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::adapter::{ChannelAdapter, FrameBatch};
use crate::error::Result;
use crate::protocol::{
    encode_batch, encode_keepalive, keepalive_size, read_message, TunnelMessage, TUNNEL_PROBE,
};

/// Batches buffered in each direction.
pub const CHANNEL_CAPACITY: usize = 16;

/// Default idle time before a keepalive is sent.
pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(3);

/// Name of the tunnel-side adapter.
pub const TUNNEL_ADAPTER_NAME: &str = "tunnel";

#[derive(Debug, Clone)]
pub struct TunnelOptions {
    /// Written once before any frame.
    pub probe: Bytes,
    /// Per-frame zlib compression negotiated at login.
    pub compress: bool,
    pub keepalive_interval: Duration,
}

impl Default for TunnelOptions {
    fn default() -> Self {
        Self {
            probe: Bytes::from_static(&TUNNEL_PROBE),
            compress: false,
            keepalive_interval: DEFAULT_KEEPALIVE_INTERVAL,
        }
    }
}

/// Start the tunnel over an established stream.
///
/// `leftover` holds bytes already read past the welcome; they are consumed
/// before the stream. The returned adapter owns both tasks and stops them on
/// destroy.
pub async fn spawn_tunnel<S>(
    mut stream: S,
    leftover: Bytes,
    options: TunnelOptions,
) -> Result<ChannelAdapter>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    // Interoperability shim, see `TUNNEL_PROBE`.
    if !options.probe.is_empty() {
        stream.write_all(&options.probe).await?;
        stream.flush().await?;
    }

    let (read_half, write_half) = tokio::io::split(stream);
    let (inbound_tx, inbound_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (outbound_tx, outbound_rx) = mpsc::channel(CHANNEL_CAPACITY);

    let compress = options.compress;
    let reader = tokio::spawn(async move {
        let mut reader = Cursor::new(leftover).chain(read_half);
        if let Err(e) = inbound(&mut reader, compress, inbound_tx).await {
            warn!("Tunnel receive failed: {}", e);
        }
        debug!("Tunnel receive task finished");
    });

    let reader_handle = reader.abort_handle();
    let writer = tokio::spawn(async move {
        if let Err(e) = outbound(write_half, outbound_rx, options).await {
            warn!("Tunnel send failed: {}", e);
        }
        reader_handle.abort();
        debug!("Tunnel send task finished");
    });

    let adapter = ChannelAdapter::new(TUNNEL_ADAPTER_NAME, outbound_tx, inbound_rx);
    adapter.attach_task(reader.abort_handle());
    adapter.attach_task(writer.abort_handle());
    info!(compress, "Tunnel started");
    Ok(adapter)
}

async fn inbound<R>(reader: &mut R, compress: bool, tx: mpsc::Sender<FrameBatch>) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    loop {
        match read_message(reader, compress).await? {
            TunnelMessage::Keepalive(size) => debug!(size, "Keepalive received"),
            TunnelMessage::Frames(frames) if frames.is_empty() => {}
            TunnelMessage::Frames(frames) => {
                if tx.send(frames).await.is_err() {
                    return Ok(());
                }
            }
        }
    }
}

async fn outbound<S>(
    mut writer: WriteHalf<S>,
    mut rx: mpsc::Receiver<FrameBatch>,
    options: TunnelOptions,
) -> Result<()>
where
    S: AsyncWrite,
{
    let mut ticker = tokio::time::interval(options.keepalive_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    let mut sent_since_tick = false;
    loop {
        tokio::select! {
            batch = rx.recv() => {
                let Some(batch) = batch else {
                    return Ok(());
                };
                if batch.is_empty() {
                    continue;
                }
                let wire = encode_batch(&batch, options.compress)?;
                writer.write_all(&wire).await?;
                writer.flush().await?;
                sent_since_tick = true;
            }
            _ = ticker.tick() => {
                if !sent_since_tick {
                    let size = keepalive_size();
                    writer.write_all(&encode_keepalive(size)).await?;
                    writer.flush().await?;
                    debug!(size, "Keepalive sent");
                }
                sent_since_tick = false;
            }
        }
    }
}
