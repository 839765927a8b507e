//! Frame adapters.
//!
//! An adapter moves batches of Ethernet frames in and out of something: the
//! tunnel (via in-process channels) or a host network interface. The relay
//! only sees the [`Adapter`] trait.

mod bpf;
mod channel;
mod naming;

#[cfg(target_os = "macos")]
mod macos;

pub use bpf::{parse_records, BPF_HDR_MIN_LEN};
pub use channel::ChannelAdapter;
pub use naming::FethPair;

#[cfg(target_os = "macos")]
pub use macos::FethAdapter;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// One unit of transfer: the frames moved by a single read or write.
pub type FrameBatch = Vec<Bytes>;

/// A source and sink of Ethernet frame batches.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Adapter name for logs.
    fn name(&self) -> &str;

    /// Wait for the next non-empty batch.
    async fn read(&self) -> Result<FrameBatch>;

    /// Deliver a batch.
    async fn write(&self, batch: FrameBatch) -> Result<()>;

    /// Release resources. Safe to call more than once.
    async fn destroy(&self);
}

/// Create the host-side adapter for `name`.
///
/// `mac` is assigned to the interface when given.
pub async fn create_host_adapter(name: &str, mac: Option<&str>) -> Result<Arc<dyn Adapter>> {
    let pair = FethPair::parse(name)?;

    #[cfg(target_os = "macos")]
    {
        let adapter = FethAdapter::create(pair, mac).await?;
        Ok(Arc::new(adapter))
    }

    #[cfg(not(target_os = "macos"))]
    {
        let _ = mac;
        Err(crate::Error::adapter(format!(
            "{} needs a macOS feth interface, not available on {}",
            pair.name(),
            std::env::consts::OS
        )))
    }
}

/// Ask the system DHCP client to configure the interface.
pub async fn invoke_dhcp(name: &str) -> Result<()> {
    #[cfg(target_os = "macos")]
    {
        macos::invoke_dhcp(name).await
    }

    #[cfg(not(target_os = "macos"))]
    {
        Err(crate::Error::adapter(format!(
            "DHCP on {name} is only supported on macOS"
        )))
    }
}
