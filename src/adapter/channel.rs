//! Adapter backed by in-process channels.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::AbortHandle;
use tracing::debug;

use super::{Adapter, FrameBatch};
use crate::error::{Error, Result};

/// Frames arrive on `rx` and leave on `tx`.
///
/// Background tasks feeding the channels can be attached so that
/// [`Adapter::destroy`] stops them.
pub struct ChannelAdapter {
    name: String,
    rx: AsyncMutex<mpsc::Receiver<FrameBatch>>,
    tx: mpsc::Sender<FrameBatch>,
    tasks: Mutex<Vec<AbortHandle>>,
    closed: AtomicBool,
}

impl ChannelAdapter {
    pub fn new(
        name: impl Into<String>,
        tx: mpsc::Sender<FrameBatch>,
        rx: mpsc::Receiver<FrameBatch>,
    ) -> Self {
        Self {
            name: name.into(),
            rx: AsyncMutex::new(rx),
            tx,
            tasks: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Two adapters wired back to back: what one writes, the other reads.
    pub fn pair(a: &str, b: &str, capacity: usize) -> (Self, Self) {
        let (a_tx, b_rx) = mpsc::channel(capacity);
        let (b_tx, a_rx) = mpsc::channel(capacity);
        (Self::new(a, a_tx, a_rx), Self::new(b, b_tx, b_rx))
    }

    /// Stop `task` when this adapter is destroyed.
    pub fn attach_task(&self, task: AbortHandle) {
        // `closed` only flips under this lock.
        let mut tasks = self.tasks.lock();
        if self.closed.load(Ordering::Acquire) {
            task.abort();
            return;
        }
        tasks.push(task);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[async_trait]
impl Adapter for ChannelAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn read(&self) -> Result<FrameBatch> {
        if self.is_closed() {
            return Err(Error::ChannelClosed);
        }
        let mut rx = self.rx.lock().await;
        loop {
            match rx.recv().await {
                Some(batch) if batch.is_empty() => continue,
                Some(batch) => return Ok(batch),
                None => return Err(Error::ChannelClosed),
            }
        }
    }

    async fn write(&self, batch: FrameBatch) -> Result<()> {
        if self.is_closed() {
            return Err(Error::ChannelClosed);
        }
        if batch.is_empty() {
            return Ok(());
        }
        self.tx.send(batch).await.map_err(|_| Error::ChannelClosed)
    }

    async fn destroy(&self) {
        let tasks = {
            let mut tasks = self.tasks.lock();
            if self.closed.swap(true, Ordering::AcqRel) {
                return;
            }
            std::mem::take(&mut *tasks)
        };
        debug!(adapter = %self.name, tasks = tasks.len(), "destroying channel adapter");
        for task in tasks {
            task.abort();
        }
    }
}
