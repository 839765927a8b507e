//! Duplex relay between two adapters.

use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::adapter::Adapter;
use crate::error::{Error, Result};

/// Pump batches both ways until one direction fails.
///
/// On the first failure the other pump is stopped, both adapters are
/// destroyed and the failure is returned. The relay never ends without an
/// error. Dropping the future stops both pumps.
pub async fn relay(left: Arc<dyn Adapter>, right: Arc<dyn Adapter>) -> Result<()> {
    let mut pumps = JoinSet::new();
    pumps.spawn(pump(left.clone(), right.clone()));
    pumps.spawn(pump(right.clone(), left.clone()));

    let err = match pumps.join_next().await {
        Some(Ok(err)) => err,
        Some(Err(join_err)) => Error::protocol(format!("relay task failed: {join_err}")),
        None => Error::ChannelClosed,
    };
    pumps.abort_all();

    warn!(left = left.name(), right = right.name(), "Relay stopped: {}", err);
    left.destroy().await;
    right.destroy().await;
    Err(err)
}

async fn pump(from: Arc<dyn Adapter>, to: Arc<dyn Adapter>) -> Error {
    loop {
        let batch = match from.read().await {
            Ok(batch) => batch,
            Err(e) => {
                debug!(from = from.name(), "read failed");
                return e;
            }
        };
        if let Err(e) = to.write(batch).await {
            debug!(to = to.name(), "write failed");
            return e;
        }
    }
}
