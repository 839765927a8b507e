//! feth interface naming.

use crate::error::{Error, Result};

/// Number of usable feth units; each unit `N` is paired with `N + FETH_UNITS`.
pub const FETH_UNITS: u32 = 1024;

/// A `feth<N>` interface and its `feth<N+1024>` peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FethPair {
    unit: u32,
}

impl FethPair {
    /// Parse `feth<N>` with `0 <= N < 1024`, written without sign or padding.
    pub fn parse(name: &str) -> Result<Self> {
        let invalid = || Error::InvalidAdapterName(name.to_string());

        let digits = name.strip_prefix("feth").ok_or_else(invalid)?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        if digits.len() > 1 && digits.starts_with('0') {
            return Err(invalid());
        }
        let unit: u32 = digits.parse().map_err(|_| invalid())?;
        if unit >= FETH_UNITS {
            return Err(invalid());
        }
        Ok(Self { unit })
    }

    /// The interface the host sees.
    pub fn name(&self) -> String {
        format!("feth{}", self.unit)
    }

    /// The peer the client reads from and writes to.
    pub fn peer(&self) -> String {
        format!("feth{}", self.unit + FETH_UNITS)
    }
}
