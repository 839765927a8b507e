//! Credential digests for SoftEther authentication.
//!
//! This module provides:
//! - SHA-0 (the protocol's only digest)
//! - Password hashing and the challenge response sent at login
//! - Secret 20-byte credentials that wipe themselves on drop

mod sha0;

use std::fmt;

use base64::prelude::*;
use rand::RngCore;
use zeroize::Zeroize;

pub use sha0::{Sha0, DIGEST_LEN};

/// Hash data using SHA-0.
pub fn sha0(data: &[u8]) -> [u8; DIGEST_LEN] {
    Sha0::hash(data)
}

/// Compute the stored credential digest.
///
/// Algorithm: SHA0(password || UPPERCASE(username))
pub fn hash_password(password: &str, username: &str) -> PasswordHash {
    let mut hasher = Sha0::new();
    hasher.update(password.as_bytes());
    hasher.update(username.to_uppercase().as_bytes());
    PasswordHash(hasher.finalize())
}

/// Compute the login challenge response.
///
/// Algorithm: SHA0(password_hash || server_random)
pub fn secure_password(hash: &PasswordHash, server_random: &[u8; DIGEST_LEN]) -> [u8; DIGEST_LEN] {
    let mut hasher = Sha0::new();
    hasher.update(&hash.0);
    hasher.update(server_random);
    hasher.finalize()
}

/// Fresh per-connection client identifier: SHA-0 of 64 random bytes.
pub fn unique_id() -> [u8; DIGEST_LEN] {
    sha0(&random_bytes::<64>())
}

/// Generate random bytes using the thread-local CSPRNG.
pub fn random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

macro_rules! secret_digest {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq)]
        pub struct $name([u8; DIGEST_LEN]);

        impl $name {
            /// Wrap raw digest bytes; `None` unless exactly 20 bytes.
            pub fn from_slice(bytes: &[u8]) -> Option<Self> {
                <[u8; DIGEST_LEN]>::try_from(bytes).ok().map(Self)
            }

            /// Decode a base64 digest; `None` unless it yields 20 bytes.
            pub fn from_base64(text: &str) -> Option<Self> {
                let mut raw = BASE64_STANDARD.decode(text.trim()).ok()?;
                let digest = Self::from_slice(&raw);
                raw.zeroize();
                digest
            }

            pub fn to_base64(&self) -> String {
                BASE64_STANDARD.encode(self.0)
            }

            pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
                &self.0
            }
        }

        impl From<[u8; DIGEST_LEN]> for $name {
            fn from(bytes: [u8; DIGEST_LEN]) -> Self {
                Self(bytes)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(concat!(stringify!($name), "(<redacted>)"))
            }
        }

        impl Drop for $name {
            fn drop(&mut self) {
                self.0.zeroize();
            }
        }
    };
}

secret_digest! {
    /// Stored password digest, `SHA0(password || UPPER(username))`.
    PasswordHash
}

secret_digest! {
    /// Server-issued login ticket.
    Ticket
}
