//! SHA-0 hash implementation.
//!
//! SHA-0 is the withdrawn predecessor of SHA-1. The protocol still uses it
//! for every credential digest, so it lives here rather than in a crate.
//!
//! It differs from SHA-1 in a single place: the message schedule expansion
//! does not rotate `w[i]` left by one bit.

/// SHA-0 block size in bytes.
const BLOCK_SIZE: usize = 64;

/// SHA-0 digest length in bytes.
pub const DIGEST_LEN: usize = 20;

const INITIAL_STATE: [u32; 5] = [0x6745_2301, 0xEFCD_AB89, 0x98BA_DCFE, 0x1032_5476, 0xC3D2_E1F0];

/// Streaming SHA-0 hasher.
#[derive(Clone)]
pub struct Sha0 {
    state: [u32; 5],
    pending: Vec<u8>,
    length: u64,
}

impl Sha0 {
    pub fn new() -> Self {
        Self {
            state: INITIAL_STATE,
            pending: Vec::with_capacity(BLOCK_SIZE),
            length: 0,
        }
    }

    /// Absorb more input.
    pub fn update(&mut self, data: &[u8]) {
        self.length = self.length.wrapping_add(data.len() as u64);
        self.pending.extend_from_slice(data);

        let full = self.pending.len() - self.pending.len() % BLOCK_SIZE;
        for block in self.pending[..full].chunks_exact(BLOCK_SIZE) {
            compress(&mut self.state, block);
        }
        self.pending.drain(..full);
    }

    /// Pad, process the tail and return the digest.
    pub fn finalize(mut self) -> [u8; DIGEST_LEN] {
        let bit_len = self.length.wrapping_mul(8);

        let mut tail = std::mem::take(&mut self.pending);
        tail.push(0x80);
        while tail.len() % BLOCK_SIZE != BLOCK_SIZE - 8 {
            tail.push(0);
        }
        tail.extend_from_slice(&bit_len.to_be_bytes());
        for block in tail.chunks_exact(BLOCK_SIZE) {
            compress(&mut self.state, block);
        }

        let mut digest = [0u8; DIGEST_LEN];
        for (out, word) in digest.chunks_exact_mut(4).zip(self.state) {
            out.copy_from_slice(&word.to_be_bytes());
        }
        digest
    }

    /// Hash data in one call.
    pub fn hash(data: &[u8]) -> [u8; DIGEST_LEN] {
        let mut hasher = Self::new();
        hasher.update(data);
        hasher.finalize()
    }
}

impl Default for Sha0 {
    fn default() -> Self {
        Self::new()
    }
}

fn compress(state: &mut [u32; 5], block: &[u8]) {
    let mut w = [0u32; 80];
    for (word, bytes) in w.iter_mut().zip(block.chunks_exact(4)) {
        *word = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    }
    for i in 16..80 {
        // No rotate_left(1) here; that is the whole SHA-1 fix.
        w[i] = w[i - 3] ^ w[i - 8] ^ w[i - 14] ^ w[i - 16];
    }

    let [mut a, mut b, mut c, mut d, mut e] = *state;
    for (i, &wi) in w.iter().enumerate() {
        let (f, k) = match i / 20 {
            0 => ((b & c) | (!b & d), 0x5A82_7999),
            1 => (b ^ c ^ d, 0x6ED9_EBA1),
            2 => ((b & c) | (b & d) | (c & d), 0x8F1B_BCDC),
            _ => (b ^ c ^ d, 0xCA62_C1D6),
        };
        let t = a
            .rotate_left(5)
            .wrapping_add(f)
            .wrapping_add(e)
            .wrapping_add(k)
            .wrapping_add(wi);
        e = d;
        d = c;
        c = b.rotate_left(30);
        b = a;
        a = t;
    }

    for (s, v) in state.iter_mut().zip([a, b, c, d, e]) {
        *s = s.wrapping_add(v);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha0_empty() {
        assert_eq!(
            hex::encode(Sha0::hash(b"")),
            "f96cea198ad1dd5617ac084a3d92c6107708c0ef"
        );
    }

    #[test]
    fn test_sha0_abc() {
        assert_eq!(
            hex::encode(Sha0::hash(b"abc")),
            "0164b8a914cd2a5e74c4f7ff082c4d97f1edf880"
        );
    }

    #[test]
    fn test_sha0_incremental_matches_one_shot() {
        let data: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        let mut hasher = Sha0::new();
        for chunk in data.chunks(37) {
            hasher.update(chunk);
        }
        assert_eq!(hasher.finalize(), Sha0::hash(&data));
    }

    #[test]
    fn test_padding_boundaries() {
        // 55, 56 and 64 bytes straddle the one-block / two-block padding split.
        for len in [55usize, 56, 63, 64, 65] {
            let data = vec![0x61u8; len];
            let mut split = Sha0::new();
            split.update(&data[..len / 2]);
            split.update(&data[len / 2..]);
            assert_eq!(split.finalize(), Sha0::hash(&data), "len {len}");
        }
    }
}
