//! BPF capture buffer parsing.
//!
//! A BPF read returns several records back to back. Each starts with a
//! `bpf_hdr` in host byte order:
//!
//! ```text
//! offset 0   timestamp (8 bytes, two 32-bit fields)
//! offset 8   bh_caplen  u32   captured length
//! offset 12  bh_datalen u32   original length
//! offset 16  bh_hdrlen  u16   header length including padding
//! ```
//!
//! The frame starts `bh_hdrlen` bytes into the record and the next record
//! starts at `hdrlen + caplen` rounded up to the word size.

use bytes::Bytes;

use crate::error::{Error, Result};

/// Bytes of `bpf_hdr` that must be present to read the lengths.
pub const BPF_HDR_MIN_LEN: usize = 18;

/// Split a capture buffer into frames.
///
/// `word` is the record alignment and must be a power of two.
pub fn parse_records(buf: &[u8], word: usize) -> Result<Vec<Bytes>> {
    debug_assert!(word.is_power_of_two());

    let mut frames = Vec::new();
    let mut pos = 0;
    while pos < buf.len() {
        let header = buf
            .get(pos..pos + BPF_HDR_MIN_LEN)
            .ok_or_else(|| Error::adapter(format!("truncated bpf header at {pos}")))?;
        let caplen = u32::from_ne_bytes([header[8], header[9], header[10], header[11]]) as usize;
        let hdrlen = u16::from_ne_bytes([header[16], header[17]]) as usize;
        if hdrlen < BPF_HDR_MIN_LEN {
            return Err(Error::adapter(format!("bpf header length {hdrlen} too small")));
        }

        let start = pos + hdrlen;
        let frame = buf
            .get(start..start + caplen)
            .ok_or_else(|| Error::adapter(format!("truncated bpf record at {pos}")))?;
        frames.push(Bytes::copy_from_slice(frame));

        pos += word_align(hdrlen + caplen, word);
    }
    Ok(frames)
}

fn word_align(len: usize, word: usize) -> usize {
    (len + word - 1) & !(word - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Append one record the way the kernel lays it out.
    fn push_record(buf: &mut Vec<u8>, frame: &[u8], hdrlen: u16, word: usize) {
        let start = buf.len();
        buf.extend_from_slice(&[0u8; 8]);
        buf.extend_from_slice(&(frame.len() as u32).to_ne_bytes());
        buf.extend_from_slice(&(frame.len() as u32).to_ne_bytes());
        buf.extend_from_slice(&hdrlen.to_ne_bytes());
        buf.resize(start + hdrlen as usize, 0);
        buf.extend_from_slice(frame);
        let end = start + word_align(buf.len() - start, word);
        buf.resize(end, 0xEE);
    }

    #[test]
    fn test_word_align() {
        assert_eq!(word_align(18 + 60, 4), 80);
        assert_eq!(word_align(18 + 60, 8), 80);
        assert_eq!(word_align(18 + 61, 4), 80);
        assert_eq!(word_align(18 + 63, 8), 88);
        assert_eq!(word_align(20, 4), 20);
    }

    #[test]
    fn test_records_for_both_word_sizes() {
        let frames: Vec<Vec<u8>> = vec![vec![1; 60], vec![2; 61], vec![3; 1514], vec![4; 63]];
        for word in [4usize, 8] {
            let mut buf = Vec::new();
            for frame in &frames {
                push_record(&mut buf, frame, 18, word);
            }
            let parsed = parse_records(&buf, word).unwrap();
            assert_eq!(parsed.len(), frames.len(), "word {word}");
            for (got, want) in parsed.iter().zip(&frames) {
                assert_eq!(got.as_ref(), want.as_slice());
            }
        }
    }

    #[test]
    fn test_padded_header() {
        let mut buf = Vec::new();
        push_record(&mut buf, b"frame-one", 20, 4);
        push_record(&mut buf, b"frame-two", 20, 4);
        let parsed = parse_records(&buf, 4).unwrap();
        assert_eq!(parsed, vec![Bytes::from_static(b"frame-one"), Bytes::from_static(b"frame-two")]);
    }

    #[test]
    fn test_last_record_without_trailing_padding() {
        let mut buf = Vec::new();
        push_record(&mut buf, &[9; 61], 18, 8);
        buf.truncate(18 + 61);
        assert_eq!(parse_records(&buf, 8).unwrap().len(), 1);
    }

    #[test]
    fn test_truncated_buffers() {
        let mut buf = Vec::new();
        push_record(&mut buf, &[1; 100], 18, 4);
        assert!(parse_records(&buf[..10], 4).is_err());
        assert!(parse_records(&buf[..50], 4).is_err());

        let mut bad = buf.clone();
        bad[16..18].copy_from_slice(&4u16.to_ne_bytes());
        assert!(parse_records(&bad, 4).is_err());
    }

    #[test]
    fn test_empty_buffer() {
        assert!(parse_records(&[], 8).unwrap().is_empty());
    }
}
