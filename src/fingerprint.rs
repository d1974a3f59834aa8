//! Content fingerprints for change detection.
//!
//! Files up to [`SamplingPolicy::threshold_bytes`] are hashed in full with
//! SHA-256. Larger files are hashed over a deterministic sample: the head,
//! middle, and tail slices plus the total length. A change confined to the
//! unsampled regions of such a file is not detected; that is the price of
//! bounded hashing cost on huge generated or data files.

use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use sha2::{Digest, Sha256};

/// 1 MiB.
pub const DEFAULT_SAMPLE_THRESHOLD: u64 = 1024 * 1024;
/// 64 KiB per slice.
pub const DEFAULT_SAMPLE_SLICE: u64 = 64 * 1024;

/// When and how much of a file to sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplingPolicy {
    /// Files strictly larger than this are sampled.
    pub threshold_bytes: u64,
    /// Size of each of the head / middle / tail slices.
    pub slice_bytes: u64,
}

impl Default for SamplingPolicy {
    fn default() -> Self {
        Self {
            threshold_bytes: DEFAULT_SAMPLE_THRESHOLD,
            slice_bytes: DEFAULT_SAMPLE_SLICE,
        }
    }
}

impl SamplingPolicy {
    fn samples(&self, len: u64) -> bool {
        len > self.threshold_bytes && len > self.slice_bytes.saturating_mul(3)
    }
}

/// Hex-encoded digest of file content.
pub type Fingerprint = String;

/// Full SHA-256 digest of a buffer, never sampled.
pub fn digest(bytes: &[u8]) -> Fingerprint {
    format!("{:x}", Sha256::digest(bytes))
}

/// Fingerprint an in-memory buffer.
pub fn fingerprint_bytes(bytes: &[u8], policy: &SamplingPolicy) -> Fingerprint {
    let len = bytes.len() as u64;
    let mut hasher = Sha256::new();
    if policy.samples(len) {
        let slice = policy.slice_bytes as usize;
        let mid_start = (bytes.len() - slice) / 2;
        hasher.update(b"sampled:");
        hasher.update(len.to_le_bytes());
        hasher.update(&bytes[..slice]);
        hasher.update(&bytes[mid_start..mid_start + slice]);
        hasher.update(&bytes[bytes.len() - slice..]);
    } else {
        hasher.update(bytes);
    }
    format!("{:x}", hasher.finalize())
}

/// Fingerprint a file on disk, reading only the sampled slices of large files.
pub fn fingerprint_file(path: &Path, policy: &SamplingPolicy) -> std::io::Result<Fingerprint> {
    let mut file = std::fs::File::open(path)?;
    let len = file.metadata()?.len();

    if !policy.samples(len) {
        let mut bytes = Vec::with_capacity(len as usize);
        file.read_to_end(&mut bytes)?;
        return Ok(fingerprint_bytes(&bytes, policy));
    }

    let slice = policy.slice_bytes;
    let mut hasher = Sha256::new();
    hasher.update(b"sampled:");
    hasher.update(len.to_le_bytes());
    let mut buf = vec![0u8; slice as usize];
    for offset in [0, (len - slice) / 2, len - slice] {
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(&mut buf)?;
        hasher.update(&buf);
    }
    Ok(format!("{:x}", hasher.finalize()))
}
