//! On-disk formats.
//!
//! # Sketch files
//!
//! Header-free and fixed-width: `P` little-endian `u64` minima in permutation
//! order, exactly `8 * P` bytes. The permutation count is implied by the
//! length; seeds are not recorded, so readers must use the same
//! [`crate::config::SketchConfig`] that wrote the file.
//!
//! ```text
//! ┌──────────┬──────────┬─────┬──────────────┐
//! │ min₀ (8B)│ min₁ (8B)│ ... │ min_{P-1}(8B)│
//! └──────────┴──────────┴─────┴──────────────┘
//! ```
//!
//! # Artifact files
//!
//! Built indexes and matrices are postcard-encoded behind a small header.
//! The payload is the pair `(SketchConfig, value)`:
//!
//! ```text
//! ┌───────────────┬──────────────┬──────────────────────┐
//! │ Magic (4B)    │ Version (1B) │ postcard payload     │
//! │ "CSKA"        │ 1            │                      │
//! └───────────────┴──────────────┴──────────────────────┘
//! ```

use crate::error::{Result, SketchError};
use crate::hash::MinHashSignature;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Magic bytes for artifact files.
pub const ARTIFACT_MAGIC: &[u8; 4] = b"CSKA";

/// Current artifact format version.
pub const ARTIFACT_VERSION: u8 = 1;

const HEADER_LEN: usize = ARTIFACT_MAGIC.len() + 1;

/// Encode a signature as `8 * P` little-endian bytes.
pub fn encode_signature(signature: &MinHashSignature) -> Vec<u8> {
    let mut buf = Vec::with_capacity(signature.num_perm() * 8);
    for v in signature.values() {
        buf.extend_from_slice(&v.to_le_bytes());
    }
    buf
}

/// Decode a signature; the byte length must be a non-zero multiple of 8.
pub fn decode_signature(bytes: &[u8]) -> Result<MinHashSignature> {
    if bytes.is_empty() || bytes.len() % 8 != 0 {
        return Err(SketchError::Format(format!(
            "sketch length {} is not a non-zero multiple of 8",
            bytes.len()
        )));
    }
    let values = bytes
        .chunks_exact(8)
        .map(|chunk| {
            let mut word = [0u8; 8];
            word.copy_from_slice(chunk);
            u64::from_le_bytes(word)
        })
        .collect();
    Ok(MinHashSignature::from_values(values))
}

/// Encode an artifact with header.
pub fn encode_artifact<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(HEADER_LEN);
    buf.extend_from_slice(ARTIFACT_MAGIC);
    buf.push(ARTIFACT_VERSION);
    Ok(postcard::to_extend(value, buf)?)
}

/// Decode an artifact, checking magic and version.
pub fn decode_artifact<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    if bytes.len() < HEADER_LEN || &bytes[..ARTIFACT_MAGIC.len()] != ARTIFACT_MAGIC {
        return Err(SketchError::Format("missing artifact magic".into()));
    }
    let version = bytes[ARTIFACT_MAGIC.len()];
    if version != ARTIFACT_VERSION {
        return Err(SketchError::Format(format!(
            "unsupported artifact version {version} (expected {ARTIFACT_VERSION})"
        )));
    }
    Ok(postcard::from_bytes(&bytes[HEADER_LEN..])?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_layout_is_little_endian() {
        let sig = MinHashSignature::from_values(vec![1, u64::MAX]);
        let bytes = encode_signature(&sig);
        assert_eq!(bytes.len(), 16);
        assert_eq!(&bytes[..8], &[1, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(&bytes[8..], &[0xff; 8]);
        assert_eq!(decode_signature(&bytes).unwrap(), sig);
    }

    #[test]
    fn test_decode_rejects_bad_lengths() {
        assert!(matches!(decode_signature(&[]), Err(SketchError::Format(_))));
        assert!(matches!(decode_signature(&[0; 12]), Err(SketchError::Format(_))));
    }

    #[test]
    fn test_artifact_header() {
        let bytes = encode_artifact(&vec![1u32, 2, 3]).unwrap();
        assert_eq!(&bytes[..4], ARTIFACT_MAGIC);
        assert_eq!(bytes[4], ARTIFACT_VERSION);
        let back: Vec<u32> = decode_artifact(&bytes).unwrap();
        assert_eq!(back, vec![1, 2, 3]);

        let mut wrong_version = bytes.clone();
        wrong_version[4] = 99;
        assert!(decode_artifact::<Vec<u32>>(&wrong_version).is_err());
        assert!(decode_artifact::<Vec<u32>>(b"nope").is_err());
    }
}
