//! On-disk cache framing and artifact hashing.
//!
//! A cache entry is a 16-byte-aligned header followed immediately by the
//! data: `{u8 header_version, u32 total_cached_bytes, u32 data_checksum}`.
//! The checksum is Adler-32 over the data. Entries live at
//! `<cache_dir>/<compiler_version>/<file_hash>.rcir`, where the file hash
//! is wyhash over the source bytes.
//!
//! Base58 naming of bundled artifacts also lives here: encode/decode
//! round-trips all byte strings and preserves leading zero bytes as
//! leading `'1'` characters.

mod adler;
mod base58;
mod wyhash;

pub use adler::adler32;
pub use base58::{base58_decode, base58_encode};
pub use wyhash::wyhash;

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Version byte of the cache header format.
pub const HEADER_VERSION: u8 = 1;

/// The header occupies one 16-byte-aligned block.
pub const HEADER_SIZE: usize = 16;

/// File extension of cache entries.
pub const CACHE_EXT: &str = "rcir";

/// Why a cache entry was rejected.
#[derive(Clone, Eq, PartialEq, Debug, Error)]
pub enum CacheError {
    /// The buffer is too small to contain the header plus the data it
    /// declares.
    #[error("cache entry truncated: {got} bytes, need {need}")]
    PartialRead { got: usize, need: usize },
    /// Unknown header version.
    #[error("cache entry has version {0}, expected {HEADER_VERSION}")]
    WrongVersion(u8),
    /// Checksum over the data did not match the header.
    #[error("cache entry checksum mismatch")]
    InvalidChecksum,
}

/// Frame `data` into a cache entry: header block, then the data.
pub fn write_cache(data: &[u8]) -> Vec<u8> {
    let total = u32::try_from(data.len())
        .unwrap_or_else(|_| panic!("cache entry exceeds {} bytes", u32::MAX));
    let mut out = Vec::with_capacity(HEADER_SIZE + data.len());
    out.push(HEADER_VERSION);
    // Pad the version byte to a 4-byte boundary so the u32 fields are
    // aligned within the block.
    out.extend_from_slice(&[0u8; 3]);
    out.extend_from_slice(&total.to_le_bytes());
    out.extend_from_slice(&adler32(data).to_le_bytes());
    out.resize(HEADER_SIZE, 0);
    out.extend_from_slice(data);
    out
}

/// Validate a framed entry and return its data.
pub fn read_cache(bytes: &[u8]) -> Result<&[u8], CacheError> {
    if bytes.len() < HEADER_SIZE {
        return Err(CacheError::PartialRead {
            got: bytes.len(),
            need: HEADER_SIZE,
        });
    }
    let version = bytes[0];
    if version != HEADER_VERSION {
        return Err(CacheError::WrongVersion(version));
    }
    let total = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as usize;
    let need = HEADER_SIZE + total;
    if bytes.len() < need {
        return Err(CacheError::PartialRead {
            got: bytes.len(),
            need,
        });
    }
    let checksum = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
    let data = &bytes[HEADER_SIZE..need];
    if adler32(data) != checksum {
        return Err(CacheError::InvalidChecksum);
    }
    Ok(data)
}

/// Path of the cache entry for a source file:
/// `<cache_dir>/<compiler_version>/<hash>.rcir`.
pub fn cache_path(cache_dir: &Path, compiler_version: &str, source: &[u8]) -> PathBuf {
    let hash = wyhash(source, 0);
    cache_dir
        .join(compiler_version)
        .join(format!("{hash:016x}.{CACHE_EXT}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn round_trip() {
        let data = b"canonical IR bytes".to_vec();
        let framed = write_cache(&data);
        assert_eq!(framed.len(), HEADER_SIZE + data.len());
        assert_eq!(read_cache(&framed), Ok(data.as_slice()));
    }

    #[test]
    fn empty_data_round_trips() {
        let framed = write_cache(&[]);
        assert_eq!(read_cache(&framed), Ok(&[][..]));
    }

    #[test]
    fn partial_read_rejected() {
        let framed = write_cache(b"0123456789");
        assert!(matches!(
            read_cache(&framed[..HEADER_SIZE + 3]),
            Err(CacheError::PartialRead { .. })
        ));
        assert!(matches!(
            read_cache(&framed[..4]),
            Err(CacheError::PartialRead { .. })
        ));
    }

    #[test]
    fn wrong_version_rejected() {
        let mut framed = write_cache(b"data");
        framed[0] = 99;
        assert_eq!(read_cache(&framed), Err(CacheError::WrongVersion(99)));
    }

    #[test]
    fn corrupted_data_rejected() {
        let mut framed = write_cache(b"data!");
        let last = framed.len() - 1;
        framed[last] ^= 0xFF;
        assert_eq!(read_cache(&framed), Err(CacheError::InvalidChecksum));
    }

    #[test]
    fn cache_path_shape() {
        let path = cache_path(Path::new("/cache"), "0.1.0", b"x = 1");
        let rendered = path.to_string_lossy();
        assert!(rendered.starts_with("/cache/0.1.0/"));
        assert!(rendered.ends_with(".rcir"));
    }

    proptest! {
        #[test]
        fn round_trip_any_bytes(data in proptest::collection::vec(any::<u8>(), 0..2048)) {
            let framed = write_cache(&data);
            prop_assert_eq!(read_cache(&framed), Ok(data.as_slice()));
        }
    }
}
