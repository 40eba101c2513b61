//! wyhash for cache file naming.
//!
//! The readers use explicit little-endian loads (`from_le_bytes`), so the
//! hash is identical on big-endian hosts.

const P0: u64 = 0xa076_1d64_78bd_642f;
const P1: u64 = 0xe703_7ed1_a0b4_28db;
const P2: u64 = 0x8ebc_6af0_9c88_c6e3;
const P3: u64 = 0x5899_65cc_7537_4cc3;

/// Read 8 bytes little-endian.
#[inline]
fn wyr8(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    u64::from_le_bytes(buf)
}

/// Read 4 bytes little-endian.
#[inline]
fn wyr4(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[..4]);
    u64::from(u32::from_le_bytes(buf))
}

/// Read 1–3 bytes, spread across the word.
#[inline]
fn wyr3(bytes: &[u8], len: usize) -> u64 {
    (u64::from(bytes[0]) << 16)
        | (u64::from(bytes[len >> 1]) << 8)
        | u64::from(bytes[len - 1])
}

#[inline]
fn wymum(a: u64, b: u64) -> u64 {
    let product = u128::from(a) * u128::from(b);
    (product as u64) ^ ((product >> 64) as u64)
}

#[inline]
fn wymix(a: u64, b: u64) -> u64 {
    wymum(a, b)
}

/// Hash `data` with the given `seed`.
pub fn wyhash(data: &[u8], seed: u64) -> u64 {
    let len = data.len();
    let mut seed = seed ^ wymix(seed ^ P0, P1);

    let (a, b): (u64, u64);
    if len <= 16 {
        if len >= 4 {
            a = (wyr4(data) << 32) | wyr4(&data[(len >> 3) << 2..]);
            b = (wyr4(&data[len - 4..]) << 32) | wyr4(&data[len - 4 - ((len >> 3) << 2)..]);
        } else if len > 0 {
            a = wyr3(data, len);
            b = 0;
        } else {
            a = 0;
            b = 0;
        }
    } else {
        let mut index = 0;
        let mut remaining = len;
        if remaining > 48 {
            let mut s1 = seed;
            let mut s2 = seed;
            while remaining > 48 {
                seed = wymix(wyr8(&data[index..]) ^ P1, wyr8(&data[index + 8..]) ^ seed);
                s1 = wymix(wyr8(&data[index + 16..]) ^ P2, wyr8(&data[index + 24..]) ^ s1);
                s2 = wymix(wyr8(&data[index + 32..]) ^ P3, wyr8(&data[index + 40..]) ^ s2);
                index += 48;
                remaining -= 48;
            }
            seed ^= s1 ^ s2;
        }
        while remaining > 16 {
            seed = wymix(wyr8(&data[index..]) ^ P1, wyr8(&data[index + 8..]) ^ seed);
            index += 16;
            remaining -= 16;
        }
        a = wyr8(&data[len - 16..]);
        b = wyr8(&data[len - 8..]);
    }

    wymix(P1 ^ (len as u64), wymix(a ^ P1, b ^ seed))
}

#[cfg(test)]
mod tests {
    use super::wyhash;

    #[test]
    fn stable_across_calls() {
        let data = b"module [main!]";
        assert_eq!(wyhash(data, 0), wyhash(data, 0));
    }

    #[test]
    fn seed_changes_hash() {
        let data = b"same bytes";
        assert_ne!(wyhash(data, 0), wyhash(data, 1));
    }

    #[test]
    fn distinct_inputs_distinct_hashes() {
        assert_ne!(wyhash(b"a", 0), wyhash(b"b", 0));
        assert_ne!(wyhash(b"", 0), wyhash(b"\0", 0));
    }

    #[test]
    fn covers_every_length_class() {
        // 0, 1-3, 4-16, 17-48, >48 byte paths all produce values.
        for len in [0usize, 1, 3, 4, 16, 17, 48, 49, 200] {
            let data = vec![0xABu8; len];
            let _ = wyhash(&data, 7);
        }
    }
}
