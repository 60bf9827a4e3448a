//! Hash helpers for shortcut buckets.
//!
//! Shortcut buckets hash fixed-width lowercased chunks of rule shortcuts and
//! URLs; both sides must lowercase identically for a bucket hit.

/// Width of the shortcut window used by the rule index.
pub const SHORTCUT_LENGTH: usize = 6;

/// Hash a raw chunk of bytes. The caller is responsible for lowercasing.
#[inline]
pub fn hash_chunk(chunk: &[u8]) -> u64 {
    twox_hash::xxh3::hash64(chunk)
}

/// Hash the bucket key for a rule shortcut: the first `SHORTCUT_LENGTH`
/// bytes, lowercased.
#[inline]
pub fn hash_shortcut(shortcut: &str) -> u64 {
    let mut buf = [0u8; SHORTCUT_LENGTH];
    let len = shortcut.len().min(SHORTCUT_LENGTH);
    for (i, &b) in shortcut.as_bytes()[..len].iter().enumerate() {
        buf[i] = b.to_ascii_lowercase();
    }
    hash_chunk(&buf[..len])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_chunk_consistent() {
        assert_eq!(hash_chunk(b"analyt"), hash_chunk(b"analyt"));
        assert_ne!(hash_chunk(b"analyt"), hash_chunk(b"tracke"));
    }

    #[test]
    fn hash_shortcut_case_insensitive() {
        assert_eq!(hash_shortcut("DoubleClick"), hash_shortcut("doubleclick"));
    }

    #[test]
    fn hash_shortcut_uses_window_prefix() {
        // Only the first SHORTCUT_LENGTH bytes participate, so a URL window
        // containing that prefix hits the same bucket.
        assert_eq!(hash_shortcut("analytics"), hash_shortcut("analyti"));
    }
}
