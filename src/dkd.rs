// DKD ("Dynamic Keyed Dictionary") byte-permutation codec.
//
// A text key deterministically selects a permutation of the byte space;
// encoding maps every payload byte through it, decoding maps through the
// inverse. Despite the product name this performs no compression, and a
// 256-symbol substitution offers no real confidentiality. Decoding with the
// wrong key succeeds silently and returns garbage: there is no integrity
// check of any kind, so callers must not treat a clean decode as proof the
// key was right.

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DkdError {
    #[error("key must not be empty")]
    EmptyKey,
}

/// Byte-to-byte permutation derived from a key. Rebuilt on every call site
/// that needs one; never cached.
#[derive(Debug)]
pub struct Table {
    forward: [u8; 256],
}

impl Table {
    /// Derives the permutation from the UTF-8 bytes of `key`.
    ///
    /// Keyed Fisher-Yates: the swap index is driven by the cycled key bytes
    /// and the current table entry instead of a random source. The recurrence
    /// reads `P[i]` after earlier swaps may have touched it; that exact
    /// arithmetic is what existing encoded files were produced with, so it
    /// must not be altered.
    pub fn derive(key: &str) -> Result<Self, DkdError> {
        let key = key.as_bytes();
        if key.is_empty() {
            return Err(DkdError::EmptyKey);
        }

        let mut p = [0u8; 256];
        for i in 0..256 {
            p[i] = i as u8;
        }

        let mut j = 0usize;
        for i in (1..=255usize).rev() {
            j = (j + p[i] as usize + key[i % key.len()] as usize) % (i + 1);
            p.swap(i, j);
        }

        Ok(Self { forward: p })
    }

    pub fn apply(&self, data: &[u8]) -> Vec<u8> {
        data.iter().map(|&b| self.forward[b as usize]).collect()
    }

    pub fn apply_inverse(&self, data: &[u8]) -> Vec<u8> {
        let inv = self.invert();
        data.iter().map(|&b| inv[b as usize]).collect()
    }

    // Direct array-indexed inversion; the domain is exactly [0,255] so no
    // searching or map container is involved.
    fn invert(&self) -> [u8; 256] {
        let mut inv = [0u8; 256];
        for (v, &mapped) in self.forward.iter().enumerate() {
            inv[mapped as usize] = v as u8;
        }
        inv
    }
}

/// Maps every byte of `data` through the permutation for `key`.
/// Output length equals input length; a zero-length payload is legal.
pub fn encode(data: &[u8], key: &str) -> Result<Vec<u8>, DkdError> {
    Ok(Table::derive(key)?.apply(data))
}

/// Exact inverse of [`encode`] for the same key.
pub fn decode(data: &[u8], key: &str) -> Result<Vec<u8>, DkdError> {
    Ok(Table::derive(key)?.apply_inverse(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn byte_ramp() -> Vec<u8> {
        (0u8..=255).collect()
    }

    #[test]
    fn table_is_a_bijection() {
        for key in ["a", "k", "abc", "correct horse battery staple", "日本語の鍵"] {
            let table = Table::derive(key).unwrap();
            let mut seen = table.forward.to_vec();
            seen.sort_unstable();
            assert_eq!(seen, byte_ramp(), "key {:?} produced a non-bijective table", key);
        }
    }

    #[test]
    fn table_is_deterministic() {
        let a = Table::derive("abc").unwrap();
        let b = Table::derive("abc").unwrap();
        assert_eq!(a.forward, b.forward);
    }

    #[test]
    fn encode_is_deterministic() {
        let data = b"same input, same output";
        assert_eq!(encode(data, "abc").unwrap(), encode(data, "abc").unwrap());
    }

    #[test]
    fn round_trip_all_byte_values() {
        let data = byte_ramp();
        let encoded = encode(&data, "abc").unwrap();

        // Encoding the full ramp must itself be a permutation of the ramp.
        let mut sorted = encoded.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, data);

        assert_eq!(decode(&encoded, "abc").unwrap(), data);
    }

    #[test]
    fn round_trip_assorted_payloads() {
        let payloads: Vec<Vec<u8>> = vec![
            vec![],
            vec![0],
            vec![255],
            b"hello world".to_vec(),
            "héllo wörld üñïçødé".as_bytes().to_vec(),
            vec![0, 0, 0, 0, 0],
            vec![0xde, 0xad, 0xbe, 0xef],
        ];
        for key in ["x", "abc", "a much longer key with spaces"] {
            for data in &payloads {
                let encoded = encode(data, key).unwrap();
                assert_eq!(encoded.len(), data.len());
                let decoded = decode(&encoded, key).unwrap();
                assert_eq!(&decoded, data, "round trip failed for key {:?}", key);
            }
        }
    }

    #[test]
    fn empty_payload_with_single_byte_key() {
        assert_eq!(encode(b"", "k").unwrap(), b"");
        assert_eq!(decode(b"", "k").unwrap(), b"");
    }

    #[test]
    fn length_is_preserved() {
        let data = vec![42u8; 1000];
        assert_eq!(encode(&data, "len").unwrap().len(), 1000);
        assert_eq!(decode(&data, "len").unwrap().len(), 1000);
    }

    #[test]
    fn empty_key_is_rejected() {
        assert_eq!(Table::derive("").unwrap_err(), DkdError::EmptyKey);
        assert_eq!(encode(b"payload", "").unwrap_err(), DkdError::EmptyKey);
        assert_eq!(decode(b"payload", "").unwrap_err(), DkdError::EmptyKey);
        assert_eq!(encode(b"", "").unwrap_err(), DkdError::EmptyKey);
    }

    #[test]
    fn dissimilar_keys_disagree_somewhere() {
        // Collisions between keys are possible by construction, so only
        // require that the set is not degenerate: at least one key maps some
        // byte differently from the first.
        let tables: Vec<_> = ["alpha", "bravo", "charlie", "zebra-42"]
            .iter()
            .map(|k| Table::derive(k).unwrap())
            .collect();
        assert!(tables[1..].iter().any(|t| t.forward != tables[0].forward));
    }

    #[test]
    fn wrong_key_decodes_silently_to_garbage() {
        let data = byte_ramp();
        let encoded = encode(&data, "right-key").unwrap();

        let right = Table::derive("right-key").unwrap();
        let wrong = Table::derive("wrong-key").unwrap();
        assert_ne!(right.forward, wrong.forward);

        // No error, full length, wrong bytes.
        let decoded = decode(&encoded, "wrong-key").unwrap();
        assert_eq!(decoded.len(), data.len());
        assert_ne!(decoded, data);
    }
}
