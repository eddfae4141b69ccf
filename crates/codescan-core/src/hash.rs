use sha2::{Digest, Sha256};

/// SHA-256 of the given content, hex encoded.
pub fn content_hash(content: &str) -> String {
    hash_parts(&[content])
}

/// SHA-256 over several parts, each terminated by a NUL so that
/// `["ab", "c"]` and `["a", "bc"]` hash differently.
pub fn hash_parts(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}

/// First 16 hex characters of [`hash_parts`]; used for compact identifiers.
pub fn short_hash(parts: &[&str]) -> String {
    let mut full = hash_parts(parts);
    full.truncate(16);
    full
}
