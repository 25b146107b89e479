//! Node digests.
//!
//! A leaf is tagged with the digest of its key. An inner node is tagged with
//! the digest of `left ++ key ++ right`, where each child contributes the
//! decimal rendering of its own digest, so a change anywhere below a node
//! shows up in that node's digest and, transitively, in the root digest.

pub type Digest = u64;

/// Digest of an empty tree.
pub const EMPTY_DIGEST: Digest = 0;

pub fn digest(bytes: &[u8]) -> Digest {
    let hash = blake3::hash(bytes);
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&hash.as_bytes()[..8]);
    u64::from_le_bytes(prefix)
}

pub fn leaf_digest(key: &str) -> Digest {
    digest(key.as_bytes())
}

pub fn node_digest(left: Option<Digest>, key: &str, right: Option<Digest>) -> Digest {
    if left.is_none() && right.is_none() {
        return leaf_digest(key);
    }
    let mut combined = String::new();
    if let Some(left) = left {
        combined.push_str(&left.to_string());
    }
    combined.push_str(key);
    if let Some(right) = right {
        combined.push_str(&right.to_string());
    }
    digest(combined.as_bytes())
}
