//! Cache key generation using SHA-256 hashes

use sha2::{Digest, Sha256};

/// Generate a deterministic cache key from an operation and its parameters.
///
/// The key is a SHA-256 hash of the operation, the owning user and the
/// sorted parameters, so parameter order does not matter. Keys for
/// user-specific data should always pass the user so two users never share
/// an entry or a deduplicated fetch.
pub fn cache_key(operation: &str, user_id: Option<&str>, params: &[(&str, &str)]) -> String {
    let mut hasher = Sha256::new();

    hasher.update(operation.as_bytes());
    hasher.update(b"|");

    if let Some(user) = user_id {
        hasher.update(user.as_bytes());
    }
    hasher.update(b"|");

    // Sort and include params for deterministic key
    let mut sorted_params: Vec<_> = params.iter().collect();
    sorted_params.sort();

    for (k, v) in sorted_params {
        hasher.update(k.as_bytes());
        hasher.update(b"=");
        hasher.update(v.as_bytes());
        hasher.update(b"&");
    }

    // Keep the operation readable so pattern and tag invalidation still work
    format!("{}:{:x}", operation, hasher.finalize())
}
