use rand::Rng;
use sha2::{Digest, Sha256};

/// Number of leading key characters stored in clear for identification.
pub const API_KEY_PREFIX_LEN: usize = 6;

/// Generate a new reseller API key.
///
/// Returns a tuple of (raw_key, key_hash) where:
/// - raw_key is 32 lowercase hex characters, shown once on creation
/// - key_hash is the SHA-256 hash to store in the database
pub fn generate_api_key() -> (String, String) {
    let mut rng = rand::thread_rng();
    let mut random_bytes = [0u8; 16];
    rng.fill(&mut random_bytes);

    let raw_key = hex::encode(random_bytes);
    let key_hash = hash_api_key(&raw_key);

    (raw_key, key_hash)
}

/// Hash an API key using SHA-256
///
/// Returns the hex-encoded hash for storage in the database.
pub fn hash_api_key(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Clear-text prefix kept next to the hash.
pub fn api_key_prefix(raw_key: &str) -> &str {
    raw_key.get(..API_KEY_PREFIX_LEN).unwrap_or(raw_key)
}
