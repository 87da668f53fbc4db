use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use uuid::Uuid;

const SCHEME: &str = "sha256";

/// Generate a random admin password (two v4 UUIDs of entropy, base64url).
pub fn generate_password() -> String {
    let mut bytes = Vec::with_capacity(32);
    bytes.extend_from_slice(Uuid::new_v4().as_bytes());
    bytes.extend_from_slice(Uuid::new_v4().as_bytes());
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Salted SHA-256 hash stored as `sha256$<salt>$<digest>`.
pub fn hash_password(password: &str) -> String {
    let salt = Uuid::new_v4();
    let digest = digest(salt.as_bytes(), password);
    format!(
        "{SCHEME}${}${}",
        URL_SAFE_NO_PAD.encode(salt.as_bytes()),
        URL_SAFE_NO_PAD.encode(digest)
    )
}

/// True if `stored` parses as a hash this module could have produced.
pub fn is_valid_hash(stored: &str) -> bool {
    parse(stored).is_some()
}

pub fn verify_password(password: &str, stored: &str) -> bool {
    let Some((salt, expected)) = parse(stored) else {
        return false;
    };
    let actual = digest(&salt, password);
    actual.ct_eq(&expected).into()
}

fn digest(salt: &[u8], password: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    hasher.finalize().into()
}

fn parse(stored: &str) -> Option<(Vec<u8>, Vec<u8>)> {
    let mut parts = stored.split('$');
    if parts.next()? != SCHEME {
        return None;
    }
    let salt = URL_SAFE_NO_PAD.decode(parts.next()?).ok()?;
    let digest = URL_SAFE_NO_PAD.decode(parts.next()?).ok()?;
    if parts.next().is_some() || salt.is_empty() || digest.len() != 32 {
        return None;
    }
    Some((salt, digest))
}
