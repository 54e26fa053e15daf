use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use sha2::{Digest, Sha256};

use crate::error::{AppError, AppResult};

/// Mint a fresh edit token: 32 bytes of OS randomness, URL-safe base64
/// (43 characters). The plaintext goes to the submitter exactly once; only
/// the hash is stored.
pub fn mint() -> AppResult<String> {
    let mut bytes = [0u8; 32];
    getrandom::getrandom(&mut bytes)
        .map_err(|e| AppError::Internal(format!("Failed to generate random bytes: {}", e)))?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// Unsalted SHA-256, lowercase hex. The token itself carries 256 bits of
/// entropy, so a salt buys nothing.
pub fn hash(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Constant-time comparison of the presented token's hash against the
/// stored one.
pub fn verify(presented: &str, stored_hash: &str) -> bool {
    ring::constant_time::verify_slices_are_equal(hash(presented).as_bytes(), stored_hash.as_bytes())
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mint_is_43_urlsafe_chars() {
        let token = mint().unwrap();
        assert_eq!(token.len(), 43);
        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn mint_outputs_differ() {
        assert_ne!(mint().unwrap(), mint().unwrap());
    }

    #[test]
    fn hash_is_64_lowercase_hex() {
        let digest = hash("anything at all");
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn verify_accepts_own_hash_and_rejects_others() {
        let token = mint().unwrap();
        let stored = hash(&token);

        assert!(verify(&token, &stored));
        assert!(!verify("some-other-token", &stored));
        assert!(!verify(&token, &hash("some-other-token")));
        assert!(!verify(&token, ""));
    }
}
