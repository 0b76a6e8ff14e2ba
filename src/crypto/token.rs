use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use sha2::{Digest, Sha256};

use super::CryptoError;

pub const TOKEN_BYTES: usize = 32;
pub const MIN_SECRET_LEN: usize = 32;

/// Hashes opaque bearer tokens with a server secret.
///
/// Only the hash is ever persisted; a leaked sessions table cannot be
/// replayed without the secret.
#[derive(Clone)]
pub struct TokenHasher {
    secret: Vec<u8>,
}

impl std::fmt::Debug for TokenHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenHasher").finish_non_exhaustive()
    }
}

impl TokenHasher {
    pub fn new(secret: &str) -> Result<Self, CryptoError> {
        if secret.chars().count() < MIN_SECRET_LEN {
            return Err(CryptoError::WeakSecret(MIN_SECRET_LEN));
        }
        Ok(Self {
            secret: secret.as_bytes().to_vec(),
        })
    }

    /// Hex SHA-256 of secret ‖ token.
    pub fn hash(&self, token: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.secret);
        hasher.update(token.as_bytes());
        hasher
            .finalize()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect()
    }

    /// Validate shape first so garbage never reaches the database.
    pub fn hash_presented(&self, token: &str) -> Result<String, CryptoError> {
        check_token_format(token)?;
        Ok(self.hash(token))
    }
}

/// A fresh bearer token: 32 random bytes, URL-safe base64 without padding.
pub fn generate_token() -> String {
    let bytes: [u8; TOKEN_BYTES] = rand::random();
    URL_SAFE_NO_PAD.encode(bytes)
}

pub fn check_token_format(token: &str) -> Result<(), CryptoError> {
    match URL_SAFE_NO_PAD.decode(token) {
        Ok(bytes) if bytes.len() == TOKEN_BYTES => Ok(()),
        _ => Err(CryptoError::MalformedToken),
    }
}
