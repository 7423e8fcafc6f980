use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use anyhow::anyhow;
use serde::{Deserialize, Serialize};

const NONCE_LEN: usize = 12;

/// The claims carried by an upload token.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TokenPayload {
    /// Unix timestamp (seconds) after which the token is no longer accepted.
    pub expires_in: i64,
}

/// Opens upload tokens.
///
/// Returns `None` for anything that cannot be opened, callers do not get
/// to know why.
pub trait TokenVerifier: Send + Sync + 'static {
    fn verify(&self, token: &str) -> Option<TokenPayload>;
}

/// Verifies tokens of the form
/// `base64url(nonce ++ AES-256-GCM(key, json payload))`.
///
/// Tokens are issued by whatever owns the key, this server never creates them.
pub struct SealedTokenVerifier {
    cipher: Aes256Gcm,
}

impl SealedTokenVerifier {
    pub fn from_key_bytes(key: &[u8]) -> anyhow::Result<Self> {
        if key.len() != 32 {
            return Err(anyhow!("upload key must be 32 bytes, got {}", key.len()));
        }

        Ok(Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key)),
        })
    }

    /// Builds a verifier from a standard base64 encoded key.
    pub fn from_base64_key(key: &str) -> anyhow::Result<Self> {
        let key = base64::decode(key.trim())
            .map_err(|e| anyhow!("upload key is not valid base64: {}", e))?;
        Self::from_key_bytes(&key)
    }

    fn open(&self, token: &str) -> Option<Vec<u8>> {
        let sealed = base64::decode_config(token.trim(), base64::URL_SAFE).ok()?;
        if sealed.len() <= NONCE_LEN {
            return None;
        }

        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        self.cipher.decrypt(Nonce::from_slice(nonce), ciphertext).ok()
    }

    #[cfg(test)]
    pub(crate) fn seal(&self, payload: &TokenPayload) -> String {
        use aes_gcm::aead::{AeadCore, OsRng};

        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let plaintext = serde_json::to_vec(payload).expect("serialize payload");
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_ref())
            .expect("encrypt payload");

        let mut sealed = nonce.to_vec();
        sealed.extend_from_slice(&ciphertext);
        base64::encode_config(sealed, base64::URL_SAFE)
    }
}

impl TokenVerifier for SealedTokenVerifier {
    fn verify(&self, token: &str) -> Option<TokenPayload> {
        let plaintext = self.open(token)?;
        serde_json::from_slice(&plaintext).ok()
    }
}

/// Used when no upload key is configured, nothing verifies.
pub struct RejectAll;

impl TokenVerifier for RejectAll {
    fn verify(&self, _token: &str) -> Option<TokenPayload> {
        None
    }
}
