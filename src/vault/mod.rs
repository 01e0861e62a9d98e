//! Credential vault: keeps partner access tokens unreadable at rest.
//!
//! Stored form is `hex(iv):hex(ciphertext)` (AES-256-CBC, PKCS#7, random
//! 128-bit IV per call). Values without a `:` predate encryption and are
//! passed through on read so existing rows keep working until backfilled.

pub mod cipher;

use cipher::{SecretCipher, IV_LEN};

use crate::errors::VaultError;

pub struct CredentialVault {
    cipher: Option<SecretCipher>,
}

impl CredentialVault {
    /// A missing or malformed key leaves the vault unconfigured; callers
    /// check [`is_configured`](Self::is_configured) before relying on it.
    pub fn new(key_hex: Option<&str>) -> Self {
        let cipher = match key_hex.map(SecretCipher::new) {
            Some(Ok(c)) => Some(c),
            Some(Err(e)) => {
                tracing::warn!("encryption key rejected, vault unconfigured: {}", e);
                None
            }
            None => None,
        };
        Self { cipher }
    }

    pub fn unconfigured() -> Self {
        Self { cipher: None }
    }

    pub fn is_configured(&self) -> bool {
        self.cipher.is_some()
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, VaultError> {
        let cipher = self.cipher.as_ref().ok_or(VaultError::NotConfigured)?;
        let (iv, ciphertext) = cipher.seal(plaintext.as_bytes());
        Ok(format!("{}:{}", hex::encode(iv), hex::encode(ciphertext)))
    }

    pub fn decrypt(&self, value: &str) -> Result<String, VaultError> {
        let Some((iv_hex, cipher_hex)) = value.split_once(':') else {
            tracing::warn!("credential stored without encryption, returning as-is");
            return Ok(value.to_string());
        };

        // tagged value but no key: the stored credential cannot be read, which is a decryption failure
        let cipher = self
            .cipher
            .as_ref()
            .ok_or_else(|| VaultError::Decryption("no encryption key configured".into()))?;

        if iv_hex.len() != IV_LEN * 2 {
            return Err(VaultError::Decryption(format!(
                "iv must be {} hex chars, got {}",
                IV_LEN * 2,
                iv_hex.len()
            )));
        }
        let mut iv = [0u8; IV_LEN];
        hex::decode_to_slice(iv_hex, &mut iv)
            .map_err(|e| VaultError::Decryption(format!("malformed iv: {}", e)))?;
        let ciphertext = hex::decode(cipher_hex)
            .map_err(|e| VaultError::Decryption(format!("malformed ciphertext: {}", e)))?;

        let plaintext = cipher.open(&iv, &ciphertext)?;
        String::from_utf8(plaintext)
            .map_err(|_| VaultError::Decryption("plaintext is not valid UTF-8".into()))
    }

    /// Format check only; says nothing about whether the value decrypts.
    pub fn is_encrypted(value: &str) -> bool {
        match value.split_once(':') {
            Some((iv, _)) => iv.len() == IV_LEN * 2 && iv.bytes().all(|b| b.is_ascii_hexdigit()),
            None => false,
        }
    }

    /// Backfill path: encrypt a legacy value. `None` when there is nothing to do
    /// (vault unconfigured, or value already encrypted).
    pub fn migrate(&self, value: &str) -> Option<String> {
        if Self::is_encrypted(value) {
            return None;
        }
        self.encrypt(value).ok()
    }
}
