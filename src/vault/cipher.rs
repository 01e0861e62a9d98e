use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroize;

use crate::errors::VaultError;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

pub const KEY_LEN: usize = 32;
pub const IV_LEN: usize = 16;

/// AES-256-CBC with PKCS#7 padding under a fixed process-wide key.
pub struct SecretCipher {
    key: [u8; KEY_LEN],
}

impl SecretCipher {
    pub fn new(key_hex: &str) -> anyhow::Result<Self> {
        let key = parse_key(key_hex)?;
        Ok(Self { key })
    }

    /// Encrypts under a fresh random IV. Returns (iv, ciphertext).
    pub fn seal(&self, plaintext: &[u8]) -> ([u8; IV_LEN], Vec<u8>) {
        let iv = generate_iv();
        let ciphertext = Aes256CbcEnc::new((&self.key).into(), (&iv).into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext);
        (iv, ciphertext)
    }

    pub fn open(&self, iv: &[u8; IV_LEN], ciphertext: &[u8]) -> Result<Vec<u8>, VaultError> {
        if ciphertext.is_empty() || ciphertext.len() % IV_LEN != 0 {
            return Err(VaultError::Decryption(format!(
                "ciphertext length {} is not a positive multiple of the block size",
                ciphertext.len()
            )));
        }
        Aes256CbcDec::new((&self.key).into(), iv.into())
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| VaultError::Decryption("bad padding (wrong key or corrupted data)".into()))
    }
}

impl Drop for SecretCipher {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

fn generate_iv() -> [u8; IV_LEN] {
    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut iv);
    iv
}

/// Fresh random key, hex-encoded, suitable for ENCRYPTION_KEY.
pub fn generate_key_hex() -> String {
    let mut key = [0u8; KEY_LEN];
    OsRng.fill_bytes(&mut key);
    let out = hex::encode(key);
    key.zeroize();
    out
}

pub fn parse_key(hex: &str) -> anyhow::Result<[u8; KEY_LEN]> {
    if hex.len() != KEY_LEN * 2 {
        anyhow::bail!(
            "ENCRYPTION_KEY must be 64 hex chars (32 bytes), got {} chars",
            hex.len()
        );
    }
    let mut bytes = hex::decode(hex)?;
    let mut key = [0u8; KEY_LEN];
    key.copy_from_slice(&bytes);
    bytes.zeroize();
    Ok(key)
}
