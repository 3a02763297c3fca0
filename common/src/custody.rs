use aes_gcm::aead::AeadInPlace;
use aes_gcm::aead::consts::U16;
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aes::Aes256;
use aes_gcm::{AesGcm, KeyInit};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha512;
use solana_sdk::signature::Keypair;
use solana_sdk::signer::Signer;

const SALT_LENGTH: usize = 64;
const IV_LENGTH: usize = 16;
const TAG_LENGTH: usize = 16;
const KEY_LENGTH: usize = 32;
const ITERATIONS: u32 = 100_000;

/// AES-256-GCM with the 16-byte IV the persisted layout calls for.
type EnvelopeCipher = AesGcm<Aes256, U16>;

/// Errors never carry key material or ciphertext internals.
#[derive(Debug, thiserror::Error)]
pub enum CustodyError {
    #[error("encrypted key blob is malformed")]
    Malformed,
    #[error("failed to encrypt key material")]
    Encrypt,
    #[error("failed to decrypt key material")]
    Decrypt,
}

/// Result of provisioning a wallet signing key. The private key only appears
/// here as the encrypted envelope blob.
pub struct GeneratedWallet {
    pub address: String,
    pub public_key: String,
    pub encrypted_private_key: String,
}

/// Envelope-encrypts wallet signing keys under a per-blob key derived from a
/// process-wide master secret.
///
/// Persisted layout: base64( salt[64] ‖ iv[16] ‖ tag[16] ‖ ciphertext ),
/// key = PBKDF2-HMAC-SHA512(secret, salt, 100_000 iterations, 32 bytes).
pub struct KeyVault {
    master_secret: String,
}

impl KeyVault {
    pub fn new(master_secret: impl Into<String>) -> Self {
        KeyVault {
            master_secret: master_secret.into(),
        }
    }

    fn derive_key(&self, salt: &[u8]) -> [u8; KEY_LENGTH] {
        let mut key = [0u8; KEY_LENGTH];
        pbkdf2_hmac::<Sha512>(self.master_secret.as_bytes(), salt, ITERATIONS, &mut key);
        key
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<String, CustodyError> {
        let mut salt = [0u8; SALT_LENGTH];
        let mut iv = [0u8; IV_LENGTH];
        rand::rng().fill_bytes(&mut salt);
        rand::rng().fill_bytes(&mut iv);

        let key = self.derive_key(&salt);
        let cipher =
            EnvelopeCipher::new_from_slice(&key).map_err(|_| CustodyError::Encrypt)?;

        let mut buffer = plaintext.to_vec();
        let tag = cipher
            .encrypt_in_place_detached(GenericArray::from_slice(&iv), b"", &mut buffer)
            .map_err(|_| CustodyError::Encrypt)?;

        let mut blob = Vec::with_capacity(SALT_LENGTH + IV_LENGTH + TAG_LENGTH + buffer.len());
        blob.extend_from_slice(&salt);
        blob.extend_from_slice(&iv);
        blob.extend_from_slice(&tag);
        blob.extend_from_slice(&buffer);
        Ok(BASE64.encode(blob))
    }

    /// Reverses the fixed-offset layout, re-derives the key and verifies the
    /// GCM tag. Any tampering or a wrong master secret fails closed.
    pub fn decrypt(&self, encrypted: &str) -> Result<Vec<u8>, CustodyError> {
        let blob = BASE64.decode(encrypted).map_err(|_| CustodyError::Malformed)?;
        if blob.len() < SALT_LENGTH + IV_LENGTH + TAG_LENGTH {
            return Err(CustodyError::Malformed);
        }

        let (salt, rest) = blob.split_at(SALT_LENGTH);
        let (iv, rest) = rest.split_at(IV_LENGTH);
        let (tag, ciphertext) = rest.split_at(TAG_LENGTH);

        let key = self.derive_key(salt);
        let cipher =
            EnvelopeCipher::new_from_slice(&key).map_err(|_| CustodyError::Decrypt)?;

        let mut buffer = ciphertext.to_vec();
        cipher
            .decrypt_in_place_detached(
                GenericArray::from_slice(iv),
                b"",
                &mut buffer,
                GenericArray::from_slice(tag),
            )
            .map_err(|_| CustodyError::Decrypt)?;
        Ok(buffer)
    }

    /// Generates a fresh ed25519 signing keypair and seals it immediately.
    pub fn generate_wallet(&self) -> Result<GeneratedWallet, CustodyError> {
        let keypair = Keypair::new();
        let address = keypair.pubkey().to_string();
        let encrypted_private_key = self.encrypt(&keypair.to_bytes())?;
        Ok(GeneratedWallet {
            public_key: address.clone(),
            address,
            encrypted_private_key,
        })
    }

    /// Opens an envelope blob into a signing keypair. The plaintext exists
    /// only inside this call and the returned keypair.
    pub fn signing_keypair(&self, encrypted: &str) -> Result<Keypair, CustodyError> {
        let bytes = self.decrypt(encrypted)?;
        Keypair::try_from(bytes.as_slice()).map_err(|_| CustodyError::Malformed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let vault = KeyVault::new("test-master-secret");
        for plaintext in [&b""[..], b"x", b"some wallet private key bytes"] {
            let blob = vault.encrypt(plaintext).unwrap();
            assert_eq!(vault.decrypt(&blob).unwrap(), plaintext);
        }
    }

    #[test]
    fn flipped_ciphertext_byte_fails_closed() {
        let vault = KeyVault::new("test-master-secret");
        let blob = vault.encrypt(b"super secret").unwrap();

        let mut raw = BASE64.decode(&blob).unwrap();
        for index in [0, SALT_LENGTH, SALT_LENGTH + IV_LENGTH, raw.len() - 1] {
            raw[index] ^= 0x01;
            let tampered = BASE64.encode(&raw);
            assert!(vault.decrypt(&tampered).is_err(), "byte {index} accepted");
            raw[index] ^= 0x01;
        }
    }

    #[test]
    fn wrong_secret_fails_closed() {
        let vault = KeyVault::new("secret-a");
        let blob = vault.encrypt(b"super secret").unwrap();
        assert!(KeyVault::new("secret-b").decrypt(&blob).is_err());
    }

    #[test]
    fn truncated_blob_is_malformed() {
        let vault = KeyVault::new("test-master-secret");
        assert!(matches!(
            vault.decrypt("not base64!!"),
            Err(CustodyError::Malformed)
        ));
        let short = BASE64.encode([0u8; SALT_LENGTH]);
        assert!(matches!(vault.decrypt(&short), Err(CustodyError::Malformed)));
    }

    #[test]
    fn generated_wallet_key_opens_back_into_the_same_signer() {
        let vault = KeyVault::new("test-master-secret");
        let wallet = vault.generate_wallet().unwrap();
        let keypair = vault.signing_keypair(&wallet.encrypted_private_key).unwrap();
        assert_eq!(keypair.pubkey().to_string(), wallet.address);
    }
}
