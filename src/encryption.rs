//! Transparent per-field encryption.
//!
//! Two disjoint sets of field names get transformed on the write path:
//!
//! - *hash-fields* are replaced by a salted SHA-256 digest
//!   (`{hash, salt, algorithm: "sha256"}`, base64 payloads) — one-way,
//!   verified with [`Sha256Hasher::verify`];
//! - *cipher-fields* are replaced by an AES-256-CBC ciphertext
//!   (`{ciphertext, iv, algorithm: "aes256"}`) and decrypted back to
//!   plaintext when documents flow out through a cursor.
//!
//! Keys for AES come from an explicit argument, the
//! `MAINYDB_ENCRYPTION_KEY` environment variable, or an auto-generated
//! value (announced on the `log` warning channel so the operator can store
//! it). String passphrases are stretched with PBKDF2-HMAC-SHA1 over a
//! fixed salt; 32 raw bytes are used as-is.
//!
//! Only string values are transformed; values already in stored form pass
//! through untouched, which is what makes re-encryption after an update
//! idempotent.

use crate::document::Document;
use crate::error::{Error, Result};
use crate::value::Value;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use parking_lot::Mutex;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Environment variable consulted for the AES key when none is supplied.
pub const ENCRYPTION_KEY_ENV: &str = "MAINYDB_ENCRYPTION_KEY";

/// PBKDF2 salt for passphrase-derived AES keys.
#[cfg(feature = "aes256")]
const AES_KDF_SALT: &[u8] = b"MainyDB-AES256-Salt";

/// PBKDF2 iteration count for passphrase-derived AES keys.
#[cfg(feature = "aes256")]
const AES_KDF_ROUNDS: u32 = 100_000;

/// Salted SHA-256 hashing for strings that must never be recoverable.
pub struct Sha256Hasher;

impl Sha256Hasher {
    /// Hashes a string with a fresh random 32-byte salt.
    pub fn hash(data: &str) -> Document {
        let mut salt = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut salt);
        Self::hash_with_salt(data, &salt)
    }

    /// Hashes a string with the given salt: digest = SHA-256(salt || utf8).
    pub fn hash_with_salt(data: &str, salt: &[u8]) -> Document {
        let mut hasher = Sha256::new();
        hasher.update(salt);
        hasher.update(data.as_bytes());
        let digest = hasher.finalize();

        let mut stored = Document::new();
        stored.insert("hash", BASE64.encode(digest));
        stored.insert("salt", BASE64.encode(salt));
        stored.insert("algorithm", "sha256");
        stored
    }

    /// Verifies a string against a stored hash document.
    pub fn verify(data: &str, stored: &Document) -> Result<bool> {
        let expected = stored
            .get_str("hash")
            .ok_or_else(|| Error::CorruptStore("stored hash missing 'hash'".to_string()))?;
        let salt_b64 = stored
            .get_str("salt")
            .ok_or_else(|| Error::CorruptStore("stored hash missing 'salt'".to_string()))?;
        let salt = BASE64
            .decode(salt_b64)
            .map_err(|e| Error::CorruptStore(format!("stored salt is not base64: {}", e)))?;
        let recomputed = Self::hash_with_salt(data, &salt);
        Ok(recomputed.get_str("hash") == Some(expected))
    }
}

/// AES key material.
#[derive(Clone)]
pub enum AesKey {
    /// Passphrase, stretched with PBKDF2-HMAC-SHA1
    Passphrase(String),
    /// Raw 32-byte key used as-is
    Raw([u8; 32]),
}

impl From<&str> for AesKey {
    fn from(passphrase: &str) -> Self {
        AesKey::Passphrase(passphrase.to_string())
    }
}

impl From<String> for AesKey {
    fn from(passphrase: String) -> Self {
        AesKey::Passphrase(passphrase)
    }
}

impl From<[u8; 32]> for AesKey {
    fn from(key: [u8; 32]) -> Self {
        AesKey::Raw(key)
    }
}

/// AES-256-CBC cipher with PKCS#7 padding and a fresh IV per value.
///
/// The cipher state is guarded by its own lock; encrypt and decrypt
/// acquire it briefly, strictly nested inside the owning collection's
/// lock.
#[derive(Debug)]
pub struct Aes256Cipher {
    key: [u8; 32],
    guard: Mutex<()>,
}

impl Aes256Cipher {
    /// Builds a cipher from key material.
    ///
    /// # Errors
    ///
    /// [`Error::CryptoUnavailable`] when the crate was built without the
    /// `aes256` feature.
    #[cfg(feature = "aes256")]
    pub fn new(key: AesKey) -> Result<Self> {
        let key = match key {
            AesKey::Raw(bytes) => bytes,
            AesKey::Passphrase(passphrase) => {
                let mut derived = [0u8; 32];
                pbkdf2::pbkdf2_hmac::<sha1::Sha1>(
                    passphrase.as_bytes(),
                    AES_KDF_SALT,
                    AES_KDF_ROUNDS,
                    &mut derived,
                );
                derived
            }
        };
        Ok(Aes256Cipher {
            key,
            guard: Mutex::new(()),
        })
    }

    #[cfg(not(feature = "aes256"))]
    pub fn new(_key: AesKey) -> Result<Self> {
        Err(Error::CryptoUnavailable(
            "mainydb was built without the 'aes256' feature".to_string(),
        ))
    }

    /// Encrypts a string into its stored form.
    #[cfg(feature = "aes256")]
    pub fn encrypt(&self, data: &str) -> Result<Document> {
        use aes::cipher::{block_padding::Pkcs7, BlockEncryptMut, KeyIvInit};
        type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;

        let _held = self.guard.lock();
        let mut iv = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut iv);
        let ciphertext = Aes256CbcEnc::new(&self.key.into(), &iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(data.as_bytes());

        let mut stored = Document::new();
        stored.insert("ciphertext", BASE64.encode(ciphertext));
        stored.insert("iv", BASE64.encode(iv));
        stored.insert("algorithm", "aes256");
        Ok(stored)
    }

    #[cfg(not(feature = "aes256"))]
    pub fn encrypt(&self, _data: &str) -> Result<Document> {
        Err(Error::CryptoUnavailable(
            "mainydb was built without the 'aes256' feature".to_string(),
        ))
    }

    /// Decrypts a stored form back to the plaintext string.
    #[cfg(feature = "aes256")]
    pub fn decrypt(&self, stored: &Document) -> Result<String> {
        use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, KeyIvInit};
        type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

        let ciphertext_b64 = stored.get_str("ciphertext").ok_or_else(|| {
            Error::CorruptStore("encrypted value missing 'ciphertext'".to_string())
        })?;
        let iv_b64 = stored
            .get_str("iv")
            .ok_or_else(|| Error::CorruptStore("encrypted value missing 'iv'".to_string()))?;
        let ciphertext = BASE64
            .decode(ciphertext_b64)
            .map_err(|e| Error::CorruptStore(format!("ciphertext is not base64: {}", e)))?;
        let iv_bytes = BASE64
            .decode(iv_b64)
            .map_err(|e| Error::CorruptStore(format!("iv is not base64: {}", e)))?;
        let iv: [u8; 16] = iv_bytes
            .try_into()
            .map_err(|_| Error::CorruptStore("iv must be 16 bytes".to_string()))?;

        let _held = self.guard.lock();
        let plaintext = Aes256CbcDec::new(&self.key.into(), &iv.into())
            .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
            .map_err(|_| Error::CorruptStore("AES decryption failed (bad padding)".to_string()))?;
        String::from_utf8(plaintext)
            .map_err(|e| Error::CorruptStore(format!("decrypted payload is not UTF-8: {}", e)))
    }

    #[cfg(not(feature = "aes256"))]
    pub fn decrypt(&self, _stored: &Document) -> Result<String> {
        Err(Error::CryptoUnavailable(
            "mainydb was built without the 'aes256' feature".to_string(),
        ))
    }
}

/// Which fields get which treatment.
#[derive(Debug, Clone, Default)]
pub struct EncryptionConfig {
    sha256_fields: Vec<String>,
    aes256_fields: Vec<String>,
}

impl EncryptionConfig {
    /// Empty configuration.
    pub fn new() -> Self {
        EncryptionConfig::default()
    }

    /// Builds a configuration from two field-name lists.
    pub fn create(sha256_fields: &[&str], aes256_fields: &[&str]) -> Self {
        let mut config = EncryptionConfig::new();
        for field in sha256_fields {
            config.add_sha256_field(field);
        }
        for field in aes256_fields {
            config.add_aes256_field(field);
        }
        config
    }

    /// Marks a field for SHA-256 hashing.
    pub fn add_sha256_field(&mut self, field: &str) {
        if !self.sha256_fields.iter().any(|f| f == field) {
            self.sha256_fields.push(field.to_string());
        }
    }

    /// Marks a field for AES-256 encryption.
    pub fn add_aes256_field(&mut self, field: &str) {
        if !self.aes256_fields.iter().any(|f| f == field) {
            self.aes256_fields.push(field.to_string());
        }
    }

    /// True when the field is hashed.
    pub fn is_sha256_field(&self, field: &str) -> bool {
        self.sha256_fields.iter().any(|f| f == field)
    }

    /// True when the field is encrypted.
    pub fn is_aes256_field(&self, field: &str) -> bool {
        self.aes256_fields.iter().any(|f| f == field)
    }

    /// True when the field gets either treatment.
    pub fn is_encrypted_field(&self, field: &str) -> bool {
        self.is_sha256_field(field) || self.is_aes256_field(field)
    }

    /// Cipher-field names.
    pub fn aes256_fields(&self) -> &[String] {
        &self.aes256_fields
    }

    /// Hash-field names.
    pub fn sha256_fields(&self) -> &[String] {
        &self.sha256_fields
    }
}

/// Applies the configured field treatments on a collection's write and
/// read paths.
#[derive(Debug)]
pub struct EncryptionManager {
    config: EncryptionConfig,
    cipher: Option<Aes256Cipher>,
}

impl EncryptionManager {
    /// Builds a manager.
    ///
    /// Key resolution when cipher-fields are configured: explicit `key`
    /// argument, then [`ENCRYPTION_KEY_ENV`], then 32 auto-generated random
    /// bytes announced with a warning on the diagnostic channel.
    pub fn new(config: EncryptionConfig, key: Option<AesKey>) -> Result<Self> {
        if let Some(field) = config
            .sha256_fields
            .iter()
            .find(|f| config.is_aes256_field(f))
        {
            return Err(Error::BadQuery(format!(
                "field '{}' configured for both hashing and encryption",
                field
            )));
        }

        let cipher = if config.aes256_fields.is_empty() {
            None
        } else {
            let key = key
                .or_else(|| std::env::var(ENCRYPTION_KEY_ENV).ok().map(AesKey::from))
                .unwrap_or_else(|| {
                    let mut bytes = [0u8; 32];
                    rand::thread_rng().fill_bytes(&mut bytes);
                    log::warn!(
                        "auto-generated encryption key; store it securely and set {} \
                         or pass an explicit key to avoid this: {}",
                        ENCRYPTION_KEY_ENV,
                        BASE64.encode(bytes)
                    );
                    AesKey::Raw(bytes)
                });
            Some(Aes256Cipher::new(key)?)
        };

        Ok(EncryptionManager { config, cipher })
    }

    /// The active configuration.
    pub fn config(&self) -> &EncryptionConfig {
        &self.config
    }

    /// Replaces configured string fields with their stored forms.
    pub fn encrypt_document(&self, document: &Document) -> Result<Document> {
        let mut encrypted = document.clone();
        for field in &self.config.sha256_fields {
            if let Some(Value::String(plain)) = encrypted.get(field) {
                let stored = Sha256Hasher::hash(plain);
                encrypted.insert(field.clone(), Value::Object(stored));
            }
        }
        if let Some(cipher) = &self.cipher {
            for field in &self.config.aes256_fields {
                if let Some(Value::String(plain)) = encrypted.get(field) {
                    let stored = cipher.encrypt(plain)?;
                    encrypted.insert(field.clone(), Value::Object(stored));
                }
            }
        }
        Ok(encrypted)
    }

    /// Decrypts cipher-fields back to plaintext. Hash-fields stay in their
    /// stored form. A value that fails to decrypt is left encrypted and
    /// the failure is logged; the rest of the document still comes back.
    pub fn decrypt_document(&self, document: &Document) -> Document {
        let Some(cipher) = &self.cipher else {
            return document.clone();
        };
        let mut decrypted = document.clone();
        for field in &self.config.aes256_fields {
            let Some(Value::Object(stored)) = decrypted.get(field) else {
                continue;
            };
            if stored.get_str("algorithm") != Some("aes256") {
                continue;
            }
            match cipher.decrypt(stored) {
                Ok(plain) => {
                    decrypted.insert(field.clone(), Value::String(plain));
                }
                Err(err) => {
                    log::warn!("failed to decrypt field '{}': {}", field, err);
                }
            }
        }
        decrypted
    }

    /// Verifies a plaintext value against the stored form of a hash-field.
    pub fn verify_hashed_field(&self, field: &str, value: &str, stored: &Document) -> Result<bool> {
        if !self.config.is_sha256_field(field) {
            return Err(Error::BadQuery(format!(
                "field '{}' is not configured for SHA-256 hashing",
                field
            )));
        }
        Sha256Hasher::verify(value, stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;

    #[test]
    fn test_hash_creates_valid_stored_form() {
        let stored = Sha256Hasher::hash("test_password");
        assert!(stored.get_str("hash").is_some());
        assert!(stored.get_str("salt").is_some());
        assert_eq!(stored.get_str("algorithm"), Some("sha256"));
    }

    #[test]
    fn test_verify_correct_and_incorrect() {
        let stored = Sha256Hasher::hash("test_password");
        assert!(Sha256Hasher::verify("test_password", &stored).unwrap());
        assert!(!Sha256Hasher::verify("wrong_password", &stored).unwrap());
    }

    #[test]
    fn test_same_input_different_salts() {
        let first = Sha256Hasher::hash("test_password");
        let second = Sha256Hasher::hash("test_password");
        assert_ne!(first.get_str("hash"), second.get_str("hash"));
        assert!(Sha256Hasher::verify("test_password", &first).unwrap());
        assert!(Sha256Hasher::verify("test_password", &second).unwrap());
    }

    #[test]
    fn test_verify_rejects_malformed_stored_form() {
        let err = Sha256Hasher::verify("x", &doc! { "algorithm" => "sha256" }).unwrap_err();
        assert!(matches!(err, Error::CorruptStore(_)));
    }

    #[cfg(feature = "aes256")]
    #[test]
    fn test_aes_roundtrip() {
        let cipher = Aes256Cipher::new(AesKey::from("test_key")).unwrap();
        let stored = cipher.encrypt("sensitive_data").unwrap();
        assert!(stored.get_str("ciphertext").is_some());
        assert!(stored.get_str("iv").is_some());
        assert_eq!(stored.get_str("algorithm"), Some("aes256"));
        assert_eq!(cipher.decrypt(&stored).unwrap(), "sensitive_data");
    }

    #[cfg(feature = "aes256")]
    #[test]
    fn test_aes_fresh_iv_each_time() {
        let cipher = Aes256Cipher::new(AesKey::from("test_key")).unwrap();
        let first = cipher.encrypt("sensitive_data").unwrap();
        let second = cipher.encrypt("sensitive_data").unwrap();
        assert_ne!(first.get_str("iv"), second.get_str("iv"));
        assert_ne!(first.get_str("ciphertext"), second.get_str("ciphertext"));
        assert_eq!(cipher.decrypt(&first).unwrap(), "sensitive_data");
        assert_eq!(cipher.decrypt(&second).unwrap(), "sensitive_data");
    }

    #[cfg(feature = "aes256")]
    #[test]
    fn test_raw_key_and_passphrase_differ() {
        let raw = Aes256Cipher::new(AesKey::Raw([7u8; 32])).unwrap();
        let derived = Aes256Cipher::new(AesKey::from("7")).unwrap();
        let stored = raw.encrypt("data").unwrap();
        // The wrong key either trips padding/UTF-8 checks or yields garbage
        match derived.decrypt(&stored) {
            Err(Error::CorruptStore(_)) => {}
            Ok(plain) => assert_ne!(plain, "data"),
            Err(other) => panic!("unexpected error kind: {}", other),
        }
        assert_eq!(raw.decrypt(&stored).unwrap(), "data");
    }

    #[test]
    fn test_config_sets() {
        let mut config = EncryptionConfig::new();
        config.add_sha256_field("password");
        config.add_sha256_field("password");
        assert!(config.is_sha256_field("password"));
        assert!(!config.is_aes256_field("password"));
        assert!(config.is_encrypted_field("password"));
        assert_eq!(config.sha256_fields().len(), 1);

        let config = EncryptionConfig::create(&["password"], &["email", "ssn"]);
        assert!(config.is_sha256_field("password"));
        assert!(config.is_aes256_field("email"));
        assert!(config.is_aes256_field("ssn"));
    }

    #[test]
    fn test_overlapping_config_rejected() {
        let config = EncryptionConfig::create(&["secret"], &["secret"]);
        let err = EncryptionManager::new(config, Some(AesKey::from("k"))).unwrap_err();
        assert!(matches!(err, Error::BadQuery(_)));
    }

    #[cfg(feature = "aes256")]
    #[test]
    fn test_manager_encrypts_and_decrypts_documents() {
        let config = EncryptionConfig::create(&["password"], &["email"]);
        let manager = EncryptionManager::new(config, Some(AesKey::from("test_key"))).unwrap();

        let doc = doc! { "username" => "john", "password" => "secret123", "email" => "john@example.com" };
        let stored = manager.encrypt_document(&doc).unwrap();
        assert_eq!(stored.get_str("username"), Some("john"));
        assert_eq!(
            stored.get_document("password").unwrap().get_str("algorithm"),
            Some("sha256")
        );
        assert_eq!(
            stored.get_document("email").unwrap().get_str("algorithm"),
            Some("aes256")
        );

        let restored = manager.decrypt_document(&stored);
        assert_eq!(restored.get_str("email"), Some("john@example.com"));
        // Hash fields stay hashed
        assert!(restored.get_document("password").is_some());

        assert!(manager
            .verify_hashed_field(
                "password",
                "secret123",
                restored.get_document("password").unwrap()
            )
            .unwrap());
        assert!(!manager
            .verify_hashed_field(
                "password",
                "wrong",
                restored.get_document("password").unwrap()
            )
            .unwrap());
    }

    #[cfg(feature = "aes256")]
    #[test]
    fn test_encrypt_is_idempotent_on_stored_forms() {
        let config = EncryptionConfig::create(&[], &["email"]);
        let manager = EncryptionManager::new(config, Some(AesKey::from("k"))).unwrap();
        let doc = doc! { "email" => "e@x" };
        let once = manager.encrypt_document(&doc).unwrap();
        let twice = manager.encrypt_document(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_verify_requires_configured_field() {
        let manager =
            EncryptionManager::new(EncryptionConfig::create(&["password"], &[]), None).unwrap();
        let err = manager
            .verify_hashed_field("email", "x", &doc! {})
            .unwrap_err();
        assert!(matches!(err, Error::BadQuery(_)));
    }
}
