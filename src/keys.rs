/// Plasma Oracles - Signing Keys
///
/// Parses the configured secp256k1 private key and produces signatures in
/// the chain's `SIG_K1_` text format. Both `PVT_K1_` keys and legacy WIF
/// keys are accepted.

use ripemd::Ripemd160;
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};
use sha2::{Digest, Sha256};
use thiserror::Error;

// ============================================================================
// CONSTANTS
// ============================================================================

pub const PRIVATE_KEY_PREFIX: &str = "PVT_K1_";
pub const PUBLIC_KEY_PREFIX: &str = "PUB_K1_";
pub const SIGNATURE_PREFIX: &str = "SIG_K1_";

/// Suffix mixed into the ripemd160 checksum of K1 keys and signatures
const K1_CHECKSUM_SUFFIX: &[u8] = b"K1";

/// Version byte of legacy WIF private keys
const WIF_VERSION: u8 = 0x80;

/// Offset added to the recovery id in the compact signature header (27 + compressed)
const RECOVERY_HEADER_OFFSET: u8 = 31;

/// Attempts before giving up on finding a canonical signature
const MAX_SIGNING_ATTEMPTS: u32 = 64;

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("Invalid base58 encoding: {0}")]
    InvalidEncoding(String),
    #[error("Checksum mismatch")]
    InvalidChecksum,
    #[error("Invalid length: expected {expected}, got {got}")]
    InvalidLength { expected: usize, got: usize },
    #[error("Unsupported key type: {0}")]
    UnsupportedKeyType(String),
    #[error("Invalid key: {0}")]
    InvalidKey(String),
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),
    #[error("Signing failed: {0}")]
    Signing(String),
}

// ============================================================================
// CHECKSUMS
// ============================================================================

fn k1_checksum(data: &[u8]) -> [u8; 4] {
    let mut hasher = Ripemd160::new();
    hasher.update(data);
    hasher.update(K1_CHECKSUM_SUFFIX);
    let digest = hasher.finalize();
    [digest[0], digest[1], digest[2], digest[3]]
}

fn legacy_checksum(data: &[u8]) -> [u8; 4] {
    let digest = Ripemd160::digest(data);
    [digest[0], digest[1], digest[2], digest[3]]
}

fn wif_checksum(data: &[u8]) -> [u8; 4] {
    let digest = Sha256::digest(Sha256::digest(data));
    [digest[0], digest[1], digest[2], digest[3]]
}

fn encode_with_checksum(data: &[u8], checksum: [u8; 4]) -> String {
    let mut bytes = data.to_vec();
    bytes.extend_from_slice(&checksum);
    bs58::encode(bytes).into_string()
}

/// Decode base58 and split off the trailing 4-byte checksum
fn decode_checked(encoded: &str, payload_len: usize) -> Result<(Vec<u8>, [u8; 4]), KeyError> {
    let bytes = bs58::decode(encoded)
        .into_vec()
        .map_err(|e| KeyError::InvalidEncoding(e.to_string()))?;

    if bytes.len() != payload_len + 4 {
        return Err(KeyError::InvalidLength {
            expected: payload_len + 4,
            got: bytes.len(),
        });
    }

    let (payload, checksum) = bytes.split_at(payload_len);
    Ok((payload.to_vec(), [checksum[0], checksum[1], checksum[2], checksum[3]]))
}

/// EOSIO-style canonical check on the compact `r || s` form
pub fn is_canonical(compact: &[u8; 64]) -> bool {
    let (r, s) = compact.split_at(32);
    r[0] & 0x80 == 0
        && !(r[0] == 0 && r[1] & 0x80 == 0)
        && s[0] & 0x80 == 0
        && !(s[0] == 0 && s[1] & 0x80 == 0)
}

// ============================================================================
// SIGNING KEY
// ============================================================================

/// The key that authorizes rate updates
#[derive(Clone)]
pub struct SigningKey {
    secret_key: SecretKey,
    public_key: PublicKey,
}

impl SigningKey {
    /// Create from raw 32-byte secret
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        let secret_key = SecretKey::from_slice(bytes)
            .map_err(|e| KeyError::InvalidKey(e.to_string()))?;
        let public_key = PublicKey::from_secret_key(&Secp256k1::new(), &secret_key);

        Ok(SigningKey { secret_key, public_key })
    }

    /// Generate a fresh random key (dry runs without a configured key)
    pub fn generate() -> Self {
        let secret_key = SecretKey::new(&mut rand::thread_rng());
        let public_key = PublicKey::from_secret_key(&Secp256k1::new(), &secret_key);
        SigningKey { secret_key, public_key }
    }

    /// Parse `PVT_K1_...` or a legacy WIF key
    pub fn from_key_string(key: &str) -> Result<Self, KeyError> {
        let key = key.trim();

        if let Some(body) = key.strip_prefix(PRIVATE_KEY_PREFIX) {
            let (secret, checksum) = decode_checked(body, 32)?;
            if k1_checksum(&secret) != checksum {
                return Err(KeyError::InvalidChecksum);
            }
            return Self::from_secret_bytes(&secret);
        }

        if key.starts_with("PVT_") {
            return Err(KeyError::UnsupportedKeyType(
                key.split('_').take(2).collect::<Vec<_>>().join("_"),
            ));
        }

        let (versioned, checksum) = decode_checked(key, 33)?;
        if versioned[0] != WIF_VERSION {
            return Err(KeyError::UnsupportedKeyType(format!("WIF version 0x{:02x}", versioned[0])));
        }
        if wif_checksum(&versioned) != checksum {
            return Err(KeyError::InvalidChecksum);
        }

        Self::from_secret_bytes(&versioned[1..])
    }

    /// Render as `PVT_K1_...`
    pub fn to_key_string(&self) -> String {
        let secret = self.secret_key.secret_bytes();
        format!("{}{}", PRIVATE_KEY_PREFIX, encode_with_checksum(&secret, k1_checksum(&secret)))
    }

    /// Render as legacy WIF
    pub fn to_wif(&self) -> String {
        let mut versioned = vec![WIF_VERSION];
        versioned.extend_from_slice(&self.secret_key.secret_bytes());
        let checksum = wif_checksum(&versioned);
        encode_with_checksum(&versioned, checksum)
    }

    pub fn public_key(&self) -> PublicKey {
        self.public_key
    }

    /// Public key as `PUB_K1_...`
    pub fn public_key_string(&self) -> String {
        public_key_to_string(&self.public_key)
    }

    /// Public key in the legacy `<prefix><base58>` form, e.g. `EOS6MRy...`
    pub fn legacy_public_key_string(&self, prefix: &str) -> String {
        let compressed = self.public_key.serialize();
        format!("{}{}", prefix, encode_with_checksum(&compressed, legacy_checksum(&compressed)))
    }

    /// Sign a 32-byte digest, returning a canonical `SIG_K1_...` signature
    pub fn sign_digest(&self, digest: &[u8; 32]) -> Result<String, KeyError> {
        let secp = Secp256k1::new();
        let message = Message::from_digest_slice(digest)
            .map_err(|e| KeyError::Signing(e.to_string()))?;

        for attempt in 0..MAX_SIGNING_ATTEMPTS {
            let signature = if attempt == 0 {
                secp.sign_ecdsa_recoverable(&message, &self.secret_key)
            } else {
                let mut noncedata = [0u8; 32];
                noncedata[..4].copy_from_slice(&attempt.to_le_bytes());
                secp.sign_ecdsa_recoverable_with_noncedata(&message, &self.secret_key, &noncedata)
            };

            let (recovery_id, compact) = signature.serialize_compact();
            if is_canonical(&compact) {
                return Ok(signature_to_string(recovery_id, &compact));
            }
        }

        Err(KeyError::Signing(format!(
            "no canonical signature after {} attempts",
            MAX_SIGNING_ATTEMPTS
        )))
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("public_key", &self.public_key_string())
            .finish()
    }
}

// ============================================================================
// TEXT FORMATS
// ============================================================================

pub fn public_key_to_string(public_key: &PublicKey) -> String {
    let compressed = public_key.serialize();
    format!("{}{}", PUBLIC_KEY_PREFIX, encode_with_checksum(&compressed, k1_checksum(&compressed)))
}

fn signature_to_string(recovery_id: RecoveryId, compact: &[u8; 64]) -> String {
    let mut data = Vec::with_capacity(65);
    data.push(recovery_id.to_i32() as u8 + RECOVERY_HEADER_OFFSET);
    data.extend_from_slice(compact);
    let checksum = k1_checksum(&data);
    format!("{}{}", SIGNATURE_PREFIX, encode_with_checksum(&data, checksum))
}

/// Recover the `PUB_K1_...` key that produced `signature` over `digest`
pub fn recover_public_key(signature: &str, digest: &[u8; 32]) -> Result<String, KeyError> {
    let body = signature
        .strip_prefix(SIGNATURE_PREFIX)
        .ok_or_else(|| KeyError::InvalidSignature(format!("missing {} prefix", SIGNATURE_PREFIX)))?;

    let (data, checksum) = decode_checked(body, 65)?;
    if k1_checksum(&data) != checksum {
        return Err(KeyError::InvalidChecksum);
    }

    let header = data[0]
        .checked_sub(RECOVERY_HEADER_OFFSET)
        .ok_or_else(|| KeyError::InvalidSignature(format!("bad header byte {}", data[0])))?;
    let recovery_id = RecoveryId::from_i32(header as i32)
        .map_err(|e| KeyError::InvalidSignature(e.to_string()))?;
    let signature = RecoverableSignature::from_compact(&data[1..], recovery_id)
        .map_err(|e| KeyError::InvalidSignature(e.to_string()))?;

    let message = Message::from_digest_slice(digest)
        .map_err(|e| KeyError::InvalidSignature(e.to_string()))?;
    let public_key = Secp256k1::new()
        .recover_ecdsa(&message, &signature)
        .map_err(|e| KeyError::InvalidSignature(e.to_string()))?;

    Ok(public_key_to_string(&public_key))
}

// ============================================================================
// TESTS
// ============================================================================
