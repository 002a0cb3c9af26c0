// Cryptographic collaborators consumed by the ledger: a hex digest function and
// an Ed25519 signature scheme, bundled into a `CryptoContext` that is passed
// explicitly to transaction and block operations.
use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier as _, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Rendering of the reward sentinel address
const REWARD_SENTINEL: &str = "0";

/// Errors that can occur during cryptographic operations
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Decoding error: {0}")]
    DecodingError(String),
}

/// A ledger address: either the reward sentinel used as the sender of mining
/// rewards, or an Ed25519 public key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Address {
    Reward,
    Key([u8; 32]),
}

impl Address {
    /// Creates a new address from a public key
    pub fn from_public_key(public_key: &VerifyingKey) -> Self {
        Address::Key(public_key.to_bytes())
    }

    /// Converts the address to a public key
    pub fn to_public_key(&self) -> Result<VerifyingKey, CryptoError> {
        match self {
            Address::Reward => Err(CryptoError::InvalidPublicKey(
                "reward sentinel has no public key".to_string(),
            )),
            Address::Key(bytes) => VerifyingKey::from_bytes(bytes)
                .map_err(|e| CryptoError::InvalidPublicKey(e.to_string())),
        }
    }

    pub fn is_reward(&self) -> bool {
        matches!(self, Address::Reward)
    }

    /// Fixed-width form used in hash input: 64 hex digits for a key, "0" for the sentinel
    pub fn to_hex(&self) -> String {
        match self {
            Address::Reward => REWARD_SENTINEL.to_string(),
            Address::Key(bytes) => hex::encode(bytes),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Reward => write!(f, "{}", REWARD_SENTINEL),
            Address::Key(bytes) => write!(f, "{}", bs58::encode(bytes).into_string()),
        }
    }
}

impl FromStr for Address {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // '0' is outside the base58 alphabet, so the sentinel never collides with a key
        if s == REWARD_SENTINEL {
            return Ok(Address::Reward);
        }

        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|e| CryptoError::DecodingError(e.to_string()))?;

        let key: [u8; 32] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidPublicKey("Invalid public key length".to_string())
        })?;

        Ok(Address::Key(key))
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.to_string()
    }
}

impl TryFrom<String> for Address {
    type Error = CryptoError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Represents a digital signature (hex encoded)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigitalSignature(pub String);

impl DigitalSignature {
    /// Creates a new digital signature from a signature
    pub fn from_signature(signature: &Signature) -> Self {
        DigitalSignature(hex::encode(signature.to_bytes()))
    }

    /// Converts the digital signature to a signature
    pub fn to_signature(&self) -> Result<Signature, CryptoError> {
        let bytes = hex::decode(&self.0).map_err(|e| CryptoError::DecodingError(e.to_string()))?;

        let signature_bytes: [u8; 64] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidSignature("Invalid signature length".to_string())
        })?;

        Ok(Signature::from_bytes(&signature_bytes))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Digest function shared by transaction and block hashing
pub trait Hasher: Send + Sync {
    /// Returns the lower-case hex digest of `data`
    fn digest(&self, data: &[u8]) -> String;
}

/// SHA-256 digest, 64 hex characters
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Hasher;

impl Hasher for Sha256Hasher {
    fn digest(&self, data: &[u8]) -> String {
        format!("{:x}", Sha256::digest(data))
    }
}

/// Something holding a private key that can sign on behalf of its address
pub trait Signer {
    fn address(&self) -> Address;

    fn sign(&self, message: &[u8]) -> Result<DigitalSignature, CryptoError>;
}

/// Verification side of an elliptic-curve signature scheme
pub trait SignatureScheme: Send + Sync {
    /// Returns `Ok(false)` for a well-formed signature that does not verify
    fn verify(
        &self,
        message: &[u8],
        signature: &DigitalSignature,
        public_key: &Address,
    ) -> Result<bool, CryptoError>;

    /// Derives the public address belonging to a raw secret key
    fn public_key_of(&self, secret_key: &[u8]) -> Result<Address, CryptoError>;
}

/// Ed25519 (RFC 8032) over Curve25519
#[derive(Debug, Clone, Copy, Default)]
pub struct Ed25519Scheme;

impl SignatureScheme for Ed25519Scheme {
    fn verify(
        &self,
        message: &[u8],
        signature: &DigitalSignature,
        public_key: &Address,
    ) -> Result<bool, CryptoError> {
        let public_key = public_key.to_public_key()?;
        verify_signature(message, signature, &public_key)
    }

    fn public_key_of(&self, secret_key: &[u8]) -> Result<Address, CryptoError> {
        Ok(*Wallet::from_secret_key(secret_key)?.address())
    }
}

/// Hasher and signature scheme handed to every ledger operation that needs them
#[derive(Clone)]
pub struct CryptoContext {
    hasher: Arc<dyn Hasher>,
    scheme: Arc<dyn SignatureScheme>,
}

impl CryptoContext {
    pub fn new(hasher: Arc<dyn Hasher>, scheme: Arc<dyn SignatureScheme>) -> Self {
        CryptoContext { hasher, scheme }
    }

    pub fn hasher(&self) -> &dyn Hasher {
        self.hasher.as_ref()
    }

    pub fn scheme(&self) -> &dyn SignatureScheme {
        self.scheme.as_ref()
    }
}

impl Default for CryptoContext {
    fn default() -> Self {
        CryptoContext::new(Arc::new(Sha256Hasher), Arc::new(Ed25519Scheme))
    }
}

impl fmt::Debug for CryptoContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CryptoContext").finish_non_exhaustive()
    }
}

/// Represents a wallet with a keypair
#[derive(Debug, Clone)]
pub struct Wallet {
    signing_key: SigningKey,
    address: Address,
}

impl Wallet {
    /// Creates a new wallet with a random keypair
    pub fn new() -> Self {
        let mut csprng = OsRng;
        let signing_key = SigningKey::generate(&mut csprng);
        Self::from_signing_key(signing_key)
    }

    /// Creates a wallet from an existing secret key
    pub fn from_secret_key(secret_key_bytes: &[u8]) -> Result<Self, CryptoError> {
        let bytes_array: [u8; 32] = secret_key_bytes.try_into().map_err(|_| {
            CryptoError::InvalidPrivateKey("Invalid private key length".to_string())
        })?;

        Ok(Self::from_signing_key(SigningKey::from_bytes(&bytes_array)))
    }

    /// Creates a wallet from a hex encoded secret key
    pub fn from_secret_hex(secret_key_hex: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(secret_key_hex)
            .map_err(|e| CryptoError::InvalidPrivateKey(e.to_string()))?;
        Self::from_secret_key(&bytes)
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let address = Address::from_public_key(&signing_key.verifying_key());

        Wallet {
            signing_key,
            address,
        }
    }

    /// Gets the wallet's address
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Exports the wallet's secret key as bytes
    pub fn export_secret_key(&self) -> Vec<u8> {
        self.signing_key.to_bytes().to_vec()
    }
}

impl Default for Wallet {
    fn default() -> Self {
        Self::new()
    }
}

impl Signer for Wallet {
    fn address(&self) -> Address {
        self.address
    }

    fn sign(&self, message: &[u8]) -> Result<DigitalSignature, CryptoError> {
        let signature = self.signing_key.sign(message);
        Ok(DigitalSignature::from_signature(&signature))
    }
}

/// Verifies a signature against a message and public key
pub fn verify_signature(
    message: &[u8],
    signature: &DigitalSignature,
    public_key: &VerifyingKey,
) -> Result<bool, CryptoError> {
    let signature = signature.to_signature()?;

    match public_key.verify(message, &signature) {
        Ok(_) => Ok(true),
        Err(_) => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wallet_creation() {
        let wallet = Wallet::new();
        assert!(!wallet.address().is_reward());
        assert!(!wallet.address().to_string().is_empty());
    }

    #[test]
    fn test_signing_and_verification() {
        let wallet = Wallet::new();
        let scheme = Ed25519Scheme;
        let message = b"Hello, world!";

        let signature = Signer::sign(&wallet, message).unwrap();
        assert!(scheme.verify(message, &signature, wallet.address()).unwrap());

        let wrong_message = b"Wrong message";
        assert!(!scheme.verify(wrong_message, &signature, wallet.address()).unwrap());

        let other = Wallet::new();
        assert!(!scheme.verify(message, &signature, other.address()).unwrap());
    }

    #[test]
    fn test_address_conversion() {
        let wallet = Wallet::new();
        let public_key = wallet.address().to_public_key().unwrap();
        assert_eq!(&Address::from_public_key(&public_key), wallet.address());

        let parsed: Address = wallet.address().to_string().parse().unwrap();
        assert_eq!(&parsed, wallet.address());
    }

    #[test]
    fn test_reward_sentinel() {
        assert_eq!(Address::Reward.to_string(), "0");
        assert_eq!("0".parse::<Address>().unwrap(), Address::Reward);
        assert!(Address::Reward.to_public_key().is_err());
        assert!("not-base58-0OIl".parse::<Address>().is_err());
    }

    #[test]
    fn test_hex_form_is_fixed_width() {
        for _ in 0..20 {
            assert_eq!(Wallet::new().address().to_hex().len(), 64);
        }
        assert_eq!(Address::Reward.to_hex(), "0");
    }

    #[test]
    fn test_address_serializes_as_string() {
        let wallet = Wallet::new();
        let json = serde_json::to_string(wallet.address()).unwrap();
        assert_eq!(json, format!("\"{}\"", wallet.address()));
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(&back, wallet.address());
        assert_eq!(serde_json::to_string(&Address::Reward).unwrap(), "\"0\"");
    }

    #[test]
    fn test_public_key_of_secret() {
        let wallet = Wallet::new();
        let secret = wallet.export_secret_key();
        let derived = Ed25519Scheme.public_key_of(&secret).unwrap();
        assert_eq!(&derived, wallet.address());

        let restored = Wallet::from_secret_hex(&hex::encode(&secret)).unwrap();
        assert_eq!(restored.address(), wallet.address());
        assert!(Ed25519Scheme.public_key_of(&[1u8; 7]).is_err());
    }

    #[test]
    fn test_sha256_hasher() {
        let digest = Sha256Hasher.digest(b"abc");
        assert_eq!(
            digest,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(Sha256Hasher.digest(b""), Sha256Hasher.digest(b""));
    }

    #[test]
    fn test_malformed_signature_is_an_error() {
        let wallet = Wallet::new();
        let bogus = DigitalSignature("zz".to_string());
        assert!(Ed25519Scheme.verify(b"m", &bogus, wallet.address()).is_err());
        let short = DigitalSignature("abcd".to_string());
        assert!(Ed25519Scheme.verify(b"m", &short, wallet.address()).is_err());
    }
}
