use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::crypto::{Address, CryptoContext, CryptoError, DigitalSignature, Hasher, Signer};

/// Errors that can occur during transaction operations
#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("You cannot sign transactions for other wallets")]
    Unauthorized,

    #[error("No signature in this transaction")]
    MissingSignature,

    #[error("Malformed transaction: {0}")]
    Malformed(String),

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Crypto error: {0}")]
    CryptoError(#[from] CryptoError),
}

/// A transfer of `amount` from one address to another
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Sender's address, `Address::Reward` for mining rewards
    pub from_address: Address,

    /// Recipient's address
    pub to_address: Address,

    /// Amount being transferred
    pub amount: u64,

    /// Signature over `calculate_hash()`, set by `sign`
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub signature: Option<DigitalSignature>,
}

impl Transaction {
    /// Creates a new unsigned transaction
    pub fn new(from_address: Address, to_address: Address, amount: u64) -> Self {
        Transaction {
            from_address,
            to_address,
            amount,
            signature: None,
        }
    }

    /// Creates a mining reward transaction; it needs no signature
    pub fn reward(recipient: Address, amount: u64) -> Self {
        Transaction::new(Address::Reward, recipient, amount)
    }

    /// Checks if the transaction is a mining reward
    pub fn is_reward(&self) -> bool {
        self.from_address.is_reward()
    }

    /// Digest of sender, recipient and amount, in that order.
    /// Fields are hex or decimal and joined with ':' so their boundaries are unambiguous.
    pub fn calculate_hash(&self, hasher: &dyn Hasher) -> String {
        let payload = format!(
            "{}:{}:{}",
            self.from_address.to_hex(),
            self.to_address.to_hex(),
            self.amount
        );
        hasher.digest(payload.as_bytes())
    }

    /// Signs the transaction hash. The signer must own `from_address`.
    ///
    /// Signing again replaces the previous signature.
    pub fn sign(
        &mut self,
        signer: &dyn Signer,
        crypto: &CryptoContext,
    ) -> Result<(), TransactionError> {
        if signer.address() != self.from_address {
            return Err(TransactionError::Unauthorized);
        }

        let hash = self.calculate_hash(crypto.hasher());
        self.signature = Some(signer.sign(hash.as_bytes())?);

        Ok(())
    }

    /// Checks the signature against the current contents.
    ///
    /// Reward transactions are always valid. An unsigned transfer is an error,
    /// while a signature that fails verification is reported as `Ok(false)`.
    pub fn is_valid(&self, crypto: &CryptoContext) -> Result<bool, TransactionError> {
        if self.is_reward() {
            return Ok(true);
        }

        let signature = match &self.signature {
            Some(sig) if !sig.is_empty() => sig,
            _ => return Err(TransactionError::MissingSignature),
        };

        let hash = self.calculate_hash(crypto.hasher());

        match crypto.scheme().verify(hash.as_bytes(), signature, &self.from_address) {
            // A signature that does not even decode cannot be valid
            Err(CryptoError::InvalidSignature(_)) | Err(CryptoError::DecodingError(_)) => Ok(false),
            result => result.map_err(TransactionError::from),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::crypto::{Sha256Hasher, Wallet};

    fn signed(sender: &Wallet, recipient: &Wallet, amount: u64) -> Transaction {
        let mut transaction = Transaction::new(*sender.address(), *recipient.address(), amount);
        transaction.sign(sender, &CryptoContext::default()).unwrap();
        transaction
    }

    #[test]
    fn test_new_transaction() {
        let sender_wallet = Wallet::new();
        let recipient_wallet = Wallet::new();

        let transaction = Transaction::new(*sender_wallet.address(), *recipient_wallet.address(), 10);

        assert_eq!(transaction.from_address, *sender_wallet.address());
        assert_eq!(transaction.to_address, *recipient_wallet.address());
        assert_eq!(transaction.amount, 10);
        assert!(transaction.signature.is_none());
        assert!(!transaction.is_reward());
    }

    #[test]
    fn test_hash_is_stable_and_field_sensitive() {
        let sender_wallet = Wallet::new();
        let recipient_wallet = Wallet::new();
        let mut transaction = Transaction::new(*sender_wallet.address(), *recipient_wallet.address(), 10);

        let hash = transaction.calculate_hash(&Sha256Hasher);
        assert_eq!(hash, transaction.calculate_hash(&Sha256Hasher));
        assert_eq!(hash.len(), 64);

        transaction.amount = 11;
        assert_ne!(hash, transaction.calculate_hash(&Sha256Hasher));
    }

    #[test]
    fn test_sign_transaction() {
        let sender_wallet = Wallet::new();
        let recipient_wallet = Wallet::new();

        let transaction = signed(&sender_wallet, &recipient_wallet, 10);

        assert!(transaction.signature.is_some());
        assert!(transaction.is_valid(&CryptoContext::default()).unwrap());
    }

    #[test]
    fn test_sign_with_foreign_key_is_unauthorized() {
        let sender_wallet = Wallet::new();
        let thief = Wallet::new();
        let mut transaction = Transaction::new(*sender_wallet.address(), *thief.address(), 10);

        let result = transaction.sign(&thief, &CryptoContext::default());
        assert!(matches!(result, Err(TransactionError::Unauthorized)));
        assert!(transaction.signature.is_none());
    }

    #[test]
    fn test_unsigned_transaction_is_an_error() {
        let sender_wallet = Wallet::new();
        let recipient_wallet = Wallet::new();
        let transaction = Transaction::new(*sender_wallet.address(), *recipient_wallet.address(), 10);

        let result = transaction.is_valid(&CryptoContext::default());
        assert!(matches!(result, Err(TransactionError::MissingSignature)));
    }

    #[test]
    fn test_tampering_invalidates_signature() {
        let crypto = CryptoContext::default();
        let sender_wallet = Wallet::new();
        let recipient_wallet = Wallet::new();
        let other = Wallet::new();

        let mut transaction = signed(&sender_wallet, &recipient_wallet, 10);
        transaction.amount = 1_000;
        assert!(!transaction.is_valid(&crypto).unwrap());

        let mut transaction = signed(&sender_wallet, &recipient_wallet, 10);
        transaction.to_address = *other.address();
        assert!(!transaction.is_valid(&crypto).unwrap());

        let mut transaction = signed(&sender_wallet, &recipient_wallet, 10);
        transaction.from_address = *other.address();
        assert!(!transaction.is_valid(&crypto).unwrap());
    }

    #[test]
    fn test_moving_characters_between_fields_invalidates_signature() {
        let crypto = CryptoContext::default();
        let sender_wallet = Wallet::new();

        // Find a recipient whose base58 form ends in a digit and still names a
        // key once that digit is dropped, then shift the digit into the amount.
        let mut shifted = None;
        for _ in 0..10_000 {
            let recipient = *Wallet::new().address();
            let text = recipient.to_string();
            let (head, last) = text.split_at(text.len() - 1);
            if !matches!(last.as_bytes(), [b'1'..=b'9']) {
                continue;
            }
            if let Ok(truncated) = head.parse::<Address>() {
                shifted = Some((recipient, truncated, format!("{}100", last).parse::<u64>().unwrap()));
                break;
            }
        }
        let (recipient, truncated, amount) = shifted.expect("no suitable recipient found");

        let mut transaction = Transaction::new(*sender_wallet.address(), recipient, 100);
        transaction.sign(&sender_wallet, &crypto).unwrap();

        let mut forged = transaction.clone();
        forged.to_address = truncated;
        forged.amount = amount;

        assert_ne!(
            transaction.calculate_hash(crypto.hasher()),
            forged.calculate_hash(crypto.hasher())
        );
        assert!(!forged.is_valid(&crypto).unwrap());
    }

    #[test]
    fn test_undecodable_signature_is_invalid() {
        let crypto = CryptoContext::default();
        let sender_wallet = Wallet::new();
        let recipient_wallet = Wallet::new();

        let mut transaction = signed(&sender_wallet, &recipient_wallet, 10);
        let full = transaction.signature.clone().unwrap().0;

        transaction.signature = Some(DigitalSignature(full[..full.len() - 2].to_string()));
        assert!(!transaction.is_valid(&crypto).unwrap());

        transaction.signature = Some(DigitalSignature(format!("zz{}", &full[2..])));
        assert!(!transaction.is_valid(&crypto).unwrap());
    }

    #[test]
    fn test_resigning_after_change_is_allowed() {
        let crypto = CryptoContext::default();
        let sender_wallet = Wallet::new();
        let recipient_wallet = Wallet::new();

        let mut transaction = signed(&sender_wallet, &recipient_wallet, 10);
        transaction.amount = 20;
        transaction.sign(&sender_wallet, &crypto).unwrap();
        assert!(transaction.is_valid(&crypto).unwrap());
    }

    #[test]
    fn test_reward_transaction() {
        let miner_wallet = Wallet::new();

        let transaction = Transaction::reward(*miner_wallet.address(), 50);

        assert_eq!(transaction.from_address, Address::Reward);
        assert_eq!(transaction.to_address, *miner_wallet.address());
        assert_eq!(transaction.amount, 50);
        assert!(transaction.is_reward());
        assert!(transaction.is_valid(&CryptoContext::default()).unwrap());

        let mut with_junk = transaction.clone();
        with_junk.signature = Some(DigitalSignature("00".to_string()));
        assert!(with_junk.is_valid(&CryptoContext::default()).unwrap());
    }

    #[test]
    fn test_serialization_omits_missing_signature() {
        let miner_wallet = Wallet::new();
        let transaction = Transaction::reward(*miner_wallet.address(), 50);
        let json = serde_json::to_string(&transaction).unwrap();
        assert_eq!(
            json,
            format!(
                r#"{{"from_address":"0","to_address":"{}","amount":50}}"#,
                miner_wallet.address()
            )
        );
        let back: Transaction = serde_json::from_str(&json).unwrap();
        assert_eq!(back, transaction);
    }
}
