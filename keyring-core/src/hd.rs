//! Hierarchical-deterministic address derivation.
//!
//! Mnemonics are BIP-39 English phrases. Keys are derived with BIP-32 over
//! secp256k1 on the standard Ethereum path:
//!
//! ```text
//! m/44'/60'/0'/0/<index>
//! ```
//!
//! Addresses are `keccak256(uncompressed_pubkey[1..])[12..]`, rendered with
//! the EIP-55 checksum. Everything here is pure and deterministic.

use std::str::FromStr;

use alloy_primitives::{keccak256, Address};
use bip32::{ChildNumber, DerivationPath, XPrv, XPub};
use bip39::{Language, Mnemonic};
use k256::ecdsa::{SigningKey, VerifyingKey};
use rand::{rngs::OsRng, RngCore};
use thiserror::Error;
use zeroize::Zeroizing;

/// Account-level path. The address index is appended as a non-hardened child.
pub const ETHEREUM_ACCOUNT_PATH: &str = "m/44'/60'/0'/0";

/// Word count of generated mnemonics.
pub const DEFAULT_WORD_COUNT: usize = 12;

/// Length of a raw secp256k1 private key.
pub const PRIVATE_KEY_SIZE: usize = 32;

/// Errors raised while parsing mnemonics or deriving keys.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HdError {
    /// The phrase is not a valid BIP-39 mnemonic (unknown word, bad length
    /// or checksum).
    #[error("invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    /// The requested index range is empty or reversed.
    #[error("invalid index range: end ({end}) must be greater than start ({start})")]
    InvalidIndexRange {
        /// Inclusive start index.
        start: u32,
        /// Exclusive end index.
        end: u32,
    },

    /// The bytes are not a valid secp256k1 private key.
    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),

    /// BIP-32 derivation failed (e.g. index out of the non-hardened range).
    #[error("derivation failed: {0}")]
    Derivation(String),
}

/// Private key material derived at one HD index.
pub struct DerivedAccount {
    /// Address of the key.
    pub address: Address,
    /// Raw private key. Zeroized on drop.
    pub private_key: Zeroizing<[u8; PRIVATE_KEY_SIZE]>,
}

impl std::fmt::Debug for DerivedAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedAccount")
            .field("address", &self.address)
            .field("private_key", &"[REDACTED]")
            .finish()
    }
}

/// Lower-cases a phrase and collapses whitespace to single spaces.
#[must_use]
pub fn normalize_phrase(phrase: &str) -> Zeroizing<String> {
    let lowered = Zeroizing::new(phrase.to_lowercase());
    Zeroizing::new(lowered.split_whitespace().collect::<Vec<_>>().join(" "))
}

/// Parses and validates a mnemonic (word list membership and checksum).
///
/// # Errors
///
/// Returns [`HdError::InvalidMnemonic`] if the phrase is not valid BIP-39.
pub fn parse_mnemonic(phrase: &str) -> Result<Mnemonic, HdError> {
    let normalized = normalize_phrase(phrase);
    Mnemonic::parse_in_normalized(Language::English, &normalized)
        .map_err(|err| HdError::InvalidMnemonic(err.to_string()))
}

/// Generates a new random mnemonic with `word_count` words.
///
/// # Errors
///
/// Returns [`HdError::InvalidMnemonic`] if `word_count` is not one of
/// 12, 15, 18, 21 or 24.
pub fn generate_mnemonic(word_count: usize) -> Result<Zeroizing<String>, HdError> {
    if !matches!(word_count, 12 | 15 | 18 | 21 | 24) {
        return Err(HdError::InvalidMnemonic(format!(
            "unsupported word count: {word_count}"
        )));
    }
    let mut entropy = Zeroizing::new(vec![0u8; word_count / 3 * 4]);
    OsRng.fill_bytes(&mut entropy);
    let mnemonic = Mnemonic::from_entropy(&entropy)
        .map_err(|err| HdError::InvalidMnemonic(err.to_string()))?;
    Ok(Zeroizing::new(mnemonic.to_string()))
}

/// Derives the address at `index` from `phrase`.
///
/// # Errors
///
/// Returns [`HdError::InvalidMnemonic`] for an invalid phrase and
/// [`HdError::Derivation`] if `index` is outside the non-hardened range.
pub fn derive_address(phrase: &str, index: u32) -> Result<Address, HdError> {
    Ok(derive_account(phrase, index)?.address)
}

/// Derives the addresses for indices `[start, end)`, in ascending order.
///
/// # Errors
///
/// Returns [`HdError::InvalidIndexRange`] if `end <= start`,
/// [`HdError::InvalidMnemonic`] for an invalid phrase, and
/// [`HdError::Derivation`] if an index is outside the non-hardened range.
pub fn derive_addresses(phrase: &str, start: u32, end: u32) -> Result<Vec<Address>, HdError> {
    if end <= start {
        return Err(HdError::InvalidIndexRange { start, end });
    }
    let mnemonic = parse_mnemonic(phrase)?;
    // Derive the account node once and walk its public children.
    let account: XPub = account_xprv(&mnemonic)?.public_key();

    (start..end)
        .map(|index| -> Result<Address, HdError> {
            let child = account
                .derive_child(child_number(index)?)
                .map_err(|err| HdError::Derivation(err.to_string()))?;
            Ok(address_from_verifying_key(child.public_key()))
        })
        .collect()
}

/// Derives the private key and address at `index` from `phrase`.
///
/// # Errors
///
/// Same as [`derive_address`].
pub fn derive_account(phrase: &str, index: u32) -> Result<DerivedAccount, HdError> {
    let mnemonic = parse_mnemonic(phrase)?;
    let child = account_xprv(&mnemonic)?
        .derive_child(child_number(index)?)
        .map_err(|err| HdError::Derivation(err.to_string()))?;

    Ok(DerivedAccount {
        address: address_from_verifying_key(child.public_key().public_key()),
        private_key: Zeroizing::new(child.to_bytes()),
    })
}

/// Returns the address controlled by a raw private key.
///
/// # Errors
///
/// Returns [`HdError::InvalidPrivateKey`] if the bytes are not a valid
/// non-zero scalar below the curve order.
pub fn address_from_private_key(private_key: &[u8]) -> Result<Address, HdError> {
    let signing_key = SigningKey::from_slice(private_key)
        .map_err(|err| HdError::InvalidPrivateKey(err.to_string()))?;
    Ok(address_from_verifying_key(signing_key.verifying_key()))
}

/// Parses a hex private key, with or without `0x` prefix.
///
/// # Errors
///
/// Returns [`HdError::InvalidPrivateKey`] if the input is not 32 bytes of hex.
pub fn parse_private_key(hex_key: &str) -> Result<Zeroizing<[u8; PRIVATE_KEY_SIZE]>, HdError> {
    let trimmed = hex_key.trim();
    let stripped = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    let bytes = Zeroizing::new(
        hex::decode(stripped).map_err(|err| HdError::InvalidPrivateKey(err.to_string()))?,
    );
    let mut out = Zeroizing::new([0u8; PRIVATE_KEY_SIZE]);
    if bytes.len() != PRIVATE_KEY_SIZE {
        return Err(HdError::InvalidPrivateKey(format!(
            "expected {PRIVATE_KEY_SIZE} bytes, got {}",
            bytes.len()
        )));
    }
    out.copy_from_slice(&bytes);
    Ok(out)
}

/// Encodes a private key as `0x`-prefixed lower-case hex.
#[must_use]
pub fn encode_private_key(private_key: &[u8; PRIVATE_KEY_SIZE]) -> Zeroizing<String> {
    Zeroizing::new(format!("0x{}", hex::encode(private_key)))
}

fn account_xprv(mnemonic: &Mnemonic) -> Result<XPrv, HdError> {
    let seed = Zeroizing::new(mnemonic.to_seed_normalized(""));
    let path = DerivationPath::from_str(ETHEREUM_ACCOUNT_PATH)
        .map_err(|err| HdError::Derivation(err.to_string()))?;
    XPrv::derive_from_path(seed.as_slice(), &path)
        .map_err(|err| HdError::Derivation(err.to_string()))
}

fn child_number(index: u32) -> Result<ChildNumber, HdError> {
    ChildNumber::new(index, false).map_err(|err| HdError::Derivation(err.to_string()))
}

fn address_from_verifying_key(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    let hash = keccak256(&point.as_bytes()[1..]);
    Address::from_slice(&hash[12..])
}

#[cfg(test)]
mod tests {
    use alloy_primitives::address;

    use super::*;

    const HARDHAT: &str = "test test test test test test test test test test test junk";

    #[test]
    fn test_known_address_vectors() {
        assert_eq!(
            derive_address(HARDHAT, 0).unwrap(),
            address!("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266")
        );
        assert_eq!(
            derive_address(HARDHAT, 1).unwrap(),
            address!("0x70997970C51812dc3A010C7d01b50e0d17dc79C8")
        );
        assert_eq!(
            derive_address(
                "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about",
                0
            )
            .unwrap(),
            address!("0x9858EfFD232B4033E47d90003D41EC34EcaEda94")
        );
    }

    #[test]
    fn test_checksum_rendering() {
        let address = derive_address(HARDHAT, 0).unwrap();
        assert_eq!(
            address.to_checksum(None),
            "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
        );
    }

    #[test]
    fn test_range_matches_single_derivation() {
        let addresses = derive_addresses(HARDHAT, 0, 3).unwrap();
        assert_eq!(addresses.len(), 3);
        assert_eq!(
            addresses[2],
            address!("0x3C44CdDdB6a900fa2b585dd299e03d12FA4293BC")
        );
        for (offset, address) in addresses.iter().enumerate() {
            let index = u32::try_from(offset).unwrap();
            assert_eq!(*address, derive_address(HARDHAT, index).unwrap());
        }

        let shifted = derive_addresses(HARDHAT, 1, 3).unwrap();
        assert_eq!(shifted, addresses[1..]);
    }

    #[test]
    fn test_range_errors_are_distinct() {
        assert_eq!(
            derive_addresses(HARDHAT, 0, 0),
            Err(HdError::InvalidIndexRange { start: 0, end: 0 })
        );
        assert_eq!(
            derive_addresses(HARDHAT, 5, 2),
            Err(HdError::InvalidIndexRange { start: 5, end: 2 })
        );
        assert!(matches!(
            derive_addresses("test test test", 0, 1),
            Err(HdError::InvalidMnemonic(_))
        ));
    }

    #[test]
    fn test_hardened_index_is_rejected() {
        assert!(matches!(
            derive_address(HARDHAT, 1 << 31),
            Err(HdError::Derivation(_))
        ));
    }

    #[test]
    fn test_parse_mnemonic_normalizes() {
        let messy = "  TEST test test test test test\ttest test test test test   junk ";
        let mnemonic = parse_mnemonic(messy).unwrap();
        assert_eq!(mnemonic.to_string(), HARDHAT);
    }

    #[test]
    fn test_parse_mnemonic_rejects_bad_checksum_and_words() {
        // valid words, wrong checksum word
        assert!(matches!(
            parse_mnemonic(
                "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon"
            ),
            Err(HdError::InvalidMnemonic(_))
        ));
        assert!(matches!(
            parse_mnemonic("test test test test test test test test test test test qwerty"),
            Err(HdError::InvalidMnemonic(_))
        ));
        assert!(matches!(parse_mnemonic(""), Err(HdError::InvalidMnemonic(_))));
    }

    #[test]
    fn test_derive_account_private_key() {
        let account = derive_account(HARDHAT, 0).unwrap();
        assert_eq!(
            encode_private_key(&account.private_key).as_str(),
            "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80"
        );
        assert_eq!(
            address_from_private_key(account.private_key.as_slice()).unwrap(),
            account.address
        );
        assert!(!format!("{account:?}").contains("ac0974"));
    }

    #[test]
    fn test_parse_private_key() {
        let hex_key = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
        let with_prefix = parse_private_key(hex_key).unwrap();
        let without_prefix = parse_private_key(&hex_key[2..]).unwrap();
        assert_eq!(*with_prefix, *without_prefix);
        assert_eq!(
            address_from_private_key(with_prefix.as_slice()).unwrap(),
            address!("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266")
        );

        assert!(matches!(
            parse_private_key("0x1234"),
            Err(HdError::InvalidPrivateKey(_))
        ));
        assert!(matches!(
            parse_private_key("zz"),
            Err(HdError::InvalidPrivateKey(_))
        ));
        assert!(matches!(
            address_from_private_key(&[0u8; PRIVATE_KEY_SIZE]),
            Err(HdError::InvalidPrivateKey(_))
        ));
    }

    #[test]
    fn test_generate_mnemonic() {
        let phrase = generate_mnemonic(DEFAULT_WORD_COUNT).unwrap();
        assert_eq!(phrase.split(' ').count(), 12);
        parse_mnemonic(&phrase).unwrap();

        let long = generate_mnemonic(24).unwrap();
        assert_eq!(long.split(' ').count(), 24);

        assert_ne!(*phrase, *generate_mnemonic(DEFAULT_WORD_COUNT).unwrap());
        assert!(matches!(
            generate_mnemonic(13),
            Err(HdError::InvalidMnemonic(_))
        ));
    }
}
