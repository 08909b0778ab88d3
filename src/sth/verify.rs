// src/sth/verify.rs
//! Tree head signature verification (RFC 6962 section 3.5)

use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use thiserror::Error;

use crate::ct_log::types::SignedTreeHead;

/// TLS HashAlgorithm.sha256
pub const HASH_SHA256: u8 = 4;
/// TLS HashAlgorithm value paired with Ed25519 (intrinsic hashing)
pub const HASH_INTRINSIC: u8 = 8;
/// TLS SignatureAlgorithm.ecdsa
pub const SIG_ECDSA: u8 = 3;
/// TLS SignatureAlgorithm.ed25519
pub const SIG_ED25519: u8 = 7;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("malformed DigitallySigned: {0}")]
    Malformed(String),

    #[error("signature algorithm ({hash}, {signature}) does not match the log key")]
    UnsupportedAlgorithm { hash: u8, signature: u8 },

    #[error("signature does not verify under the log key")]
    Mismatch,
}

/// TLS `DigitallySigned` structure carried in `tree_head_signature`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigitallySigned {
    pub hash_algorithm: u8,
    pub signature_algorithm: u8,
    pub signature: Vec<u8>,
}

impl DigitallySigned {
    pub fn parse(bytes: &[u8]) -> Result<Self, SignatureError> {
        if bytes.len() < 4 {
            return Err(SignatureError::Malformed(format!(
                "{} bytes is shorter than the 4-byte header",
                bytes.len()
            )));
        }

        let len = u16::from_be_bytes([bytes[2], bytes[3]]) as usize;
        let signature = &bytes[4..];
        if signature.len() != len {
            return Err(SignatureError::Malformed(format!(
                "declared signature length {} but {} bytes follow",
                len,
                signature.len()
            )));
        }

        Ok(Self {
            hash_algorithm: bytes[0],
            signature_algorithm: bytes[1],
            signature: signature.to_vec(),
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.signature.len());
        out.push(self.hash_algorithm);
        out.push(self.signature_algorithm);
        out.extend_from_slice(&(self.signature.len() as u16).to_be_bytes());
        out.extend_from_slice(&self.signature);
        out
    }
}

/// Bytes a log signs for a v1 tree head
pub fn tree_head_signature_input(timestamp: u64, tree_size: u64, root_hash: &[u8]) -> Vec<u8> {
    let mut input = Vec::with_capacity(18 + root_hash.len());
    input.push(0); // version: v1
    input.push(1); // signature_type: tree_hash
    input.extend_from_slice(&timestamp.to_be_bytes());
    input.extend_from_slice(&tree_size.to_be_bytes());
    input.extend_from_slice(root_hash);
    input
}

/// Public key of a CT log
#[derive(Debug, Clone)]
pub enum LogKey {
    EcdsaP256(p256::ecdsa::VerifyingKey),
    Ed25519(ed25519_dalek::VerifyingKey),
}

impl LogKey {
    /// Decode a base64 DER SubjectPublicKeyInfo, as published in log lists
    pub fn from_base64_der(encoded: &str) -> Result<Self> {
        let der = STANDARD
            .decode(encoded.trim())
            .context("Log key is not valid base64")?;
        Self::from_der(&der)
    }

    pub fn from_der(der: &[u8]) -> Result<Self> {
        use ed25519_dalek::pkcs8::DecodePublicKey as _;
        use p256::pkcs8::DecodePublicKey as _;

        if let Ok(key) = p256::ecdsa::VerifyingKey::from_public_key_der(der) {
            return Ok(LogKey::EcdsaP256(key));
        }
        if let Ok(key) = ed25519_dalek::VerifyingKey::from_public_key_der(der) {
            return Ok(LogKey::Ed25519(key));
        }

        anyhow::bail!("Log key is neither an ECDSA P-256 nor an Ed25519 public key")
    }

    pub fn algorithm(&self) -> &'static str {
        match self {
            LogKey::EcdsaP256(_) => "ecdsa-p256-sha256",
            LogKey::Ed25519(_) => "ed25519",
        }
    }

    /// Verify the tree head signature of an STH with a non-negative tree size
    pub fn verify_tree_head(&self, sth: &SignedTreeHead) -> Result<(), SignatureError> {
        let signed = DigitallySigned::parse(&sth.signature)?;
        let tree_size = u64::try_from(sth.tree_size)
            .map_err(|_| SignatureError::Malformed("negative tree size".to_string()))?;
        let input = tree_head_signature_input(sth.timestamp, tree_size, &sth.root_hash);

        match self {
            LogKey::EcdsaP256(key) => {
                use p256::ecdsa::signature::Verifier as _;

                if (signed.hash_algorithm, signed.signature_algorithm) != (HASH_SHA256, SIG_ECDSA) {
                    return Err(SignatureError::UnsupportedAlgorithm {
                        hash: signed.hash_algorithm,
                        signature: signed.signature_algorithm,
                    });
                }
                let signature = p256::ecdsa::Signature::from_der(&signed.signature)
                    .map_err(|e| SignatureError::Malformed(format!("bad ECDSA signature: {}", e)))?;
                key.verify(&input, &signature)
                    .map_err(|_| SignatureError::Mismatch)
            }
            LogKey::Ed25519(key) => {
                use ed25519_dalek::Verifier as _;

                if (signed.hash_algorithm, signed.signature_algorithm) != (HASH_INTRINSIC, SIG_ED25519) {
                    return Err(SignatureError::UnsupportedAlgorithm {
                        hash: signed.hash_algorithm,
                        signature: signed.signature_algorithm,
                    });
                }
                let signature = ed25519_dalek::Signature::from_slice(&signed.signature)
                    .map_err(|e| SignatureError::Malformed(format!("bad Ed25519 signature: {}", e)))?;
                key.verify(&input, &signature)
                    .map_err(|_| SignatureError::Mismatch)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::pkcs8::EncodePublicKey as _;
    use p256::ecdsa::signature::Signer as _;

    fn p256_signing_key() -> p256::ecdsa::SigningKey {
        p256::ecdsa::SigningKey::from_slice(&[0x42; 32]).unwrap()
    }

    fn p256_sth(key: &p256::ecdsa::SigningKey) -> SignedTreeHead {
        let root_hash = vec![0xab; 32];
        let input = tree_head_signature_input(1_700_000_000_000, 100, &root_hash);
        let sig: p256::ecdsa::Signature = key.sign(&input);
        let signed = DigitallySigned {
            hash_algorithm: HASH_SHA256,
            signature_algorithm: SIG_ECDSA,
            signature: sig.to_der().as_bytes().to_vec(),
        };

        SignedTreeHead {
            tree_size: 100,
            timestamp: 1_700_000_000_000,
            root_hash,
            signature: signed.to_bytes(),
        }
    }

    #[test]
    fn test_signature_input_layout() {
        let input = tree_head_signature_input(0x0102, 0x0304, &[9u8; 32]);
        assert_eq!(input.len(), 2 + 8 + 8 + 32);
        assert_eq!(&input[..2], &[0, 1]);
        assert_eq!(&input[2..10], &0x0102u64.to_be_bytes());
        assert_eq!(&input[10..18], &0x0304u64.to_be_bytes());
    }

    #[test]
    fn test_digitally_signed_parse() {
        let signed = DigitallySigned::parse(&[4, 3, 0, 2, 0xaa, 0xbb]).unwrap();
        assert_eq!(signed.hash_algorithm, 4);
        assert_eq!(signed.signature_algorithm, 3);
        assert_eq!(signed.signature, vec![0xaa, 0xbb]);
        assert_eq!(signed.to_bytes(), vec![4, 3, 0, 2, 0xaa, 0xbb]);
    }

    #[test]
    fn test_digitally_signed_length_mismatch() {
        assert!(matches!(
            DigitallySigned::parse(&[4, 3, 0, 5, 0xaa]),
            Err(SignatureError::Malformed(_))
        ));
        assert!(matches!(
            DigitallySigned::parse(&[4, 3]),
            Err(SignatureError::Malformed(_))
        ));
    }

    #[test]
    fn test_p256_verify() {
        let signing = p256_signing_key();
        let key = LogKey::EcdsaP256(*signing.verifying_key());
        let sth = p256_sth(&signing);

        assert_eq!(key.verify_tree_head(&sth), Ok(()));
    }

    #[test]
    fn test_p256_tampered_tree_size() {
        let signing = p256_signing_key();
        let key = LogKey::EcdsaP256(*signing.verifying_key());
        let mut sth = p256_sth(&signing);
        sth.tree_size = 101;

        assert_eq!(key.verify_tree_head(&sth), Err(SignatureError::Mismatch));
    }

    #[test]
    fn test_algorithm_mismatch() {
        let signing = ed25519_dalek::SigningKey::from_bytes(&[7u8; 32]);
        let key = LogKey::Ed25519(signing.verifying_key());
        let sth = p256_sth(&p256_signing_key());

        assert_eq!(
            key.verify_tree_head(&sth),
            Err(SignatureError::UnsupportedAlgorithm { hash: HASH_SHA256, signature: SIG_ECDSA })
        );
    }

    #[test]
    fn test_ed25519_key_from_der() {
        let signing = ed25519_dalek::SigningKey::from_bytes(&[7u8; 32]);
        let der = signing.verifying_key().to_public_key_der().unwrap();
        let encoded = STANDARD.encode(der.as_bytes());

        let key = LogKey::from_base64_der(&encoded).unwrap();
        assert_eq!(key.algorithm(), "ed25519");
    }

    #[test]
    fn test_p256_key_from_der() {
        use p256::pkcs8::EncodePublicKey as _;

        let der = p256_signing_key().verifying_key().to_public_key_der().unwrap();
        let key = LogKey::from_der(der.as_bytes()).unwrap();
        assert_eq!(key.algorithm(), "ecdsa-p256-sha256");
    }

    #[test]
    fn test_garbage_key_rejected() {
        assert!(LogKey::from_base64_der("AAAA").is_err());
        assert!(LogKey::from_base64_der("not base64!").is_err());
    }
}
