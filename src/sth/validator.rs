// src/sth/validator.rs
//! Per-STH checks a well-behaved log must satisfy.
//!
//! Validation is pure: the caller supplies the last accepted STH and the
//! current time, so the same inputs always yield the same verdict.

use sha2::{Digest, Sha256};
use std::time::Duration;
use thiserror::Error;

use super::verify::{LogKey, SignatureError};
use crate::ct_log::types::SignedTreeHead;

/// Why an STH was not accepted
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RejectReason {
    #[error("negative tree size {0}")]
    NegativeTreeSize(i64),

    #[error("root hash is {actual} bytes, expected {expected}")]
    RootHashLength { expected: usize, actual: usize },

    #[error("non-monotonic timestamp: {timestamp} is earlier than last accepted {last_accepted}")]
    NonMonotonicTimestamp { timestamp: u64, last_accepted: u64 },

    #[error("timestamp {timestamp} is {ahead_ms}ms in the future (tolerance {tolerance_ms}ms)")]
    FutureTimestamp {
        timestamp: u64,
        ahead_ms: u64,
        tolerance_ms: u64,
    },

    #[error("malformed signature: {0}")]
    MalformedSignature(String),

    #[error("unsupported signature algorithm (hash {hash}, signature {signature})")]
    UnsupportedSignatureAlgorithm { hash: u8, signature: u8 },

    #[error("signature does not verify under the log's public key")]
    SignatureMismatch,
}

impl RejectReason {
    /// Short stable label, used for metrics and structured logs
    pub fn label(&self) -> &'static str {
        match self {
            RejectReason::NegativeTreeSize(_) => "negative_tree_size",
            RejectReason::RootHashLength { .. } => "root_hash_length",
            RejectReason::NonMonotonicTimestamp { .. } => "non_monotonic_timestamp",
            RejectReason::FutureTimestamp { .. } => "future_timestamp",
            RejectReason::MalformedSignature(_) => "malformed_signature",
            RejectReason::UnsupportedSignatureAlgorithm { .. } => "unsupported_signature_algorithm",
            RejectReason::SignatureMismatch => "signature_mismatch",
        }
    }
}

impl From<SignatureError> for RejectReason {
    fn from(err: SignatureError) -> Self {
        match err {
            SignatureError::Malformed(msg) => RejectReason::MalformedSignature(msg),
            SignatureError::UnsupportedAlgorithm { hash, signature } => {
                RejectReason::UnsupportedSignatureAlgorithm { hash, signature }
            }
            SignatureError::Mismatch => RejectReason::SignatureMismatch,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    Accept,
    Reject(RejectReason),
}

impl ValidationResult {
    pub fn is_accept(&self) -> bool {
        matches!(self, ValidationResult::Accept)
    }
}

/// Validator settings
#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    /// Length of the log's Merkle tree hash
    pub root_hash_len: usize,
    /// How far ahead of local time an STH timestamp may be
    pub max_clock_skew: Duration,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            root_hash_len: Sha256::output_size(),
            max_clock_skew: Duration::from_secs(10),
        }
    }
}

/// Checks STHs of one log against RFC 6962 per-STH requirements
#[derive(Debug, Clone)]
pub struct SthValidator {
    key: LogKey,
    config: ValidatorConfig,
}

impl SthValidator {
    pub fn new(key: LogKey, config: ValidatorConfig) -> Self {
        Self { key, config }
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Validate `sth` given the last STH accepted for the same log and the
    /// current time in milliseconds since the epoch.
    pub fn validate(
        &self,
        sth: &SignedTreeHead,
        last_accepted: Option<&SignedTreeHead>,
        now_ms: u64,
    ) -> ValidationResult {
        match self.check(sth, last_accepted, now_ms) {
            Ok(()) => ValidationResult::Accept,
            Err(reason) => ValidationResult::Reject(reason),
        }
    }

    fn check(
        &self,
        sth: &SignedTreeHead,
        last_accepted: Option<&SignedTreeHead>,
        now_ms: u64,
    ) -> Result<(), RejectReason> {
        if sth.tree_size < 0 {
            return Err(RejectReason::NegativeTreeSize(sth.tree_size));
        }

        if sth.root_hash.len() != self.config.root_hash_len {
            return Err(RejectReason::RootHashLength {
                expected: self.config.root_hash_len,
                actual: sth.root_hash.len(),
            });
        }

        if let Some(last) = last_accepted {
            if sth.timestamp < last.timestamp {
                return Err(RejectReason::NonMonotonicTimestamp {
                    timestamp: sth.timestamp,
                    last_accepted: last.timestamp,
                });
            }
        }

        let tolerance_ms = self.config.max_clock_skew.as_millis() as u64;
        if sth.timestamp > now_ms.saturating_add(tolerance_ms) {
            return Err(RejectReason::FutureTimestamp {
                timestamp: sth.timestamp,
                ahead_ms: sth.timestamp - now_ms,
                tolerance_ms,
            });
        }

        self.key.verify_tree_head(sth)?;

        Ok(())
    }
}
