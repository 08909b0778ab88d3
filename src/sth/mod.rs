// src/sth/mod.rs
pub mod getter;
pub mod pipeline;
pub mod validator;
pub mod verify;

pub use getter::SthGetter;
pub use pipeline::{CycleError, CycleOutcome, Stage, SthPipeline};
pub use validator::{RejectReason, SthValidator, ValidationResult, ValidatorConfig};
pub use verify::LogKey;

#[cfg(test)]
pub(crate) mod test_support {
    use async_trait::async_trait;
    use ed25519_dalek::Signer as _;
    use sha2::{Digest, Sha256};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::verify::{DigitallySigned, HASH_INTRINSIC, LogKey, SIG_ED25519, tree_head_signature_input};
    use crate::ct_log::client::{FetchError, SthFetcher};
    use crate::ct_log::types::{GetSthResponse, RawResponse, SignedTreeHead};

    /// 2023-11-14T22:13:20Z
    pub const NOW_MS: u64 = 1_700_000_000_000;

    /// A fake log holding an Ed25519 signing key
    pub struct TestLog {
        signing: ed25519_dalek::SigningKey,
    }

    impl TestLog {
        pub fn new() -> Self {
            Self::with_seed([7u8; 32])
        }

        pub fn with_seed(seed: [u8; 32]) -> Self {
            Self {
                signing: ed25519_dalek::SigningKey::from_bytes(&seed),
            }
        }

        pub fn key(&self) -> LogKey {
            LogKey::Ed25519(self.signing.verifying_key())
        }

        pub fn sign(&self, tree_size: u64, timestamp: u64) -> SignedTreeHead {
            let root_hash = Sha256::digest(tree_size.to_be_bytes()).to_vec();
            let input = tree_head_signature_input(timestamp, tree_size, &root_hash);
            let signed = DigitallySigned {
                hash_algorithm: HASH_INTRINSIC,
                signature_algorithm: SIG_ED25519,
                signature: self.signing.sign(&input).to_bytes().to_vec(),
            };

            SignedTreeHead {
                tree_size: tree_size as i64,
                timestamp,
                root_hash,
                signature: signed.to_bytes(),
            }
        }
    }

    pub fn ok_response(sth: &SignedTreeHead) -> RawResponse {
        let body = serde_json::to_vec(&GetSthResponse::from(sth)).unwrap();
        RawResponse::new(200, body, 5)
    }

    /// Fetcher that replays a fixed script of results, then fails
    pub struct ScriptedFetcher {
        script: Mutex<VecDeque<Result<RawResponse, FetchError>>>,
    }

    impl ScriptedFetcher {
        pub fn new(script: Vec<Result<RawResponse, FetchError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
            }
        }
    }

    #[async_trait]
    impl SthFetcher for ScriptedFetcher {
        async fn get_sth(&self) -> Result<RawResponse, FetchError> {
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(FetchError::Transport("script exhausted".to_string())))
        }
    }
}
