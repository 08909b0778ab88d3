// src/ct_log/types.rs
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Label of the RFC 6962 get-sth endpoint, used in audit records
pub const GET_STH_ENDPOINT: &str = "get-sth";

/// Response body of CT log's get-sth endpoint, as it appears on the wire
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetSthResponse {
    pub tree_size: i64,
    pub timestamp: u64,
    pub sha256_root_hash: String,
    #[serde(default)]
    pub tree_head_signature: String,
}

/// A Signed Tree Head with its binary fields decoded.
///
/// Two STHs are the same STH only if all four fields match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SignedTreeHead {
    pub tree_size: i64,
    /// Milliseconds since the epoch
    pub timestamp: u64,
    #[serde(with = "base64_bytes")]
    pub root_hash: Vec<u8>,
    /// TLS-encoded DigitallySigned struct
    #[serde(with = "base64_bytes")]
    pub signature: Vec<u8>,
}

impl SignedTreeHead {
    /// Parse a get-sth response body
    pub fn from_json(body: &[u8]) -> anyhow::Result<Self> {
        let wire: GetSthResponse = serde_json::from_slice(body)?;
        Self::try_from(wire)
    }
}

impl TryFrom<GetSthResponse> for SignedTreeHead {
    type Error = anyhow::Error;

    fn try_from(wire: GetSthResponse) -> anyhow::Result<Self> {
        let root_hash = STANDARD
            .decode(&wire.sha256_root_hash)
            .map_err(|e| anyhow::anyhow!("sha256_root_hash is not valid base64: {}", e))?;
        let signature = STANDARD
            .decode(&wire.tree_head_signature)
            .map_err(|e| anyhow::anyhow!("tree_head_signature is not valid base64: {}", e))?;

        Ok(Self {
            tree_size: wire.tree_size,
            timestamp: wire.timestamp,
            root_hash,
            signature,
        })
    }
}

impl From<&SignedTreeHead> for GetSthResponse {
    fn from(sth: &SignedTreeHead) -> Self {
        Self {
            tree_size: sth.tree_size,
            timestamp: sth.timestamp,
            sha256_root_hash: STANDARD.encode(&sth.root_hash),
            tree_head_signature: STANDARD.encode(&sth.signature),
        }
    }
}

impl fmt::Display for SignedTreeHead {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "STH{{tree_size: {}, timestamp: {}, root_hash: {}}}",
            self.tree_size,
            self.timestamp,
            hex::encode(&self.root_hash)
        )
    }
}

/// Raw reply from a CT log API call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawResponse {
    pub status: u16,
    #[serde(with = "base64_bytes")]
    pub body: Vec<u8>,
    pub elapsed_ms: u64,
    pub received_at: DateTime<Utc>,
}

impl RawResponse {
    pub fn new(status: u16, body: Vec<u8>, elapsed_ms: u64) -> Self {
        Self {
            status,
            body,
            elapsed_ms,
            received_at: Utc::now(),
        }
    }
}

/// Google's CT log list V3 format
#[derive(Debug, Serialize, Deserialize)]
pub struct LogListV3 {
    pub operators: Vec<Operator>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Operator {
    pub name: String,
    #[serde(default)]
    pub logs: Vec<LogInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogInfo {
    #[serde(default)]
    pub description: String,
    pub key: Option<String>,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub state: Option<StateWrapper>,
}

/// State wrapper that can contain different state types
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateWrapper {
    #[serde(default)]
    pub usable: Option<StateTimestamp>,
    #[serde(default)]
    pub readonly: Option<StateTimestamp>,
    #[serde(default)]
    pub qualified: Option<StateTimestamp>,
}

impl StateWrapper {
    /// Log is actively accepting new entries
    pub fn is_usable(&self) -> bool {
        self.usable.is_some() || self.qualified.is_some()
    }

    /// Log is frozen but still serves STHs
    pub fn is_readonly(&self) -> bool {
        self.readonly.is_some()
    }

    pub fn is_acceptable(&self, include_readonly: bool) -> bool {
        self.is_usable() || (include_readonly && self.is_readonly())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTimestamp {
    pub timestamp: String,
}

/// Serde adapter storing binary fields as standard base64 strings
pub(crate) mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(s).map_err(serde::de::Error::custom)
    }
}
