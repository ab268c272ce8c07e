//! Identifier types shared by the ledger and the extension registry

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Account identifier - human-readable name
pub type AccountId = String;

/// Opaque 20-byte handle of a callable extension.
///
/// The all-zero id is reserved as the "absent" sentinel and can never be
/// registered against an account.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ExtensionId([u8; 20]);

impl ExtensionId {
    pub const ZERO: ExtensionId = ExtensionId([0u8; 20]);

    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Derive a deployment address from a nonce and a label
    pub fn derive(nonce: u64, label: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"hook-ledger/extension");
        hasher.update(nonce.to_be_bytes());
        hasher.update(label.as_bytes());
        let digest = hasher.finalize();

        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&digest[..20]);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }
}

impl fmt::Display for ExtensionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for ExtensionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExtensionId({})", self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid extension id: {0}")]
pub struct ParseExtensionIdError(String);

impl FromStr for ExtensionId {
    type Err = ParseExtensionIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let stripped = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(stripped).map_err(|e| ParseExtensionIdError(e.to_string()))?;
        let bytes: [u8; 20] = bytes
            .try_into()
            .map_err(|_| ParseExtensionIdError(format!("expected 20 bytes in {}", s)))?;
        Ok(Self(bytes))
    }
}

impl Serialize for ExtensionId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ExtensionId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Stable 64-bit tag of an account, used where only integers cross a boundary
/// (the wasm extension ABI).
pub fn account_tag(account: &str) -> u64 {
    let digest = Sha256::digest(account.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}
