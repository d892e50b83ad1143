//! Lock ownership tokens

use std::fmt::{Display, Formatter};

/// Opaque proof of lock ownership: 128 random bits, hex encoded
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockToken(String);

impl LockToken {
    /// Generate a fresh, unguessable token
    pub fn generate() -> Self {
        let bytes: [u8; 16] = rand::random();
        LockToken(const_hex::encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for LockToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for LockToken {
    fn from(value: String) -> Self {
        LockToken(value)
    }
}

impl AsRef<str> for LockToken {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
