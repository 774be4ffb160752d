//! Secure memory handling for passphrases
//!
//! `SecureString` wipes its contents on drop so a backup passphrase does not
//! linger in memory after the archive has been sealed or opened.

use std::fmt;
use std::ops::Deref;

use zeroize::{Zeroize, ZeroizeOnDrop};

/// A string type that zeros its contents on drop
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecureString {
    inner: String,
}

impl SecureString {
    pub fn new(s: impl Into<String>) -> Self {
        Self { inner: s.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.inner
    }
}

impl Deref for SecureString {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl From<String> for SecureString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for SecureString {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

// Don't print the contents in Debug output
impl fmt::Debug for SecureString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecureString")
            .field("len", &self.inner.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secure_string_contents() {
        let s = SecureString::new("correct horse");
        assert_eq!(s.as_str(), "correct horse");
        assert_eq!(s.len(), 13);
    }

    #[test]
    fn test_secure_string_from() {
        let a: SecureString = String::from("pass").into();
        let b: SecureString = "pass".into();
        assert_eq!(a.as_str(), b.as_str());
    }

    #[test]
    fn test_debug_redacted() {
        let s = SecureString::new("secret_password");
        let debug = format!("{:?}", s);
        assert!(!debug.contains("secret_password"));
        assert!(debug.contains("len"));
    }

    #[test]
    fn test_zeroize_clears() {
        let mut s = SecureString::new("secret");
        s.zeroize();
        assert!(s.is_empty());
    }
}
