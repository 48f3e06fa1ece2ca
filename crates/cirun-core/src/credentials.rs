use crate::error::{CirunError, Result};
use std::fmt;

/// Tokens for the two backends. Empty or whitespace-only values count as
/// absent.
#[derive(Clone, Default)]
pub struct Credentials {
    github: Option<String>,
    azure: Option<String>,
}

impl Credentials {
    pub fn new(github: Option<String>, azure: Option<String>) -> Self {
        Self {
            github: github.filter(|t| !t.trim().is_empty()),
            azure: azure.filter(|t| !t.trim().is_empty()),
        }
    }

    /// Fails when neither token is present. Token validity is only learned
    /// from the remote API.
    pub fn ensure_any(&self) -> Result<()> {
        if self.github.is_none() && self.azure.is_none() {
            return Err(CirunError::MissingCredential);
        }
        Ok(())
    }

    pub fn github(&self) -> Option<&str> {
        self.github.as_deref()
    }

    pub fn azure(&self) -> Option<&str> {
        self.azure.as_deref()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |t: &Option<String>| t.as_ref().map(|_| "<redacted>");
        f.debug_struct("Credentials")
            .field("github", &redact(&self.github))
            .field("azure", &redact(&self.azure))
            .finish()
    }
}
