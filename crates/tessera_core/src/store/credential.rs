//! Credential gate for protected stores.
//!
//! A store created with a [`Credential`] records a [`CredentialVerifier`] in
//! its store-info entry. The verifier holds a random salt and an HKDF-SHA256
//! digest of the credential, never the credential itself.

use crate::error::{CoreError, CoreResult};
use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of the verifier salt in bytes.
pub const SALT_SIZE: usize = 16;
/// Size of the verifier digest in bytes.
pub const DIGEST_SIZE: usize = 32;

const DERIVATION_INFO: &[u8] = b"tessera-store-credential-v1";

/// Secret supplied when opening a protected store.
///
/// The bytes are zeroized when the credential is dropped and never shown by
/// `Debug`.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Credential {
    secret: Vec<u8>,
}

impl Credential {
    /// Creates a credential from raw bytes.
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Returns the secret bytes.
    ///
    /// # Security
    ///
    /// Do not log or persist the result.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.secret
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

impl From<&str> for Credential {
    fn from(secret: &str) -> Self {
        Self::new(secret.as_bytes())
    }
}

impl From<String> for Credential {
    fn from(secret: String) -> Self {
        Self::new(secret.into_bytes())
    }
}

impl From<&[u8]> for Credential {
    fn from(secret: &[u8]) -> Self {
        Self::new(secret)
    }
}

/// Salted digest that checks a credential without storing it.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialVerifier {
    salt: [u8; SALT_SIZE],
    digest: [u8; DIGEST_SIZE],
}

impl CredentialVerifier {
    /// Creates a verifier for `credential` with a fresh random salt.
    pub fn create(credential: &Credential) -> CoreResult<Self> {
        let mut salt = [0u8; SALT_SIZE];
        rand::thread_rng().fill_bytes(&mut salt);
        let digest = derive(credential, &salt)?;
        Ok(Self { salt, digest })
    }

    /// Rebuilds a verifier from persisted parts.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Corruption`] if either part has the wrong size.
    pub fn from_parts(salt: &[u8], digest: &[u8]) -> CoreResult<Self> {
        let salt = salt
            .try_into()
            .map_err(|_| CoreError::corruption("credential salt has the wrong size"))?;
        let digest = digest
            .try_into()
            .map_err(|_| CoreError::corruption("credential digest has the wrong size"))?;
        Ok(Self { salt, digest })
    }

    /// Returns the salt.
    #[must_use]
    pub fn salt(&self) -> &[u8] {
        &self.salt
    }

    /// Returns the digest.
    #[must_use]
    pub fn digest(&self) -> &[u8] {
        &self.digest
    }

    /// Returns whether `credential` is the one this verifier was made from.
    pub fn verify(&self, credential: &Credential) -> CoreResult<bool> {
        let mut candidate = derive(credential, &self.salt)?;
        let diff = candidate
            .iter()
            .zip(self.digest.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b));
        candidate.zeroize();
        Ok(diff == 0)
    }
}

impl fmt::Debug for CredentialVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialVerifier").finish_non_exhaustive()
    }
}

fn derive(credential: &Credential, salt: &[u8]) -> CoreResult<[u8; DIGEST_SIZE]> {
    let hk = Hkdf::<Sha256>::new(Some(salt), credential.as_bytes());
    let mut out = [0u8; DIGEST_SIZE];
    hk.expand(DERIVATION_INFO, &mut out)
        .map_err(|_| CoreError::authentication("credential derivation failed"))?;
    Ok(out)
}
