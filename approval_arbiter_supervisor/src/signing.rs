//! Signing service seam.
//!
//! The engine never retries: a failed `sign` aborts the submission's unit of
//! work and the next run tries again from scratch.

use approval_arbiter_core::{FileId, SubmissionId};
use ed25519_dalek::{Signer as _, SigningKey};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// What the signing service needs to identify the file and its submission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignRequest {
    pub file_id: FileId,
    pub file_hash: String,
    pub submission_id: SubmissionId,
    pub package_slug: String,
    pub version: String,
}

impl SignRequest {
    /// Canonical bytes covered by the signature.
    pub fn payload(&self) -> Vec<u8> {
        format!(
            "{}\n{}\n{}\n{}",
            self.package_slug, self.version, self.submission_id, self.file_hash
        )
        .into_bytes()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedFile {
    pub file_id: FileId,
    pub key_id: String,
    pub signature: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SigningError {
    #[error("signing service rejected file {file_id}: {reason}")]
    Rejected { file_id: FileId, reason: String },

    #[error("signing service unavailable: {0}")]
    Unavailable(String),

    #[error("signing service timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("invalid signing key: {0}")]
    InvalidKey(String),
}

pub trait Signer {
    fn sign(&self, request: &SignRequest) -> Result<SignedFile, SigningError>;
}

/// Local Ed25519 signing backend.
pub struct Ed25519Signer {
    key: SigningKey,
    key_id: String,
}

impl Ed25519Signer {
    pub fn from_seed(seed: [u8; 32]) -> Self {
        let key = SigningKey::from_bytes(&seed);
        let digest = Sha256::digest(key.verifying_key().as_bytes());
        let key_id = hex::encode(&digest[..8]);
        Self { key, key_id }
    }

    /// Parse a 64-character hex seed.
    pub fn from_hex(seed_hex: &str) -> Result<Self, SigningError> {
        let bytes = hex::decode(seed_hex.trim())
            .map_err(|e| SigningError::InvalidKey(e.to_string()))?;
        let seed: [u8; 32] = bytes
            .try_into()
            .map_err(|b: Vec<u8>| SigningError::InvalidKey(format!("expected 32 bytes, got {}", b.len())))?;
        Ok(Self::from_seed(seed))
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn verifying_key(&self) -> ed25519_dalek::VerifyingKey {
        self.key.verifying_key()
    }
}

impl Signer for Ed25519Signer {
    fn sign(&self, request: &SignRequest) -> Result<SignedFile, SigningError> {
        if request.file_hash.is_empty() {
            return Err(SigningError::Rejected {
                file_id: request.file_id,
                reason: "file has no content hash".to_string(),
            });
        }
        let signature = self.key.sign(&request.payload());
        Ok(SignedFile {
            file_id: request.file_id,
            key_id: self.key_id.clone(),
            signature: hex::encode(signature.to_bytes()),
        })
    }
}

#[cfg(test)]
mod tests {
    use ed25519_dalek::{Signature, Verifier};

    use super::*;

    fn request() -> SignRequest {
        SignRequest {
            file_id: 3,
            file_hash: "sha256:abcd".to_string(),
            submission_id: 9,
            package_slug: "tab-sorter".to_string(),
            version: "1.0".to_string(),
        }
    }

    #[test]
    fn signature_verifies() {
        let signer = Ed25519Signer::from_seed([7; 32]);
        let signed = signer.sign(&request()).unwrap();
        assert_eq!(signed.file_id, 3);
        assert_eq!(signed.key_id.len(), 16);

        let bytes: [u8; 64] = hex::decode(&signed.signature).unwrap().try_into().unwrap();
        let sig = Signature::from_bytes(&bytes);
        assert!(signer.verifying_key().verify(&request().payload(), &sig).is_ok());
    }

    #[test]
    fn hex_seed_must_be_32_bytes() {
        assert!(Ed25519Signer::from_hex(&"ab".repeat(32)).is_ok());
        assert!(matches!(
            Ed25519Signer::from_hex("abcd"),
            Err(SigningError::InvalidKey(_))
        ));
        assert!(matches!(
            Ed25519Signer::from_hex("zz"),
            Err(SigningError::InvalidKey(_))
        ));
    }

    #[test]
    fn empty_hash_is_rejected() {
        let mut req = request();
        req.file_hash.clear();
        let err = Ed25519Signer::from_seed([1; 32]).sign(&req).unwrap_err();
        assert!(matches!(err, SigningError::Rejected { file_id: 3, .. }));
    }
}
