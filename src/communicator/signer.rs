//! Key signers and signature algorithm pinning.
//!
//! Servers that have disabled the SHA-1 `ssh-rsa` signature scheme reject RSA
//! keys whose signatures are produced with it, and the rejection only shows up at
//! the final signature check of the handshake. [`AlgorithmSigner`] wraps a signer
//! so every signature it produces uses one explicitly chosen algorithm
//! (`rsa-sha2-256` for RSA keys) instead of whatever the key would default to.
//!
//! Choosing the algorithm is a capability: signers that can do it implement
//! [`AlgorithmSelectableSigner`] and advertise it through
//! [`KeySigner::as_algorithm_selectable`]. Wrapping a signer without the
//! capability fails with [`CredentialError::UnsupportedSignerKind`].

use std::fmt;
use std::sync::Arc;

use sha2::{Sha256, Sha512};
use signature::{SignatureEncoding, Signer};
use ssh_key::private::{KeypairData, RsaKeypair};
use ssh_key::{Algorithm, HashAlg, Mpint, PrivateKey, PublicKey, Signature};

use crate::communicator::error::{CredentialError, KeyParseError};
use crate::communicator::keys;

/// Algorithm pinned for RSA keys.
pub const PINNED_RSA_ALGORITHM: Algorithm = Algorithm::Rsa {
    hash: Some(HashAlg::Sha256),
};

/// Something that can sign authentication challenges.
pub trait KeySigner: Send + Sync {
    fn public_key(&self) -> &PublicKey;

    /// Sign with the signer's own default algorithm.
    fn sign(&self, data: &[u8]) -> Result<Signature, CredentialError>;

    /// The algorithm-selection capability, when this signer has it.
    fn as_algorithm_selectable(&self) -> Option<&dyn AlgorithmSelectableSigner> {
        None
    }
}

/// A signer that can produce signatures for an explicitly chosen algorithm.
pub trait AlgorithmSelectableSigner: KeySigner {
    fn sign_with_algorithm(
        &self,
        data: &[u8],
        algorithm: &Algorithm,
    ) -> Result<Signature, CredentialError>;
}

/// Signer backed by a private key parsed into memory.
pub struct PrivateKeySigner {
    key: PrivateKey,
}

impl PrivateKeySigner {
    pub fn new(key: PrivateKey) -> Self {
        Self { key }
    }

    /// Parse key material (OpenSSH or PEM) into a signer.
    pub fn from_pem(pem: &str) -> Result<Self, KeyParseError> {
        keys::parse_private_key(pem).map(Self::new)
    }

    pub fn algorithm(&self) -> Algorithm {
        self.key.algorithm()
    }
}

impl fmt::Debug for PrivateKeySigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKeySigner")
            .field("algorithm", &self.key.algorithm().as_str())
            .field("fingerprint", &self.key.fingerprint(HashAlg::Sha256).to_string())
            .finish()
    }
}

impl KeySigner for PrivateKeySigner {
    fn public_key(&self) -> &PublicKey {
        self.key.public_key()
    }

    /// RSA keys sign with `rsa-sha2-512`, everything else with its only algorithm.
    fn sign(&self, data: &[u8]) -> Result<Signature, CredentialError> {
        match self.key.key_data() {
            KeypairData::Rsa(keypair) => sign_rsa(keypair, HashAlg::Sha512, data),
            _ => self
                .key
                .try_sign(data)
                .map_err(|e| CredentialError::Signing(e.to_string())),
        }
    }

    fn as_algorithm_selectable(&self) -> Option<&dyn AlgorithmSelectableSigner> {
        Some(self)
    }
}

impl AlgorithmSelectableSigner for PrivateKeySigner {
    fn sign_with_algorithm(
        &self,
        data: &[u8],
        algorithm: &Algorithm,
    ) -> Result<Signature, CredentialError> {
        match (self.key.key_data(), algorithm) {
            (KeypairData::Rsa(keypair), Algorithm::Rsa { hash: Some(hash) }) => {
                sign_rsa(keypair, *hash, data)
            }
            (_, requested) if *requested == self.key.algorithm() => self.sign(data),
            _ => Err(unsupported_algorithm(&self.key.algorithm(), algorithm)),
        }
    }
}

fn sign_rsa(keypair: &RsaKeypair, hash: HashAlg, data: &[u8]) -> Result<Signature, CredentialError> {
    let private_key = rsa_private_key(keypair)?;

    let raw = match hash {
        HashAlg::Sha256 => rsa::pkcs1v15::SigningKey::<Sha256>::new(private_key).try_sign(data),
        HashAlg::Sha512 => rsa::pkcs1v15::SigningKey::<Sha512>::new(private_key).try_sign(data),
        _ => {
            return Err(unsupported_algorithm(
                &Algorithm::Rsa { hash: None },
                &Algorithm::Rsa { hash: Some(hash) },
            ));
        }
    }
    .map_err(|e| CredentialError::Signing(e.to_string()))?;

    Signature::new(Algorithm::Rsa { hash: Some(hash) }, raw.to_vec())
        .map_err(|e| CredentialError::Signing(e.to_string()))
}

/// Rebuild the `rsa` key from both OpenSSH primes.
fn rsa_private_key(keypair: &RsaKeypair) -> Result<rsa::RsaPrivateKey, CredentialError> {
    let uint = |mpint: &Mpint| {
        rsa::BigUint::try_from(mpint).map_err(|e| CredentialError::Signing(e.to_string()))
    };

    rsa::RsaPrivateKey::from_components(
        uint(&keypair.public.n)?,
        uint(&keypair.public.e)?,
        uint(&keypair.private.d)?,
        vec![uint(&keypair.private.p)?, uint(&keypair.private.q)?],
    )
    .map_err(|e| CredentialError::Signing(e.to_string()))
}

fn unsupported_algorithm(key: &Algorithm, requested: &Algorithm) -> CredentialError {
    CredentialError::UnsupportedAlgorithm {
        key_type: key.as_str().to_string(),
        algorithm: requested.as_str().to_string(),
    }
}

/// Signer whose signatures always use one pinned algorithm.
///
/// The public key is the wrapped signer's; only signing is intercepted.
#[derive(Clone)]
pub struct AlgorithmSigner {
    inner: Arc<dyn KeySigner>,
    algorithm: Algorithm,
}

impl AlgorithmSigner {
    /// Wrap `signer` so it signs with `algorithm`.
    ///
    /// Fails with [`CredentialError::UnsupportedSignerKind`] when the signer
    /// cannot choose its algorithm. There is no fallback to the default algorithm.
    pub fn wrap(signer: Arc<dyn KeySigner>, algorithm: Algorithm) -> Result<Self, CredentialError> {
        if signer.as_algorithm_selectable().is_none() {
            return Err(CredentialError::UnsupportedSignerKind {
                key_type: signer.public_key().algorithm().as_str().to_string(),
            });
        }

        Ok(Self {
            inner: signer,
            algorithm,
        })
    }

    pub fn algorithm(&self) -> &Algorithm {
        &self.algorithm
    }

    /// RSA hash of the pinned algorithm, `None` for other key types.
    pub fn hash_alg(&self) -> Option<HashAlg> {
        match self.algorithm {
            Algorithm::Rsa { hash } => hash,
            _ => None,
        }
    }
}

impl fmt::Debug for AlgorithmSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlgorithmSigner")
            .field("algorithm", &self.algorithm.as_str())
            .field(
                "fingerprint",
                &self.inner.public_key().fingerprint(HashAlg::Sha256).to_string(),
            )
            .finish()
    }
}

impl KeySigner for AlgorithmSigner {
    fn public_key(&self) -> &PublicKey {
        self.inner.public_key()
    }

    fn sign(&self, data: &[u8]) -> Result<Signature, CredentialError> {
        match self.inner.as_algorithm_selectable() {
            Some(signer) => signer.sign_with_algorithm(data, &self.algorithm),
            None => Err(CredentialError::UnsupportedSignerKind {
                key_type: self.inner.public_key().algorithm().as_str().to_string(),
            }),
        }
    }
}

/// Algorithm to pin for a key: `rsa-sha2-256` for RSA, the key's own otherwise.
pub fn pinned_algorithm(public_key: &PublicKey) -> Algorithm {
    match public_key.algorithm() {
        Algorithm::Rsa { .. } => PINNED_RSA_ALGORITHM,
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use signature::Verifier;

    use crate::communicator::test_support::fixture_contents;

    /// Signer without the algorithm-selection capability, like an agent key.
    struct FixedSigner {
        key: PrivateKey,
    }

    impl KeySigner for FixedSigner {
        fn public_key(&self) -> &PublicKey {
            self.key.public_key()
        }

        fn sign(&self, data: &[u8]) -> Result<Signature, CredentialError> {
            self.key
                .try_sign(data)
                .map_err(|e| CredentialError::Signing(e.to_string()))
        }
    }

    fn rsa_signer() -> Arc<PrivateKeySigner> {
        Arc::new(PrivateKeySigner::from_pem(&fixture_contents("id_rsa")).unwrap())
    }

    fn ed25519_signer() -> Arc<PrivateKeySigner> {
        Arc::new(PrivateKeySigner::from_pem(&fixture_contents("id_ed25519")).unwrap())
    }

    mod wrap {
        use super::*;

        #[test]
        fn test_rsa_signature_uses_pinned_algorithm() {
            let signer = rsa_signer();
            let wrapped = AlgorithmSigner::wrap(signer.clone(), PINNED_RSA_ALGORITHM).unwrap();

            let data = b"session-id and userauth request";
            let signature = wrapped.sign(data).unwrap();

            assert_eq!(signature.algorithm(), PINNED_RSA_ALGORITHM);
            assert_eq!(signature.algorithm().as_str(), "rsa-sha2-256");
            assert!(Verifier::verify(wrapped.public_key(), data, &signature).is_ok());
        }

        #[test]
        fn test_pinned_algorithm_differs_from_native_default() {
            let signer = rsa_signer();
            let data = b"challenge";

            let native = signer.sign(data).unwrap();
            let wrapped = AlgorithmSigner::wrap(signer, PINNED_RSA_ALGORITHM).unwrap();
            let pinned = wrapped.sign(data).unwrap();

            assert_ne!(native.algorithm(), pinned.algorithm());
        }

        #[test]
        fn test_public_key_identity_is_unchanged() {
            let signer = rsa_signer();
            let wrapped = AlgorithmSigner::wrap(signer.clone(), PINNED_RSA_ALGORITHM).unwrap();
            assert_eq!(wrapped.public_key(), signer.public_key());
        }

        #[test]
        fn test_pkcs1_rsa_key_signs_with_pinned_algorithm() {
            let signer = Arc::new(PrivateKeySigner::from_pem(&fixture_contents("id_rsa_pem")).unwrap());
            let wrapped = AlgorithmSigner::wrap(signer, PINNED_RSA_ALGORITHM).unwrap();
            let signature = wrapped.sign(b"data").unwrap();
            assert_eq!(signature.algorithm(), PINNED_RSA_ALGORITHM);
            assert!(Verifier::verify(wrapped.public_key(), b"data", &signature).is_ok());
        }

        #[test]
        fn test_rsa_sha512_can_be_pinned() {
            let algorithm = Algorithm::Rsa {
                hash: Some(HashAlg::Sha512),
            };
            let wrapped = AlgorithmSigner::wrap(rsa_signer(), algorithm.clone()).unwrap();
            let signature = wrapped.sign(b"data").unwrap();
            assert_eq!(signature.algorithm(), algorithm);
            assert!(Verifier::verify(wrapped.public_key(), b"data", &signature).is_ok());
            assert_eq!(wrapped.hash_alg(), Some(HashAlg::Sha512));
        }

        #[test]
        fn test_signer_without_capability_is_rejected() {
            let key = PrivateKey::from_openssh(fixture_contents("id_ed25519")).unwrap();
            let signer: Arc<dyn KeySigner> = Arc::new(FixedSigner { key });

            let err = AlgorithmSigner::wrap(signer, PINNED_RSA_ALGORITHM).unwrap_err();
            assert!(matches!(err, CredentialError::UnsupportedSignerKind { .. }));
        }

        #[test]
        fn test_ed25519_with_own_algorithm() {
            let signer = ed25519_signer();
            let wrapped = AlgorithmSigner::wrap(signer, Algorithm::Ed25519).unwrap();
            let signature = wrapped.sign(b"data").unwrap();
            assert_eq!(signature.algorithm(), Algorithm::Ed25519);
            assert!(Verifier::verify(wrapped.public_key(), b"data", &signature).is_ok());
            assert_eq!(wrapped.hash_alg(), None);
        }

        #[test]
        fn test_ed25519_cannot_sign_as_rsa() {
            let wrapped = AlgorithmSigner::wrap(ed25519_signer(), PINNED_RSA_ALGORITHM).unwrap();
            let err = wrapped.sign(b"data").unwrap_err();
            assert!(matches!(err, CredentialError::UnsupportedAlgorithm { .. }));
        }

        #[test]
        fn test_native_rsa_signature_verifies() {
            let signer = rsa_signer();
            let signature = signer.sign(b"data").unwrap();
            assert_eq!(signature.algorithm().as_str(), "rsa-sha2-512");
            assert!(Verifier::verify(signer.public_key(), b"data", &signature).is_ok());
        }

        #[test]
        fn test_tampered_data_fails_verification() {
            let wrapped = AlgorithmSigner::wrap(rsa_signer(), PINNED_RSA_ALGORITHM).unwrap();
            let signature = wrapped.sign(b"data").unwrap();
            assert!(Verifier::verify(wrapped.public_key(), b"other", &signature).is_err());
        }

        #[test]
        fn test_ecdsa_with_own_algorithm() {
            let signer =
                Arc::new(PrivateKeySigner::from_pem(&fixture_contents("id_ecdsa_p256_sec1")).unwrap());
            let algorithm = pinned_algorithm(signer.public_key());
            let wrapped = AlgorithmSigner::wrap(signer, algorithm.clone()).unwrap();
            let signature = wrapped.sign(b"data").unwrap();
            assert_eq!(signature.algorithm(), algorithm);
            assert!(Verifier::verify(wrapped.public_key(), b"data", &signature).is_ok());
        }
    }

    mod pinning {
        use super::*;

        #[test]
        fn test_rsa_keys_pin_sha256() {
            assert_eq!(pinned_algorithm(rsa_signer().public_key()), PINNED_RSA_ALGORITHM);
        }

        #[test]
        fn test_other_keys_keep_native_algorithm() {
            assert_eq!(
                pinned_algorithm(ed25519_signer().public_key()),
                Algorithm::Ed25519
            );
        }
    }

    #[test]
    fn test_debug_does_not_print_key_material() {
        let signer = rsa_signer();
        let rendered = format!("{:?}", signer);
        assert!(rendered.contains("SHA256:"));
        assert!(!rendered.contains("PRIVATE KEY"));
    }
}
