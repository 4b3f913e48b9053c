//! Public key authentication with a pinned signature algorithm.
//!
//! The key never leaves the [`AlgorithmSigner`]: russh sends the userauth
//! request for the public key and hands the data to sign back through its
//! [`Signer`] hook, which the adapter answers with its pinned algorithm.

use std::future::Future;

use async_trait::async_trait;
use russh::{CryptoVec, Signer, client, keys};
use ssh_key::Signature;
use tracing::debug;

use crate::communicator::error::SignRequestError;
use crate::communicator::session::SshClientHandler;
use crate::communicator::signer::{AlgorithmSigner, KeySigner};

use super::traits::AuthStrategy;

/// Public key strategy for an [`AlgorithmSigner`].
///
/// RSA keys are offered with the signer's pinned hash instead of whatever the
/// server advertises as best supported.
pub struct KeyAuth {
    signer: AlgorithmSigner,
}

impl KeyAuth {
    pub fn new(signer: AlgorithmSigner) -> Self {
        Self { signer }
    }

    /// The signer's public key in russh's key type.
    fn transport_public_key(&self) -> Result<keys::PublicKey, String> {
        let openssh = self
            .signer
            .public_key()
            .to_openssh()
            .map_err(|e| format!("Failed to encode public key: {}", e))?;
        keys::PublicKey::from_openssh(&openssh)
            .map_err(|e| format!("Failed to load public key: {}", e))
    }

    fn hash_alg(&self) -> Option<keys::HashAlg> {
        match self.signer.hash_alg() {
            Some(ssh_key::HashAlg::Sha256) => Some(keys::HashAlg::Sha256),
            Some(ssh_key::HashAlg::Sha512) => Some(keys::HashAlg::Sha512),
            _ => None,
        }
    }
}

#[async_trait]
impl AuthStrategy for KeyAuth {
    async fn authenticate(
        &self,
        handle: &mut client::Handle<SshClientHandler>,
        username: &str,
    ) -> Result<bool, String> {
        let key = self.transport_public_key()?;
        debug!(
            "Offering {} key with signature algorithm {}",
            key.algorithm().as_str(),
            self.signer.algorithm().as_str()
        );

        let mut signer = self.signer.clone();
        let result = handle
            .authenticate_publickey_with(username, key, self.hash_alg(), &mut signer)
            .await
            .map_err(|e| format!("Key authentication failed: {}", e))?;

        Ok(result.success())
    }

    fn name(&self) -> &'static str {
        "publickey"
    }
}

/// Answers russh sign requests with the pinned algorithm.
///
/// The requested hash is ignored: the request was built from the pinned one.
impl Signer for AlgorithmSigner {
    type Error = SignRequestError;

    fn auth_publickey_sign(
        &mut self,
        _key: &keys::PublicKey,
        _hash_alg: Option<keys::HashAlg>,
        mut to_sign: CryptoVec,
    ) -> impl Future<Output = Result<CryptoVec, Self::Error>> + Send {
        let signed = KeySigner::sign(self, &to_sign)
            .map(|signature| {
                append_signature(&mut to_sign, &signature);
                to_sign
            })
            .map_err(SignRequestError::from);
        std::future::ready(signed)
    }
}

/// Append `string(string(algorithm) || string(signature))` as the wire format expects.
fn append_signature(data: &mut CryptoVec, signature: &Signature) {
    let algorithm = signature.algorithm();
    let name = algorithm.as_str().as_bytes();
    let blob = signature.as_bytes();

    data.extend(&wire_len(8 + name.len() + blob.len()));
    data.extend(&wire_len(name.len()));
    data.extend(name);
    data.extend(&wire_len(blob.len()));
    data.extend(blob);
}

fn wire_len(len: usize) -> [u8; 4] {
    (len as u32).to_be_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use signature::Verifier;
    use ssh_key::Algorithm;

    use crate::communicator::error::CredentialError;
    use crate::communicator::signer::{PINNED_RSA_ALGORITHM, PrivateKeySigner};
    use crate::communicator::test_support::fixture_contents;

    fn key_auth(fixture: &str, algorithm: Algorithm) -> KeyAuth {
        let signer = PrivateKeySigner::from_pem(&fixture_contents(fixture)).unwrap();
        KeyAuth::new(AlgorithmSigner::wrap(Arc::new(signer), algorithm).unwrap())
    }

    /// Split the appended `string(string(name) || string(blob))` back apart.
    fn read_signature(appended: &[u8]) -> (String, Vec<u8>) {
        let read_len = |bytes: &[u8]| u32::from_be_bytes(bytes[..4].try_into().unwrap()) as usize;

        let outer = read_len(appended);
        assert_eq!(outer + 4, appended.len());

        let inner = &appended[4..];
        let name_len = read_len(inner);
        let name = String::from_utf8(inner[4..4 + name_len].to_vec()).unwrap();
        let rest = &inner[4 + name_len..];
        let blob_len = read_len(rest);
        assert_eq!(blob_len + 4, rest.len());

        (name, rest[4..].to_vec())
    }

    async fn sign_request(auth: &KeyAuth, request: &[u8]) -> Result<CryptoVec, SignRequestError> {
        let key = auth.transport_public_key().unwrap();
        let mut signer = auth.signer.clone();
        signer
            .auth_publickey_sign(&key, auth.hash_alg(), CryptoVec::from_slice(request))
            .await
    }

    #[test]
    fn test_key_auth_name() {
        assert_eq!(key_auth("id_ed25519", Algorithm::Ed25519).name(), "publickey");
    }

    #[test]
    fn test_rsa_key_uses_pinned_hash() {
        let auth = key_auth("id_rsa", PINNED_RSA_ALGORITHM);
        assert_eq!(auth.hash_alg(), Some(keys::HashAlg::Sha256));
    }

    #[test]
    fn test_ed25519_has_no_hash() {
        let auth = key_auth("id_ed25519", Algorithm::Ed25519);
        assert_eq!(auth.hash_alg(), None);
    }

    #[test]
    fn test_transport_public_key_matches_signer() {
        let auth = key_auth("id_rsa_pem", PINNED_RSA_ALGORITHM);
        let key = auth.transport_public_key().unwrap();
        assert_eq!(
            key.to_openssh().unwrap(),
            auth.signer.public_key().to_openssh().unwrap()
        );
    }

    mod sign_requests {
        use super::*;

        #[tokio::test]
        async fn test_rsa_request_is_signed_with_pinned_algorithm() {
            let auth = key_auth("id_rsa", PINNED_RSA_ALGORITHM);
            let request = b"session id and userauth request".to_vec();

            let signed = sign_request(&auth, &request).await.unwrap();
            assert_eq!(&signed[..request.len()], &request[..]);

            let (name, blob) = read_signature(&signed[request.len()..]);
            assert_eq!(name, "rsa-sha2-256");

            let signature = Signature::new(PINNED_RSA_ALGORITHM, blob).unwrap();
            assert!(Verifier::verify(auth.signer.public_key(), &request, &signature).is_ok());
        }

        #[tokio::test]
        async fn test_ed25519_request_is_signed() {
            let auth = key_auth("id_ed25519", Algorithm::Ed25519);
            let request = b"challenge".to_vec();

            let signed = sign_request(&auth, &request).await.unwrap();
            let (name, blob) = read_signature(&signed[request.len()..]);
            assert_eq!(name, "ssh-ed25519");

            let signature = Signature::new(Algorithm::Ed25519, blob).unwrap();
            assert!(Verifier::verify(auth.signer.public_key(), &request, &signature).is_ok());
        }

        #[tokio::test]
        async fn test_signing_failure_is_reported() {
            let auth = key_auth("id_ed25519", PINNED_RSA_ALGORITHM);
            let err = sign_request(&auth, b"challenge").await.unwrap_err();
            assert!(matches!(
                err,
                SignRequestError::Credential(CredentialError::UnsupportedAlgorithm { .. })
            ));
        }
    }
}
