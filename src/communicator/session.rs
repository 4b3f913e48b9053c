//! russh client handler.
//!
//! Host keys are never checked against a known_hosts file: every server key is
//! accepted, similar to `StrictHostKeyChecking=no` in OpenSSH. The accepted key
//! is logged with its fingerprint so a changed key is at least visible.

use russh::{client, keys};
use tracing::warn;

/// Client handler that accepts any host key.
#[derive(Debug, Default)]
pub struct SshClientHandler {
    host: String,
}

impl SshClientHandler {
    pub fn new(host: impl Into<String>) -> Self {
        Self { host: host.into() }
    }
}

impl client::Handler for SshClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &keys::PublicKey,
    ) -> Result<bool, Self::Error> {
        warn!(
            "Accepting {} host key {} for {} without verification",
            server_public_key.algorithm().as_str(),
            server_public_key.fingerprint(keys::HashAlg::Sha256),
            self.host
        );
        Ok(true)
    }
}
