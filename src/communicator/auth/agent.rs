//! SSH agent authentication.

use async_trait::async_trait;
use russh::{client, keys};
use tracing::{debug, info};

use crate::communicator::credentials::AgentConnection;
use crate::communicator::session::SshClientHandler;

use super::traits::AuthStrategy;

/// SSH agent authentication strategy.
///
/// Uses the agent connection opened during credential collection and tries
/// each identity the agent holds until one succeeds.
pub struct AgentAuth {
    connection: AgentConnection,
}

impl AgentAuth {
    pub fn new(connection: AgentConnection) -> Self {
        Self { connection }
    }

    #[cfg(unix)]
    fn agent_stream(&self) -> Result<tokio::net::UnixStream, String> {
        let stream = self
            .connection
            .try_clone_stream()
            .and_then(|stream| {
                stream.set_nonblocking(true)?;
                Ok(stream)
            })
            .map_err(|e| {
                format!(
                    "Failed to use SSH agent socket {:?}: {}",
                    self.connection.socket(),
                    e
                )
            })?;
        tokio::net::UnixStream::from_std(stream)
            .map_err(|e| format!("Failed to register SSH agent socket: {}", e))
    }
}

#[async_trait]
impl AuthStrategy for AgentAuth {
    #[cfg(unix)]
    async fn authenticate(
        &self,
        handle: &mut client::Handle<SshClientHandler>,
        username: &str,
    ) -> Result<bool, String> {
        let mut agent = keys::agent::client::AgentClient::connect(self.agent_stream()?);

        let identities = agent
            .request_identities()
            .await
            .map_err(|e| format!("Failed to get identities from SSH agent: {}", e))?;

        if identities.is_empty() {
            return Err("No identities found in SSH agent".to_string());
        }

        for identity in identities {
            debug!("Trying SSH agent identity: {:?}", identity.comment());

            let hash_alg = handle
                .best_supported_rsa_hash()
                .await
                .ok()
                .flatten()
                .flatten();

            match handle
                .authenticate_publickey_with(username, identity.clone(), hash_alg, &mut agent)
                .await
            {
                Ok(result) if result.success() => {
                    info!("Successfully authenticated with SSH agent");
                    return Ok(true);
                }
                Ok(_) => debug!("Agent identity not accepted, trying next..."),
                Err(e) => debug!("Agent authentication error: {}, trying next...", e),
            }
        }

        Ok(false)
    }

    #[cfg(not(unix))]
    async fn authenticate(
        &self,
        _handle: &mut client::Handle<SshClientHandler>,
        _username: &str,
    ) -> Result<bool, String> {
        Err("SSH agent sockets are not supported on this platform".to_string())
    }

    fn name(&self) -> &'static str {
        "agent"
    }
}
