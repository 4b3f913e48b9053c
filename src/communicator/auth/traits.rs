//! Authentication strategy trait definition.

use async_trait::async_trait;
use russh::client;

use crate::communicator::session::SshClientHandler;

/// One authentication method run against a connected russh handle.
///
/// Implementations must be thread-safe (`Send + Sync`) for use across
/// async tasks.
#[async_trait]
pub trait AuthStrategy: Send + Sync {
    /// Attempt to authenticate with the SSH server.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - Authentication succeeded
    /// * `Ok(false)` - The server rejected the credentials
    /// * `Err(message)` - Error during the attempt
    async fn authenticate(
        &self,
        handle: &mut client::Handle<SshClientHandler>,
        username: &str,
    ) -> Result<bool, String>;

    /// Name used in logs, matching [`AuthMethod::name`].
    ///
    /// [`AuthMethod::name`]: crate::communicator::methods::AuthMethod::name
    fn name(&self) -> &'static str;
}
