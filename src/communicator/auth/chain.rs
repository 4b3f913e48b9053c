//! Authentication chain for trying multiple strategies.

use async_trait::async_trait;
use russh::client;
use tracing::debug;

use crate::communicator::methods::AuthMethod;
use crate::communicator::session::SshClientHandler;

use super::traits::AuthStrategy;
use super::{AgentAuth, KeyAuth, KeyboardInteractiveAuth, PasswordAuth};

/// Authentication chain that tries multiple strategies in order.
///
/// The first successful authentication stops the chain and returns success.
pub struct AuthChain {
    strategies: Vec<Box<dyn AuthStrategy>>,
}

impl AuthChain {
    /// Create a new empty authentication chain.
    pub fn new() -> Self {
        Self {
            strategies: Vec::new(),
        }
    }

    /// Build a chain running `methods` in the order given.
    pub fn from_methods(methods: Vec<AuthMethod>) -> Self {
        methods.into_iter().fold(Self::new(), Self::with_method)
    }

    /// Append the strategy for one method.
    pub fn with_method(self, method: AuthMethod) -> Self {
        match method {
            AuthMethod::Agent(connection) => self.with_strategy(AgentAuth::new(connection)),
            AuthMethod::PublicKey(signer) => self.with_strategy(KeyAuth::new(signer)),
            AuthMethod::Password(password) => self.with_strategy(PasswordAuth::new(password)),
            AuthMethod::KeyboardInteractive(password) => {
                self.with_strategy(KeyboardInteractiveAuth::new(password))
            }
        }
    }

    /// Append any strategy.
    pub fn with_strategy(mut self, strategy: impl AuthStrategy + 'static) -> Self {
        self.strategies.push(Box::new(strategy));
        self
    }

    /// Check if the chain has any authentication strategies.
    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Get the number of strategies in the chain.
    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    /// Strategy names in the order they run.
    pub fn names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }
}

impl Default for AuthChain {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthStrategy for AuthChain {
    async fn authenticate(
        &self,
        handle: &mut client::Handle<SshClientHandler>,
        username: &str,
    ) -> Result<bool, String> {
        if self.strategies.is_empty() {
            return Err("No authentication methods available".to_string());
        }

        let mut last_error = None;

        for strategy in &self.strategies {
            debug!("Trying authentication strategy: {}", strategy.name());

            match strategy.authenticate(handle, username).await {
                Ok(true) => {
                    debug!(
                        "Authentication succeeded with strategy: {}",
                        strategy.name()
                    );
                    return Ok(true);
                }
                Ok(false) => {
                    debug!("Authentication failed with strategy: {}", strategy.name());
                    last_error = Some(format!("{} authentication rejected", strategy.name()));
                }
                Err(e) => {
                    debug!(
                        "Authentication error with strategy {}: {}",
                        strategy.name(),
                        e
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| "All authentication methods failed".to_string()))
    }

    fn name(&self) -> &'static str {
        "chain"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use secrecy::SecretString;

    use crate::communicator::methods::assemble;
    use crate::communicator::signer::{KeySigner, PrivateKeySigner};
    use crate::communicator::test_support::fixture_contents;

    fn password() -> SecretString {
        SecretString::new("secret".to_string())
    }

    #[test]
    fn test_auth_chain_empty() {
        let chain = AuthChain::new();
        assert!(chain.is_empty());
        assert_eq!(chain.len(), 0);
        assert_eq!(chain.name(), "chain");
    }

    #[test]
    fn test_auth_chain_default_is_empty() {
        assert!(AuthChain::default().is_empty());
    }

    #[test]
    fn test_chain_preserves_method_order() {
        let key: Arc<dyn KeySigner> =
            Arc::new(PrivateKeySigner::from_pem(&fixture_contents("id_rsa")).unwrap());
        let methods = assemble(None, vec![key], Some(password())).unwrap();

        let chain = AuthChain::from_methods(methods);

        assert_eq!(
            chain.names(),
            vec!["publickey", "password", "keyboard-interactive"]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_chain_from_agent_method() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("agent.sock");
        let _listener = std::os::unix::net::UnixListener::bind(&socket).unwrap();
        let agent = crate::communicator::credentials::AgentConnection::connect_to(&socket).unwrap();

        let chain = AuthChain::from_methods(vec![
            AuthMethod::Agent(agent),
            AuthMethod::Password(password()),
        ]);
        assert_eq!(chain.names(), vec!["agent", "password"]);
    }

    #[test]
    fn test_with_strategy_appends() {
        let chain = AuthChain::new()
            .with_method(AuthMethod::Password(password()))
            .with_strategy(KeyboardInteractiveAuth::new(password()));
        assert_eq!(chain.len(), 2);
    }

    #[test]
    fn test_auth_chain_implements_auth_strategy() {
        let chain = AuthChain::new().with_method(AuthMethod::Password(password()));

        fn requires_auth_strategy(_: &dyn AuthStrategy) {}
        requires_auth_strategy(&chain);
    }

    #[test]
    fn test_auth_chain_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<AuthChain>();
    }
}
