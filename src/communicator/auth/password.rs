//! Password authentication.

use async_trait::async_trait;
use russh::client;
use secrecy::{ExposeSecret, SecretString};

use crate::communicator::session::SshClientHandler;

use super::traits::AuthStrategy;

/// Password authentication strategy.
pub struct PasswordAuth {
    password: SecretString,
}

impl PasswordAuth {
    pub fn new(password: SecretString) -> Self {
        Self { password }
    }
}

#[async_trait]
impl AuthStrategy for PasswordAuth {
    async fn authenticate(
        &self,
        handle: &mut client::Handle<SshClientHandler>,
        username: &str,
    ) -> Result<bool, String> {
        let result = handle
            .authenticate_password(username, self.password.expose_secret())
            .await
            .map_err(|e| format!("Password authentication failed: {}", e))?;

        Ok(result.success())
    }

    fn name(&self) -> &'static str {
        "password"
    }
}
