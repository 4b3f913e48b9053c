//! Keyboard-interactive authentication answering with the password.
//!
//! Some servers only offer keyboard-interactive for password logins. Every
//! prompt of every round is answered with the configured password.

use async_trait::async_trait;
use russh::client::{self, KeyboardInteractiveAuthResponse};
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use crate::communicator::session::SshClientHandler;

use super::traits::AuthStrategy;

/// Upper bound on info-request rounds before giving up.
const MAX_ROUNDS: usize = 8;

/// Keyboard-interactive strategy backed by a password.
pub struct KeyboardInteractiveAuth {
    password: SecretString,
}

impl KeyboardInteractiveAuth {
    pub fn new(password: SecretString) -> Self {
        Self { password }
    }

    /// Answers for a round with `prompts` questions.
    fn answers(&self, prompts: usize) -> Vec<String> {
        vec![self.password.expose_secret().clone(); prompts]
    }
}

#[async_trait]
impl AuthStrategy for KeyboardInteractiveAuth {
    async fn authenticate(
        &self,
        handle: &mut client::Handle<SshClientHandler>,
        username: &str,
    ) -> Result<bool, String> {
        let mut response = handle
            .authenticate_keyboard_interactive_start(username, None::<String>)
            .await
            .map_err(|e| format!("Keyboard-interactive start failed: {}", e))?;

        for round in 0..MAX_ROUNDS {
            match response {
                KeyboardInteractiveAuthResponse::Success => return Ok(true),
                KeyboardInteractiveAuthResponse::Failure { .. } => return Ok(false),
                KeyboardInteractiveAuthResponse::InfoRequest { prompts, .. } => {
                    debug!(
                        "Keyboard-interactive round {}: answering {} prompts",
                        round + 1,
                        prompts.len()
                    );
                    response = handle
                        .authenticate_keyboard_interactive_respond(self.answers(prompts.len()))
                        .await
                        .map_err(|e| format!("Keyboard-interactive respond failed: {}", e))?;
                }
            }
        }

        Err(format!(
            "Keyboard-interactive authentication did not finish after {} rounds",
            MAX_ROUNDS
        ))
    }

    fn name(&self) -> &'static str {
        "keyboard-interactive"
    }
}
