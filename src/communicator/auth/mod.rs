//! Authentication strategies run by the transport.
//!
//! Each [`AuthMethod`] produced by method assembly maps to one strategy;
//! [`AuthChain`] runs them in order and stops at the first success.
//!
//! # Available Strategies
//!
//! - [`AgentAuth`]: identities held by the SSH agent
//! - [`KeyAuth`]: a private key with its pinned signature algorithm
//! - [`PasswordAuth`]: plain password
//! - [`KeyboardInteractiveAuth`]: keyboard-interactive answered with the password
//!
//! [`AuthMethod`]: crate::communicator::methods::AuthMethod

mod agent;
mod chain;
mod key;
mod keyboard_interactive;
mod password;
mod traits;

pub use agent::AgentAuth;
pub use chain::AuthChain;
pub use key::KeyAuth;
pub use keyboard_interactive::KeyboardInteractiveAuth;
pub use password::PasswordAuth;
pub use traits::AuthStrategy;
