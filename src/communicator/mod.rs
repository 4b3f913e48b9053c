//! Communicator configuration and SSH credential resolution.
//!
//! The flow for an SSH communicator:
//!
//! 1. Decode the flat options into a [`Config`] ([`Config::from_json`]).
//! 2. [`Config::prepare`] applies defaults and reports every validation error.
//! 3. [`resolve_ssh`] collects credentials and assembles the ordered
//!    authentication methods plus [`ConnectionParams`].
//! 4. [`connect_and_authenticate`] hands them to russh.
//!
//! WinRM, `none`, and builder-specific communicators stop after step 2.

pub mod auth;
pub mod client;
pub mod config;
pub mod credentials;
pub mod error;
pub mod flat;
pub mod keys;
pub mod methods;
pub mod prepare;
pub mod schema;
pub mod session;
pub mod signer;
pub mod tunnel;

pub use client::connect_and_authenticate;
pub use config::{
    BastionConfig, Communicator, Config, FileTransferMethod, KeepAliveInterval, ProxyConfig,
    SshConfig, WinRmConfig, WinRmTransport,
};
pub use credentials::{Environment, ProcessEnvironment, StateBag};
pub use error::{ConfigError, CredentialError, KeyFileError, KeyParseError, TunnelSpecError};
pub use methods::{AuthMethod, ConnectionParams, ResolvedSsh, resolve_bastion, resolve_ssh};
