//! Credential source collection.
//!
//! Gathers the secret material an SSH connection can authenticate with, in a
//! fixed order:
//!
//! 1. the SSH agent, when `ssh_agent_auth` is set
//! 2. the private key file
//! 3. a private key handed over by an earlier build step under `"privateKey"`
//! 4. the inline private key
//! 5. the password, kept apart from the keys
//!
//! Any failure aborts the whole collection. Process environment lookups go
//! through [`Environment`] so callers (and tests) can substitute their own.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use crate::communicator::config::SshConfig;
use crate::communicator::error::CredentialError;
use crate::communicator::keys;
use crate::communicator::signer::{KeySigner, PrivateKeySigner};

/// Environment variable holding the agent socket path.
pub const AGENT_SOCKET_ENV_VAR: &str = "SSH_AUTH_SOCK";

/// State key under which an earlier step may leave a private key.
pub const PRIVATE_KEY_STATE_KEY: &str = "privateKey";

/// Read access to environment variables.
pub trait Environment {
    fn var(&self, name: &str) -> Option<String>;
}

/// The real process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnvironment;

impl Environment for ProcessEnvironment {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

impl Environment for HashMap<String, String> {
    fn var(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

/// String-keyed values shared between build steps.
pub trait StateBag {
    fn get_str(&self, key: &str) -> Option<&str>;
}

impl StateBag for HashMap<String, String> {
    fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).map(String::as_str)
    }
}

impl StateBag for serde_json::Map<String, serde_json::Value> {
    fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(serde_json::Value::as_str)
    }
}

/// Where a private key came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySource {
    File(PathBuf),
    State,
    Inline,
}

impl fmt::Display for KeySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeySource::File(path) => write!(f, "file {:?}", path),
            KeySource::State => write!(f, "state key {:?}", PRIVATE_KEY_STATE_KEY),
            KeySource::Inline => write!(f, "ssh_private_key"),
        }
    }
}

/// An open connection to the local SSH agent.
#[derive(Debug)]
pub struct AgentConnection {
    socket: PathBuf,
    #[cfg(unix)]
    stream: std::os::unix::net::UnixStream,
}

impl AgentConnection {
    /// Connect to the agent socket named by `SSH_AUTH_SOCK`.
    ///
    /// An unset or empty variable is an error, as is a socket that refuses the
    /// connection.
    pub fn connect(env: &dyn Environment) -> Result<Self, CredentialError> {
        let socket = env
            .var(AGENT_SOCKET_ENV_VAR)
            .filter(|value| !value.is_empty())
            .ok_or(CredentialError::AgentSocketUnset {
                variable: AGENT_SOCKET_ENV_VAR,
            })?;

        Self::connect_to(Path::new(&socket))
    }

    #[cfg(unix)]
    pub fn connect_to(socket: &Path) -> Result<Self, CredentialError> {
        let stream = std::os::unix::net::UnixStream::connect(socket).map_err(|source| {
            CredentialError::AgentConnect {
                socket: socket.to_path_buf(),
                source,
            }
        })?;

        Ok(Self {
            socket: socket.to_path_buf(),
            stream,
        })
    }

    #[cfg(not(unix))]
    pub fn connect_to(_socket: &Path) -> Result<Self, CredentialError> {
        Err(CredentialError::AgentUnsupported)
    }

    pub fn socket(&self) -> &Path {
        &self.socket
    }

    /// Duplicate the connected stream for the transport.
    #[cfg(unix)]
    pub fn try_clone_stream(&self) -> std::io::Result<std::os::unix::net::UnixStream> {
        self.stream.try_clone()
    }
}

/// A parsed private key and where it came from.
pub struct CollectedKey {
    pub source: KeySource,
    pub signer: Arc<dyn KeySigner>,
}

impl fmt::Debug for CollectedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectedKey")
            .field("source", &self.source)
            .field("algorithm", &self.signer.public_key().algorithm().as_str())
            .finish()
    }
}

/// Everything an SSH connection may authenticate with.
#[derive(Debug, Default)]
pub struct CredentialSources {
    pub agent: Option<AgentConnection>,
    pub keys: Vec<CollectedKey>,
    pub password: Option<SecretString>,
}

impl CredentialSources {
    /// Collect credentials for `ssh`.
    ///
    /// Keys are parsed as they are collected, so an unusable key fails here and
    /// names its source.
    pub fn collect(
        ssh: &SshConfig,
        state: &dyn StateBag,
        env: &dyn Environment,
    ) -> Result<Self, CredentialError> {
        let mut sources = CredentialSources::default();

        if ssh.agent_auth {
            let agent = AgentConnection::connect(env)?;
            debug!("Using SSH agent at {:?}", agent.socket());
            sources.agent = Some(agent);
        }

        if let Some(path) = ssh.private_key_file() {
            let (expanded, contents) = keys::read_key_file(path)?;
            sources.push_key(KeySource::File(expanded), contents.expose_secret())?;
        }

        if let Some(key) = state.get_str(PRIVATE_KEY_STATE_KEY) {
            sources.push_key(KeySource::State, key)?;
        }

        if let Some(key) = ssh.private_key() {
            sources.push_key(KeySource::Inline, key.expose_secret())?;
        }

        if let Some(password) = ssh.password() {
            debug!("Using password for {}", ssh.username);
            sources.password = Some(password.clone());
        }

        Ok(sources)
    }

    fn push_key(&mut self, source: KeySource, pem: &str) -> Result<(), CredentialError> {
        let signer = PrivateKeySigner::from_pem(pem).map_err(|e| CredentialError::KeyParse {
            source_kind: source.clone(),
            source: e,
        })?;
        debug!(
            "Collected {} key from {}",
            signer.algorithm().as_str(),
            source
        );
        self.keys.push(CollectedKey {
            source,
            signer: Arc::new(signer),
        });
        Ok(())
    }

    /// Signers of the collected keys, in collection order.
    pub fn key_signers(&self) -> Vec<Arc<dyn KeySigner>> {
        self.keys.iter().map(|key| key.signer.clone()).collect()
    }
}
