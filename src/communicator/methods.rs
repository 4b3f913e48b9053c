//! Authentication method assembly.
//!
//! Turns collected credentials into the ordered list of methods offered to the
//! server: agent, then every key pinned to its signature algorithm, then
//! password followed by keyboard-interactive answering with the same password.
//! The transport tries them in that order.

use std::sync::Arc;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info};

use crate::communicator::config::{BastionConfig, Config, SshConfig};
use crate::communicator::credentials::{
    AgentConnection, CredentialSources, Environment, KeySource, StateBag,
};
use crate::communicator::error::CredentialError;
use crate::communicator::keys;
use crate::communicator::signer::{AlgorithmSigner, KeySigner, PrivateKeySigner, pinned_algorithm};

/// One way of proving identity to an SSH server.
#[derive(Debug)]
pub enum AuthMethod {
    Agent(AgentConnection),
    PublicKey(AlgorithmSigner),
    Password(SecretString),
    /// Keyboard-interactive, answering every prompt with the password.
    KeyboardInteractive(SecretString),
}

impl AuthMethod {
    pub fn name(&self) -> &'static str {
        match self {
            AuthMethod::Agent(_) => "agent",
            AuthMethod::PublicKey(_) => "publickey",
            AuthMethod::Password(_) => "password",
            AuthMethod::KeyboardInteractive(_) => "keyboard-interactive",
        }
    }
}

/// Build the ordered method list.
///
/// Each key is wrapped in an [`AlgorithmSigner`] pinned by [`pinned_algorithm`];
/// a key that cannot be pinned fails the whole assembly.
pub fn assemble(
    agent: Option<AgentConnection>,
    keys: Vec<Arc<dyn KeySigner>>,
    password: Option<SecretString>,
) -> Result<Vec<AuthMethod>, CredentialError> {
    let mut methods = Vec::with_capacity(keys.len() + 3);

    if let Some(agent) = agent {
        methods.push(AuthMethod::Agent(agent));
    }

    for key in keys {
        let algorithm = pinned_algorithm(key.public_key());
        let signer = AlgorithmSigner::wrap(key, algorithm)?;
        debug!("Offering {:?}", signer);
        methods.push(AuthMethod::PublicKey(signer));
    }

    if let Some(password) = password {
        methods.push(AuthMethod::Password(password.clone()));
        methods.push(AuthMethod::KeyboardInteractive(password));
    }

    Ok(methods)
}

/// Connection settings handed to the transport alongside the methods.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub ciphers: Vec<String>,
    pub host_key_algorithms: Vec<String>,
    /// Time allowed for connecting and completing the handshake.
    pub timeout: Duration,
    pub keep_alive: Option<Duration>,
    pub read_write_timeout: Option<Duration>,
    pub handshake_attempts: u32,
    pub pty: bool,
}

impl From<&SshConfig> for ConnectionParams {
    fn from(ssh: &SshConfig) -> Self {
        Self {
            host: ssh.host.clone(),
            port: ssh.port,
            user: ssh.username.clone(),
            ciphers: ssh.ciphers.clone(),
            host_key_algorithms: ssh.host_key_algorithms.clone(),
            timeout: ssh.timeout,
            keep_alive: ssh.keep_alive_interval.as_duration(),
            read_write_timeout: Some(ssh.read_write_timeout).filter(|t| !t.is_zero()),
            handshake_attempts: ssh.handshake_attempts,
            pty: ssh.pty,
        }
    }
}

impl ConnectionParams {
    /// Parameters for the bastion hop; tuning is shared with the target.
    pub fn for_bastion(bastion: &BastionConfig, ssh: &SshConfig) -> Self {
        Self {
            host: bastion.host.clone(),
            port: bastion.port,
            user: bastion.username.clone(),
            pty: false,
            ..Self::from(ssh)
        }
    }

    /// `host:port` for dialing.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Everything the transport needs to open one authenticated connection.
#[derive(Debug)]
pub struct ResolvedSsh {
    pub params: ConnectionParams,
    pub methods: Vec<AuthMethod>,
}

impl ResolvedSsh {
    pub fn method_names(&self) -> Vec<&'static str> {
        self.methods.iter().map(AuthMethod::name).collect()
    }
}

/// Resolve connection parameters and authentication methods for a prepared
/// SSH configuration.
pub fn resolve_ssh(
    config: &Config,
    state: &dyn StateBag,
    env: &dyn Environment,
) -> Result<ResolvedSsh, CredentialError> {
    let ssh = config.ssh().ok_or_else(|| CredentialError::NotSsh {
        kind: config.communicator.kind().to_string(),
    })?;

    let sources = CredentialSources::collect(ssh, state, env)?;
    let keys = sources.key_signers();
    let methods = assemble(sources.agent, keys, sources.password)?;

    let resolved = ResolvedSsh {
        params: ConnectionParams::from(ssh),
        methods,
    };
    info!(
        "Resolved {} authentication methods for {}@{}: {:?}",
        resolved.methods.len(),
        resolved.params.user,
        resolved.params.address(),
        resolved.method_names()
    );
    Ok(resolved)
}

/// Resolve the bastion hop, if one is configured.
///
/// Methods are offered as password (with keyboard-interactive), then the bastion
/// key file, then the agent. Prompting a user at the terminal for
/// `ssh_bastion_interactive` is left to the caller.
pub fn resolve_bastion(
    ssh: &SshConfig,
    env: &dyn Environment,
) -> Result<Option<ResolvedSsh>, CredentialError> {
    let Some(bastion) = ssh.bastion.as_ref().filter(|b| !b.host.is_empty()) else {
        return Ok(None);
    };

    let mut methods = Vec::new();

    if let Some(password) = bastion.password() {
        methods.push(AuthMethod::Password(password.clone()));
        methods.push(AuthMethod::KeyboardInteractive(password.clone()));
    }

    if let Some(path) = bastion.private_key_file() {
        let (expanded, contents) = keys::read_key_file(path)?;
        let signer = PrivateKeySigner::from_pem(contents.expose_secret())
            .map_err(|source| CredentialError::KeyParse {
                source_kind: KeySource::File(expanded),
                source,
            })?;
        let algorithm = pinned_algorithm(signer.public_key());
        methods.push(AuthMethod::PublicKey(AlgorithmSigner::wrap(
            Arc::new(signer),
            algorithm,
        )?));
    }

    if bastion.agent_auth {
        methods.push(AuthMethod::Agent(AgentConnection::connect(env)?));
    }

    let resolved = ResolvedSsh {
        params: ConnectionParams::for_bastion(bastion, ssh),
        methods,
    };
    info!(
        "Resolved {} bastion authentication methods for {}@{}",
        resolved.methods.len(),
        resolved.params.user,
        resolved.params.address()
    );
    Ok(Some(resolved))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use ssh_key::{Algorithm, HashAlg};

    use crate::communicator::config::{Communicator, KeepAliveInterval};
    use crate::communicator::test_support::{fixture, fixture_contents};

    fn empty() -> HashMap<String, String> {
        HashMap::new()
    }

    fn password() -> SecretString {
        SecretString::new("hunter2".to_string())
    }

    fn signer(name: &str) -> Arc<dyn KeySigner> {
        Arc::new(PrivateKeySigner::from_pem(&fixture_contents(name)).unwrap())
    }

    fn names(methods: &[AuthMethod]) -> Vec<&'static str> {
        methods.iter().map(AuthMethod::name).collect()
    }

    mod assembly {
        use super::*;

        #[cfg(unix)]
        #[test]
        fn test_agent_key_password_order() {
            let dir = tempfile::tempdir().unwrap();
            let socket = dir.path().join("agent.sock");
            let _listener = std::os::unix::net::UnixListener::bind(&socket).unwrap();
            let agent = AgentConnection::connect_to(&socket).unwrap();

            let methods = assemble(Some(agent), vec![signer("id_rsa")], Some(password())).unwrap();

            assert_eq!(
                names(&methods),
                vec!["agent", "publickey", "password", "keyboard-interactive"]
            );
        }

        #[test]
        fn test_keys_keep_collection_order() {
            let methods = assemble(
                None,
                vec![signer("id_ed25519"), signer("id_rsa")],
                None,
            )
            .unwrap();

            let algorithms: Vec<_> = methods
                .iter()
                .map(|m| match m {
                    AuthMethod::PublicKey(s) => s.algorithm().clone(),
                    other => panic!("unexpected method {}", other.name()),
                })
                .collect();
            assert_eq!(
                algorithms,
                vec![
                    Algorithm::Ed25519,
                    Algorithm::Rsa {
                        hash: Some(HashAlg::Sha256)
                    }
                ]
            );
        }

        #[test]
        fn test_password_yields_password_and_keyboard_interactive() {
            let methods = assemble(None, Vec::new(), Some(password())).unwrap();
            assert_eq!(names(&methods), vec!["password", "keyboard-interactive"]);
            match &methods[1] {
                AuthMethod::KeyboardInteractive(answer) => {
                    assert_eq!(answer.expose_secret(), "hunter2")
                }
                other => panic!("unexpected method {}", other.name()),
            }
        }

        #[test]
        fn test_nothing_yields_no_methods() {
            assert!(assemble(None, Vec::new(), None).unwrap().is_empty());
        }

        #[test]
        fn test_unpinnable_key_fails() {
            struct OpaqueSigner(ssh_key::PrivateKey);

            impl KeySigner for OpaqueSigner {
                fn public_key(&self) -> &ssh_key::PublicKey {
                    self.0.public_key()
                }

                fn sign(&self, _data: &[u8]) -> Result<ssh_key::Signature, CredentialError> {
                    Err(CredentialError::Signing("opaque".to_string()))
                }
            }

            let key = ssh_key::PrivateKey::from_openssh(fixture_contents("id_rsa")).unwrap();
            let err = assemble(None, vec![Arc::new(OpaqueSigner(key))], Some(password()))
                .unwrap_err();
            assert!(matches!(err, CredentialError::UnsupportedSignerKind { .. }));
        }
    }

    mod resolve {
        use super::*;

        fn ssh_config(ssh: SshConfig) -> Config {
            Config::new(Communicator::Ssh(ssh))
        }

        #[test]
        fn test_resolve_ssh() {
            let config = ssh_config(SshConfig {
                host: "10.0.0.5".to_string(),
                port: 22,
                username: "builder".to_string(),
                private_key_file: Some(fixture("id_rsa")),
                password: Some(password()),
                timeout: Duration::from_secs(300),
                keep_alive_interval: KeepAliveInterval::Every(Duration::from_secs(5)),
                handshake_attempts: 10,
                ..Default::default()
            });

            let resolved = resolve_ssh(&config, &empty(), &empty()).unwrap();

            assert_eq!(
                resolved.method_names(),
                vec!["publickey", "password", "keyboard-interactive"]
            );
            assert_eq!(resolved.params.address(), "10.0.0.5:22");
            assert_eq!(resolved.params.user, "builder");
            assert_eq!(resolved.params.keep_alive, Some(Duration::from_secs(5)));
            assert_eq!(resolved.params.read_write_timeout, None);
        }

        #[test]
        fn test_resolve_non_ssh_fails() {
            let config = Config::new(Communicator::None);
            let err = resolve_ssh(&config, &empty(), &empty()).unwrap_err();
            assert!(matches!(err, CredentialError::NotSsh { .. }));
        }

        #[test]
        fn test_disabled_keep_alive() {
            let ssh = SshConfig {
                keep_alive_interval: KeepAliveInterval::Disabled,
                read_write_timeout: Duration::from_secs(30),
                ..Default::default()
            };
            let params = ConnectionParams::from(&ssh);
            assert_eq!(params.keep_alive, None);
            assert_eq!(params.read_write_timeout, Some(Duration::from_secs(30)));
        }
    }

    mod bastion {
        use super::*;

        fn with_bastion(bastion: BastionConfig) -> SshConfig {
            SshConfig {
                host: "10.0.0.5".to_string(),
                port: 22,
                username: "builder".to_string(),
                timeout: Duration::from_secs(300),
                bastion: Some(bastion),
                ..Default::default()
            }
        }

        #[test]
        fn test_no_bastion() {
            let ssh = SshConfig::default();
            assert!(resolve_bastion(&ssh, &empty()).unwrap().is_none());
        }

        #[test]
        fn test_empty_bastion_password_adds_no_methods() {
            let ssh = with_bastion(BastionConfig {
                host: "jump.example.com".to_string(),
                username: "jump".to_string(),
                password: Some(SecretString::new(String::new())),
                private_key_file: Some(String::new()),
                ..Default::default()
            });

            let resolved = resolve_bastion(&ssh, &empty()).unwrap().unwrap();
            assert!(resolved.methods.is_empty());
        }

        #[test]
        fn test_bastion_password_then_key() {
            let ssh = with_bastion(BastionConfig {
                host: "jump.example.com".to_string(),
                port: 2200,
                username: "jump".to_string(),
                password: Some(password()),
                private_key_file: Some(fixture("id_rsa")),
                ..Default::default()
            });

            let resolved = resolve_bastion(&ssh, &empty()).unwrap().unwrap();

            assert_eq!(
                resolved.method_names(),
                vec!["password", "keyboard-interactive", "publickey"]
            );
            assert_eq!(resolved.params.address(), "jump.example.com:2200");
            assert_eq!(resolved.params.user, "jump");
            assert_eq!(resolved.params.timeout, Duration::from_secs(300));
            match &resolved.methods[2] {
                AuthMethod::PublicKey(signer) => {
                    assert_eq!(signer.hash_alg(), Some(HashAlg::Sha256))
                }
                other => panic!("unexpected method {}", other.name()),
            }
        }

        #[test]
        fn test_bastion_agent_without_socket_fails() {
            let ssh = with_bastion(BastionConfig {
                host: "jump.example.com".to_string(),
                port: 22,
                username: "jump".to_string(),
                agent_auth: true,
                ..Default::default()
            });
            let err = resolve_bastion(&ssh, &empty()).unwrap_err();
            assert!(matches!(err, CredentialError::AgentSocketUnset { .. }));
        }

        #[test]
        fn test_bastion_bad_key_names_file() {
            let ssh = with_bastion(BastionConfig {
                host: "jump.example.com".to_string(),
                port: 22,
                username: "jump".to_string(),
                private_key_file: Some(fixture("not_a_key")),
                ..Default::default()
            });
            let err = resolve_bastion(&ssh, &empty()).unwrap_err();
            assert!(err.to_string().contains("not_a_key"));
        }
    }
}
