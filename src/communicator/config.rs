//! Communicator configuration record.
//!
//! A [`Config`] describes exactly one communicator. The communicator kind is a
//! tagged variant ([`Communicator`]), so SSH settings are only reachable on an SSH
//! record and WinRM settings only on a WinRM record. Decoding from the flat
//! external option format happens in [`crate::communicator::flat`].
//!
//! # Defaults
//!
//! Zero values mean "unset" and are replaced by [`Config::prepare`]:
//!
//! | Setting | Default |
//! |---------|---------|
//! | `ssh_port` | 22 |
//! | `ssh_timeout` | 5m |
//! | `ssh_keep_alive_interval` | 5s (negative disables) |
//! | `ssh_handshake_attempts` | 10 |
//! | `ssh_bastion_port` | 22 |
//! | `ssh_proxy_port` | 1080 |
//! | `ssh_file_transfer_method` | `scp` |
//! | `winrm_port` | 5985, or 5986 with `winrm_use_ssl` |
//! | `winrm_timeout` | 30m |

use std::fmt;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::communicator::error::KeyFileError;
use crate::communicator::keys;

pub(crate) const DEFAULT_SSH_PORT: u16 = 22;
pub(crate) const DEFAULT_SSH_TIMEOUT: Duration = Duration::from_secs(5 * 60);
pub(crate) const DEFAULT_KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(5);
pub(crate) const DEFAULT_HANDSHAKE_ATTEMPTS: u32 = 10;
pub(crate) const DEFAULT_BASTION_PORT: u16 = 22;
pub(crate) const DEFAULT_PROXY_PORT: u16 = 1080;
pub(crate) const DEFAULT_WINRM_PORT: u16 = 5985;
pub(crate) const DEFAULT_WINRM_SSL_PORT: u16 = 5986;
pub(crate) const DEFAULT_WINRM_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Communicator kinds provided by individual builders rather than by this crate.
///
/// Preparation accepts them without touching any settings.
pub const CUSTOM_COMMUNICATORS: &[&str] = &["docker", "dockerWindowsContainer"];

/// Settings for one communicator instance.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub communicator: Communicator,
    /// Wait after a successful connectivity check before connecting for real.
    pub pause_before_connect: Duration,
}

/// Which communicator is used, carrying its settings.
#[derive(Debug, Clone)]
pub enum Communicator {
    None,
    Ssh(SshConfig),
    WinRm(WinRmConfig),
    /// A builder-specific communicator such as `docker`. An empty name is
    /// treated as SSH by preparation.
    Custom(String),
}

impl Default for Communicator {
    fn default() -> Self {
        Communicator::Ssh(SshConfig::default())
    }
}

impl Communicator {
    /// Name of the communicator as written in the flat `communicator` option.
    pub fn kind(&self) -> &str {
        match self {
            Communicator::None => "none",
            Communicator::Ssh(_) => "ssh",
            Communicator::WinRm(_) => "winrm",
            Communicator::Custom(kind) => kind,
        }
    }
}

/// How files are copied to the remote host.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FileTransferMethod {
    #[default]
    Unset,
    Scp,
    Sftp,
    /// Any other value from the input; rejected by preparation.
    Unknown(String),
}

impl From<&str> for FileTransferMethod {
    fn from(value: &str) -> Self {
        match value {
            "" => FileTransferMethod::Unset,
            "scp" => FileTransferMethod::Scp,
            "sftp" => FileTransferMethod::Sftp,
            other => FileTransferMethod::Unknown(other.to_string()),
        }
    }
}

impl fmt::Display for FileTransferMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileTransferMethod::Unset => Ok(()),
            FileTransferMethod::Scp => write!(f, "scp"),
            FileTransferMethod::Sftp => write!(f, "sftp"),
            FileTransferMethod::Unknown(value) => write!(f, "{}", value),
        }
    }
}

/// Keep-alive behaviour of the SSH connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeepAliveInterval {
    /// Not configured; preparation replaces it with the 5 second default.
    #[default]
    Unset,
    Every(Duration),
    /// Configured with a negative interval.
    Disabled,
}

impl KeepAliveInterval {
    /// Interval to hand to the transport, `None` when keep-alives are off.
    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            KeepAliveInterval::Every(interval) if !interval.is_zero() => Some(*interval),
            _ => None,
        }
    }
}

/// Transport used for WinRM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WinRmTransport {
    #[default]
    Basic,
    Ntlm,
}

/// SSH communicator settings.
#[derive(Debug, Clone, Default)]
pub struct SshConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: Option<SecretString>,
    /// Name of an existing key pair loaded on the remote side.
    pub keypair_name: String,
    pub temporary_key_pair_name: String,
    /// Private key path as configured; `~` is expanded when the file is used.
    pub private_key_file: Option<String>,
    /// Private key handed over inline, usually by the builder itself.
    pub private_key: Option<SecretString>,
    /// Public half of the inline key; informational only.
    pub public_key: Option<Vec<u8>>,
    pub agent_auth: bool,
    pub disable_agent_forwarding: bool,
    pub timeout: Duration,
    /// Deprecated alias of `timeout`; when non-zero it overrides `timeout`.
    pub wait_timeout: Duration,
    pub keep_alive_interval: KeepAliveInterval,
    pub handshake_attempts: u32,
    /// Cipher override, empty for the library default.
    pub ciphers: Vec<String>,
    /// Host key algorithm override, empty for the library default.
    pub host_key_algorithms: Vec<String>,
    /// Zero disables the read/write timeout.
    pub read_write_timeout: Duration,
    pub pty: bool,
    pub bastion: Option<BastionConfig>,
    pub proxy: Option<ProxyConfig>,
    pub local_tunnels: Vec<String>,
    pub remote_tunnels: Vec<String>,
    pub file_transfer_method: FileTransferMethod,
    /// Remove the temporary key from remote `authorized_keys` files on cleanup.
    pub clear_authorized_keys: bool,
}

/// Jump host used for a two-hop SSH connection.
#[derive(Debug, Clone, Default)]
pub struct BastionConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: Option<SecretString>,
    /// Falls back to the primary `private_key_file` during preparation.
    pub private_key_file: Option<String>,
    pub agent_auth: bool,
    pub interactive: bool,
}

/// SOCKS proxy used for the SSH connection.
#[derive(Debug, Clone, Default)]
pub struct ProxyConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: Option<SecretString>,
}

/// WinRM communicator settings.
#[derive(Debug, Clone, Default)]
pub struct WinRmConfig {
    pub username: String,
    pub password: Option<SecretString>,
    pub host: String,
    pub port: u16,
    pub timeout: Duration,
    pub use_ssl: bool,
    /// Skip server certificate chain and host name checks.
    pub insecure: bool,
    pub use_ntlm: bool,
    /// Add the remote `host:port` to `NO_PROXY`.
    pub no_proxy: bool,
    /// Selected by preparation from `use_ntlm`.
    pub transport: WinRmTransport,
}

/// `None` for an unset or empty secret.
fn non_empty_secret(secret: &Option<SecretString>) -> Option<&SecretString> {
    secret.as_ref().filter(|s| !s.expose_secret().is_empty())
}

fn non_empty_path(path: &Option<String>) -> Option<&str> {
    path.as_deref().filter(|p| !p.is_empty())
}

// Records built in code may hold `Some("")`; these accessors read it as unset.
impl SshConfig {
    pub fn password(&self) -> Option<&SecretString> {
        non_empty_secret(&self.password)
    }

    pub fn private_key_file(&self) -> Option<&str> {
        non_empty_path(&self.private_key_file)
    }

    pub fn private_key(&self) -> Option<&SecretString> {
        non_empty_secret(&self.private_key)
    }

    /// A bastion counts as configured once it has a host.
    pub fn has_bastion(&self) -> bool {
        self.bastion.as_ref().is_some_and(|b| !b.host.is_empty())
    }

    pub fn has_proxy(&self) -> bool {
        self.proxy.as_ref().is_some_and(|p| !p.host.is_empty())
    }
}

impl BastionConfig {
    pub fn password(&self) -> Option<&SecretString> {
        non_empty_secret(&self.password)
    }

    pub fn private_key_file(&self) -> Option<&str> {
        non_empty_path(&self.private_key_file)
    }
}

impl Config {
    /// Create a configuration for the given communicator.
    pub fn new(communicator: Communicator) -> Self {
        Self {
            communicator,
            pause_before_connect: Duration::ZERO,
        }
    }

    pub fn ssh(&self) -> Option<&SshConfig> {
        match &self.communicator {
            Communicator::Ssh(ssh) => Some(ssh),
            _ => None,
        }
    }

    pub fn winrm(&self) -> Option<&WinRmConfig> {
        match &self.communicator {
            Communicator::WinRm(winrm) => Some(winrm),
            _ => None,
        }
    }

    /// Host used for access, empty for communicators without one.
    pub fn host(&self) -> &str {
        match &self.communicator {
            Communicator::Ssh(ssh) => &ssh.host,
            Communicator::WinRm(winrm) => &winrm.host,
            _ => "",
        }
    }

    /// Port used for access, `0` for communicators without one.
    pub fn port(&self) -> u16 {
        match &self.communicator {
            Communicator::Ssh(ssh) => ssh.port,
            Communicator::WinRm(winrm) => winrm.port,
            _ => 0,
        }
    }

    /// User used for access, empty for communicators without one.
    pub fn user(&self) -> &str {
        match &self.communicator {
            Communicator::Ssh(ssh) => &ssh.username,
            Communicator::WinRm(winrm) => &winrm.username,
            _ => "",
        }
    }

    /// Password used for access, if any.
    pub fn password(&self) -> Option<&SecretString> {
        match &self.communicator {
            Communicator::Ssh(ssh) => ssh.password(),
            Communicator::WinRm(winrm) => non_empty_secret(&winrm.password),
            _ => None,
        }
    }

    /// Read the SSH private key file, if one is configured.
    ///
    /// Returns `Ok(None)` for non-SSH communicators and when no key file is set.
    pub fn read_ssh_private_key_file(&self) -> Result<Option<SecretString>, KeyFileError> {
        match self.ssh().and_then(SshConfig::private_key_file) {
            Some(path) => keys::read_key_file(path).map(|(_, key)| Some(key)),
            None => Ok(None),
        }
    }
}
