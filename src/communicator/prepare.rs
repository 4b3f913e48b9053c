//! Preparation: defaulting and validation.
//!
//! [`Config::prepare`] fills every unset setting with its default and then runs
//! all validation checks, returning every failure at once. Defaults are applied
//! even when validation fails.

use tracing::{debug, warn};

use crate::communicator::config::{
    CUSTOM_COMMUNICATORS, Communicator, Config, DEFAULT_BASTION_PORT,
    DEFAULT_HANDSHAKE_ATTEMPTS, DEFAULT_KEEP_ALIVE_INTERVAL, DEFAULT_PROXY_PORT,
    DEFAULT_SSH_PORT, DEFAULT_SSH_TIMEOUT, DEFAULT_WINRM_PORT, DEFAULT_WINRM_SSL_PORT,
    DEFAULT_WINRM_TIMEOUT, FileTransferMethod, KeepAliveInterval, SshConfig, WinRmConfig,
    WinRmTransport,
};
use crate::communicator::error::ConfigError;
use crate::communicator::keys;
use crate::communicator::tunnel::{OpenSshTunnelParser, TunnelDirection, TunnelParser};

impl Config {
    /// Apply defaults and validate, using the OpenSSH tunnel argument parser.
    ///
    /// An empty list means the configuration is usable.
    pub fn prepare(&mut self) -> Vec<ConfigError> {
        self.prepare_with(&OpenSshTunnelParser)
    }

    /// Apply defaults and validate with a custom tunnel parser.
    pub fn prepare_with(&mut self, tunnels: &dyn TunnelParser) -> Vec<ConfigError> {
        if matches!(&self.communicator, Communicator::Custom(kind) if kind.is_empty()) {
            debug!("No communicator type given, defaulting to ssh");
            self.communicator = Communicator::Ssh(SshConfig::default());
        }

        match &mut self.communicator {
            Communicator::Ssh(ssh) => {
                apply_ssh_defaults(ssh);
                validate_ssh(ssh, tunnels)
            }
            Communicator::WinRm(winrm) => {
                apply_winrm_defaults(winrm);
                validate_winrm(winrm)
            }
            Communicator::None => Vec::new(),
            Communicator::Custom(kind) if CUSTOM_COMMUNICATORS.contains(&kind.as_str()) => {
                Vec::new()
            }
            Communicator::Custom(kind) => vec![ConfigError::InvalidCommunicator(kind.clone())],
        }
    }
}

fn apply_ssh_defaults(ssh: &mut SshConfig) {
    if ssh.port == 0 {
        ssh.port = DEFAULT_SSH_PORT;
    }

    if ssh.timeout.is_zero() {
        ssh.timeout = DEFAULT_SSH_TIMEOUT;
    }

    match ssh.keep_alive_interval {
        KeepAliveInterval::Unset => {
            ssh.keep_alive_interval = KeepAliveInterval::Every(DEFAULT_KEEP_ALIVE_INTERVAL)
        }
        KeepAliveInterval::Every(interval) if interval.is_zero() => {
            ssh.keep_alive_interval = KeepAliveInterval::Every(DEFAULT_KEEP_ALIVE_INTERVAL)
        }
        _ => {}
    }

    if ssh.handshake_attempts == 0 {
        ssh.handshake_attempts = DEFAULT_HANDSHAKE_ATTEMPTS;
    }

    let primary_key_file = ssh.private_key_file().map(str::to_string);
    if let Some(bastion) = ssh.bastion.as_mut().filter(|b| !b.host.is_empty()) {
        if bastion.port == 0 {
            bastion.port = DEFAULT_BASTION_PORT;
        }
        if bastion.private_key_file().is_none() && primary_key_file.is_some() {
            debug!("Bastion inherits ssh_private_key_file");
            bastion.private_key_file = primary_key_file;
        }
    }

    if let Some(proxy) = ssh.proxy.as_mut().filter(|p| !p.host.is_empty()) {
        if proxy.port == 0 {
            proxy.port = DEFAULT_PROXY_PORT;
        }
    }

    if ssh.file_transfer_method == FileTransferMethod::Unset {
        ssh.file_transfer_method = FileTransferMethod::Scp;
    }

    // Deprecated alias: a non-zero wait timeout always wins, even over an
    // explicit ssh_timeout.
    if !ssh.wait_timeout.is_zero() {
        warn!(
            "ssh_wait_timeout is deprecated, use ssh_timeout; overriding timeout with {:?}",
            ssh.wait_timeout
        );
        ssh.timeout = ssh.wait_timeout;
    }

    debug!(
        "SSH defaults applied: port={} timeout={:?} keep_alive={:?} handshake_attempts={}",
        ssh.port, ssh.timeout, ssh.keep_alive_interval, ssh.handshake_attempts
    );
}

fn validate_ssh(ssh: &SshConfig, tunnels: &dyn TunnelParser) -> Vec<ConfigError> {
    let mut errors = Vec::new();

    if ssh.username.is_empty() {
        errors.push(ConfigError::MissingSshUsername);
    }

    if let Some(path) = ssh.private_key_file() {
        if let Err(source) = keys::check_key_file(path) {
            errors.push(ConfigError::KeyFile {
                field: "ssh_private_key_file",
                source,
            });
        }
    }

    if let Some(bastion) = ssh.bastion.as_ref().filter(|b| !b.host.is_empty()) {
        if !bastion.agent_auth {
            match bastion.private_key_file() {
                None if bastion.password().is_none() => {
                    errors.push(ConfigError::MissingBastionCredentials);
                }
                None => {}
                Some(path) => {
                    if let Err(source) = keys::check_key_file(path) {
                        errors.push(ConfigError::KeyFile {
                            field: "ssh_bastion_private_key_file",
                            source,
                        });
                    }
                }
            }
        }
    }

    match &ssh.file_transfer_method {
        FileTransferMethod::Scp | FileTransferMethod::Sftp => {}
        other => errors.push(ConfigError::InvalidFileTransferMethod(other.to_string())),
    }

    if ssh.has_bastion() && ssh.has_proxy() {
        errors.push(ConfigError::BastionAndProxy);
    }

    let tunnel_lists = [
        ("ssh_local_tunnels", TunnelDirection::Local, &ssh.local_tunnels),
        ("ssh_remote_tunnels", TunnelDirection::Remote, &ssh.remote_tunnels),
    ];
    for (field, direction, specs) in tunnel_lists {
        for spec in specs {
            if let Err(source) = tunnels.parse(spec, direction) {
                errors.push(ConfigError::Tunnel {
                    field,
                    spec: spec.clone(),
                    source,
                });
            }
        }
    }

    errors
}

fn apply_winrm_defaults(winrm: &mut WinRmConfig) {
    if winrm.port == 0 {
        winrm.port = if winrm.use_ssl {
            DEFAULT_WINRM_SSL_PORT
        } else {
            DEFAULT_WINRM_PORT
        };
    }

    if winrm.timeout.is_zero() {
        winrm.timeout = DEFAULT_WINRM_TIMEOUT;
    }

    if winrm.use_ntlm {
        winrm.transport = WinRmTransport::Ntlm;
    }

    debug!(
        "WinRM defaults applied: port={} timeout={:?} transport={:?}",
        winrm.port, winrm.timeout, winrm.transport
    );
}

fn validate_winrm(winrm: &WinRmConfig) -> Vec<ConfigError> {
    let mut errors = Vec::new();
    if winrm.username.is_empty() {
        errors.push(ConfigError::MissingWinRmUsername);
    }
    errors
}
