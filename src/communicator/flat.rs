//! Flat external configuration format.
//!
//! Builders receive communicator settings as one flat object of `ssh_*` and
//! `winrm_*` options next to `communicator`. [`FlatConfig`] decodes that object
//! and `Config::from` moves the fields belonging to the selected communicator
//! into its variant; the rest are dropped.
//!
//! Durations are written as human readable strings (`"5m"`, `"1h 30m"`,
//! `"10s"`). Only `ssh_keep_alive_interval` accepts a negative value, which turns
//! keep-alives off.

use std::time::Duration;

use schemars::JsonSchema;
use secrecy::SecretString;
use serde::{Deserialize, Deserializer, de};

use crate::communicator::config::{
    BastionConfig, Communicator, Config, FileTransferMethod, KeepAliveInterval, ProxyConfig,
    SshConfig, WinRmConfig, WinRmTransport,
};

/// Communicator options as written by the user.
#[derive(Default, Deserialize, JsonSchema)]
#[serde(default, deny_unknown_fields)]
pub struct FlatConfig {
    /// `ssh` (default), `winrm`, `none`, or a builder-specific communicator.
    pub communicator: String,
    /// Time to wait after the communicator is reachable before connecting.
    #[serde(deserialize_with = "duration")]
    #[schemars(with = "String")]
    pub pause_before_connecting: Duration,

    pub ssh_host: String,
    #[schemars(schema_with = "crate::communicator::schema::uint")]
    pub ssh_port: u16,
    pub ssh_username: String,
    pub ssh_password: String,
    pub ssh_keypair_name: String,
    pub temporary_key_pair_name: String,
    pub ssh_ciphers: Vec<String>,
    pub ssh_host_key_algorithms: Vec<String>,
    pub ssh_clear_authorized_keys: bool,
    pub ssh_private_key_file: String,
    pub ssh_pty: bool,
    #[serde(deserialize_with = "duration")]
    #[schemars(with = "String")]
    pub ssh_timeout: Duration,
    /// Deprecated, use `ssh_timeout`.
    #[serde(deserialize_with = "duration")]
    #[schemars(with = "String")]
    pub ssh_wait_timeout: Duration,
    pub ssh_agent_auth: bool,
    pub ssh_disable_agent_forwarding: bool,
    #[schemars(schema_with = "crate::communicator::schema::uint")]
    pub ssh_handshake_attempts: u32,
    pub ssh_bastion_host: String,
    #[schemars(schema_with = "crate::communicator::schema::uint")]
    pub ssh_bastion_port: u16,
    pub ssh_bastion_agent_auth: bool,
    pub ssh_bastion_username: String,
    pub ssh_bastion_password: String,
    pub ssh_bastion_interactive: bool,
    pub ssh_bastion_private_key_file: String,
    /// `scp` (default) or `sftp`.
    pub ssh_file_transfer_method: String,
    pub ssh_proxy_host: String,
    #[schemars(schema_with = "crate::communicator::schema::uint")]
    pub ssh_proxy_port: u16,
    pub ssh_proxy_username: String,
    pub ssh_proxy_password: String,
    /// Negative disables keep-alives.
    #[serde(deserialize_with = "keep_alive")]
    #[schemars(with = "String")]
    pub ssh_keep_alive_interval: KeepAliveInterval,
    #[serde(deserialize_with = "duration")]
    #[schemars(with = "String")]
    pub ssh_read_write_timeout: Duration,
    /// `[bind_address:]port:host:hostport` entries.
    pub ssh_remote_tunnels: Vec<String>,
    /// `[bind_address:]port:host:hostport` entries.
    pub ssh_local_tunnels: Vec<String>,
    pub ssh_public_key: String,
    pub ssh_private_key: String,

    pub winrm_username: String,
    pub winrm_password: String,
    pub winrm_host: String,
    pub winrm_no_proxy: bool,
    #[schemars(schema_with = "crate::communicator::schema::uint")]
    pub winrm_port: u16,
    #[serde(deserialize_with = "duration")]
    #[schemars(with = "String")]
    pub winrm_timeout: Duration,
    pub winrm_use_ssl: bool,
    pub winrm_insecure: bool,
    pub winrm_use_ntlm: bool,
}

impl Config {
    /// Decode a flat JSON object.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<FlatConfig>(json).map(Config::from)
    }
}

impl From<FlatConfig> for Config {
    fn from(mut flat: FlatConfig) -> Self {
        let pause_before_connect = flat.pause_before_connecting;
        let kind = std::mem::take(&mut flat.communicator);
        let communicator = match kind.as_str() {
            "" | "ssh" => Communicator::Ssh(flat.into_ssh()),
            "winrm" => Communicator::WinRm(flat.into_winrm()),
            "none" => Communicator::None,
            other => Communicator::Custom(other.to_string()),
        };

        Config {
            communicator,
            pause_before_connect,
        }
    }
}

impl FlatConfig {
    fn into_ssh(self) -> SshConfig {
        let bastion = non_empty(self.ssh_bastion_host).map(|host| BastionConfig {
            host,
            port: self.ssh_bastion_port,
            username: self.ssh_bastion_username,
            password: secret(self.ssh_bastion_password),
            private_key_file: non_empty(self.ssh_bastion_private_key_file),
            agent_auth: self.ssh_bastion_agent_auth,
            interactive: self.ssh_bastion_interactive,
        });

        let proxy = non_empty(self.ssh_proxy_host).map(|host| ProxyConfig {
            host,
            port: self.ssh_proxy_port,
            username: self.ssh_proxy_username,
            password: secret(self.ssh_proxy_password),
        });

        SshConfig {
            host: self.ssh_host,
            port: self.ssh_port,
            username: self.ssh_username,
            password: secret(self.ssh_password),
            keypair_name: self.ssh_keypair_name,
            temporary_key_pair_name: self.temporary_key_pair_name,
            private_key_file: non_empty(self.ssh_private_key_file),
            private_key: secret(self.ssh_private_key),
            public_key: non_empty(self.ssh_public_key).map(String::into_bytes),
            agent_auth: self.ssh_agent_auth,
            disable_agent_forwarding: self.ssh_disable_agent_forwarding,
            timeout: self.ssh_timeout,
            wait_timeout: self.ssh_wait_timeout,
            keep_alive_interval: self.ssh_keep_alive_interval,
            handshake_attempts: self.ssh_handshake_attempts,
            ciphers: self.ssh_ciphers,
            host_key_algorithms: self.ssh_host_key_algorithms,
            read_write_timeout: self.ssh_read_write_timeout,
            pty: self.ssh_pty,
            bastion,
            proxy,
            local_tunnels: self.ssh_local_tunnels,
            remote_tunnels: self.ssh_remote_tunnels,
            file_transfer_method: FileTransferMethod::from(self.ssh_file_transfer_method.as_str()),
            clear_authorized_keys: self.ssh_clear_authorized_keys,
        }
    }

    fn into_winrm(self) -> WinRmConfig {
        WinRmConfig {
            username: self.winrm_username,
            password: secret(self.winrm_password),
            host: self.winrm_host,
            port: self.winrm_port,
            timeout: self.winrm_timeout,
            use_ssl: self.winrm_use_ssl,
            insecure: self.winrm_insecure,
            use_ntlm: self.winrm_use_ntlm,
            no_proxy: self.winrm_no_proxy,
            transport: WinRmTransport::Basic,
        }
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() { None } else { Some(value) }
}

fn secret(value: String) -> Option<SecretString> {
    non_empty(value).map(SecretString::new)
}

/// Parse a non-negative duration; empty means zero.
fn parse_duration(raw: &str) -> Result<Duration, String> {
    let raw = raw.trim();
    if raw.is_empty() || raw == "0" {
        return Ok(Duration::ZERO);
    }
    if raw.starts_with('-') {
        return Err(format!("duration {:?} must not be negative", raw));
    }
    humantime::parse_duration(raw).map_err(|e| format!("invalid duration {:?}: {}", raw, e))
}

fn duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_duration(&raw).map_err(de::Error::custom)
}

fn keep_alive<'de, D>(deserializer: D) -> Result<KeepAliveInterval, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    let raw = raw.trim();

    if let Some(magnitude) = raw.strip_prefix('-') {
        let interval = parse_duration(magnitude).map_err(de::Error::custom)?;
        return Ok(if interval.is_zero() {
            KeepAliveInterval::Unset
        } else {
            KeepAliveInterval::Disabled
        });
    }

    let interval = parse_duration(raw).map_err(de::Error::custom)?;
    Ok(if interval.is_zero() {
        KeepAliveInterval::Unset
    } else {
        KeepAliveInterval::Every(interval)
    })
}
