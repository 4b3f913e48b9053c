//! Error types for communicator preparation and credential resolution.
//!
//! Errors fall into three families:
//!
//! 1. **Configuration errors** ([`ConfigError`]): missing required fields, invalid
//!    enum values, mutually exclusive options. Preparation collects every one of
//!    them and hands the full list back to the caller.
//!
//! 2. **Tunnel argument errors** ([`TunnelSpecError`]): a malformed
//!    `ssh_local_tunnels` / `ssh_remote_tunnels` entry. Reported as part of the
//!    configuration error list together with the offending literal.
//!
//! 3. **Credential errors** ([`CredentialError`]): unreadable or unparsable keys,
//!    an unreachable agent socket, a signer that cannot pin its algorithm. These
//!    abort the resolution attempt immediately.
//!
//! [`SignRequestError`] wraps a credential error raised while the transport
//! asks a key to sign its authentication request.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::communicator::credentials::KeySource;

/// A single validation failure reported by [`Config::prepare`].
///
/// Messages name the flat option (`ssh_username`, `ssh_private_key_file`, ...)
/// so they can be matched back to the user's input.
///
/// [`Config::prepare`]: crate::communicator::config::Config::prepare
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("communicator type {0:?} is invalid")]
    InvalidCommunicator(String),

    #[error("ssh_username must be specified")]
    MissingSshUsername,

    #[error("winrm_username must be specified")]
    MissingWinRmUsername,

    #[error("{field} is invalid: {source}")]
    KeyFile {
        field: &'static str,
        #[source]
        source: KeyFileError,
    },

    #[error("ssh_bastion_password or ssh_bastion_private_key_file must be specified")]
    MissingBastionCredentials,

    #[error("ssh_file_transfer_method ({0:?}) is invalid, valid methods: sftp, scp")]
    InvalidFileTransferMethod(String),

    #[error("please specify either ssh_bastion_host or ssh_proxy_host, not both; they are mutually exclusive")]
    BastionAndProxy,

    #[error("{field} ({spec:?}) is invalid: {source}")]
    Tunnel {
        field: &'static str,
        spec: String,
        #[source]
        source: TunnelSpecError,
    },
}

/// Failure to turn a configured key path into a usable private key.
///
/// Each stage of the check (expansion, existence, parsing) has its own variant.
#[derive(Debug, Error)]
pub enum KeyFileError {
    #[error("could not expand {path:?}: {reason}")]
    Expand { path: String, reason: String },

    #[error("{path:?} does not exist: {source}")]
    Missing {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("could not read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{path:?} is not a usable private key: {source}")]
    Unparseable {
        path: PathBuf,
        #[source]
        source: KeyParseError,
    },
}

/// Why a blob of key material could not be turned into a signer.
#[derive(Debug, Error)]
pub enum KeyParseError {
    #[error("key is encrypted and no passphrase can be supplied")]
    Encrypted,

    #[error("unrecognised private key format")]
    UnsupportedFormat,

    #[error("{0}")]
    Invalid(String),
}

/// A tunnel argument that does not follow `[bind_address:]port:host:hostport`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TunnelSpecError {
    #[error("expected [bind_address:]port:host:hostport")]
    MissingSeparator,

    #[error("listening port {0:?} must be a valid port")]
    InvalidListenPort(String),

    #[error("forwarding address {0:?} must be a tcp address")]
    InvalidForwardAddress(String),

    #[error("forwarding port {0:?} must be a valid port")]
    InvalidForwardPort(String),
}

/// Fatal failure while collecting credentials or building authentication methods.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("communicator type {kind:?} has no ssh credentials")]
    NotSsh { kind: String },

    #[error("{variable} is not set")]
    AgentSocketUnset { variable: &'static str },

    #[error("cannot connect to SSH agent socket {socket:?}: {source}")]
    AgentConnect {
        socket: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("SSH agent sockets are not supported on this platform")]
    AgentUnsupported,

    #[error(transparent)]
    KeyFile(#[from] KeyFileError),

    #[error("error parsing SSH private key from {source_kind}: {source}")]
    KeyParse {
        source_kind: KeySource,
        #[source]
        source: KeyParseError,
    },

    #[error("{key_type} signer does not support selecting a signature algorithm")]
    UnsupportedSignerKind { key_type: String },

    #[error("{key_type} key cannot produce {algorithm} signatures")]
    UnsupportedAlgorithm { key_type: String, algorithm: String },

    #[error("signing failed: {0}")]
    Signing(String),
}

/// Failure answering a russh sign request during public key authentication.
#[derive(Debug, Error)]
pub enum SignRequestError {
    #[error(transparent)]
    Send(#[from] russh::SendError),

    #[error(transparent)]
    Credential(#[from] CredentialError),
}
