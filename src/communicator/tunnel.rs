//! SSH tunnel arguments.
//!
//! Tunnels use the OpenSSH client form `[bind_address:]port:host:hostport`.
//! Preparation only needs to know whether each configured tunnel parses, so the
//! parser sits behind [`TunnelParser`] and callers may plug in their own.

use crate::communicator::error::TunnelSpecError;

const DEFAULT_BIND_ADDRESS: &str = "localhost";

/// Which side of the connection listens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelDirection {
    /// Listen locally, forward through the remote host (`ssh -L`).
    Local,
    /// Listen on the remote host, forward back through the local side (`ssh -R`).
    Remote,
}

/// A parsed tunnel argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelSpec {
    pub direction: TunnelDirection,
    pub listen_addr: String,
    pub forward_addr: String,
}

/// Parses tunnel arguments.
pub trait TunnelParser {
    fn parse(&self, spec: &str, direction: TunnelDirection)
    -> Result<TunnelSpec, TunnelSpecError>;
}

/// Parser for the OpenSSH `-L`/`-R` argument form.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenSshTunnelParser;

impl TunnelParser for OpenSshTunnelParser {
    fn parse(
        &self,
        spec: &str,
        direction: TunnelDirection,
    ) -> Result<TunnelSpec, TunnelSpecError> {
        parse_tunnel_argument(spec, direction)
    }
}

/// Parse `[bind_address:]port:host:hostport`.
///
/// The forwarding host may be a bracketed IPv6 literal. Without a bind address
/// the listener binds to `localhost`.
pub fn parse_tunnel_argument(
    spec: &str,
    direction: TunnelDirection,
) -> Result<TunnelSpec, TunnelSpecError> {
    let (rest, forward_port) = spec
        .rsplit_once(':')
        .ok_or(TunnelSpecError::MissingSeparator)?;
    parse_port(forward_port).ok_or_else(|| TunnelSpecError::InvalidForwardPort(forward_port.to_string()))?;

    let (listen, forward_host) = split_host(rest)?;
    if forward_host.is_empty() || forward_host == "[]" {
        return Err(TunnelSpecError::InvalidForwardAddress(rest.to_string()));
    }

    let (bind, listen_port) = match listen.rsplit_once(':') {
        Some((bind, port)) if !bind.is_empty() => (bind, port),
        Some((_, port)) => (DEFAULT_BIND_ADDRESS, port),
        None => (DEFAULT_BIND_ADDRESS, listen),
    };
    parse_port(listen_port).ok_or_else(|| TunnelSpecError::InvalidListenPort(listen_port.to_string()))?;

    Ok(TunnelSpec {
        direction,
        listen_addr: format!("{}:{}", bind, listen_port),
        forward_addr: format!("{}:{}", forward_host, forward_port),
    })
}

/// Split `listen:host` where `host` may be `[v6]`.
fn split_host(rest: &str) -> Result<(&str, &str), TunnelSpecError> {
    if rest.ends_with(']') {
        let open = rest
            .rfind('[')
            .ok_or_else(|| TunnelSpecError::InvalidForwardAddress(rest.to_string()))?;
        let listen = rest[..open]
            .strip_suffix(':')
            .ok_or(TunnelSpecError::MissingSeparator)?;
        return Ok((listen, &rest[open..]));
    }

    rest.rsplit_once(':').ok_or(TunnelSpecError::MissingSeparator)
}

fn parse_port(port: &str) -> Option<u16> {
    port.parse::<u16>().ok()
}
