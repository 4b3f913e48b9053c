//! Opening an authenticated russh connection from resolved settings.
//!
//! ## Connection Lifecycle
//!
//! 1. **Client Configuration**: keep-alive interval, read/write timeout, and the
//!    optional cipher and host key algorithm overrides from [`ConnectionParams`].
//!
//! 2. **Connection Establishment**: one TCP connection and SSH handshake,
//!    bounded by the configured timeout.
//!
//! 3. **Authentication**: the resolved methods run through an [`AuthChain`] in
//!    their assembled order.
//!
//! There is no retry here. Waiting for SSH to become available is up to the
//! caller.

use std::borrow::Cow;
use std::str::FromStr;
use std::sync::Arc;

use russh::{Preferred, cipher, client, keys};
use tracing::{info, warn};

use crate::communicator::auth::{AuthChain, AuthStrategy};
use crate::communicator::methods::{ConnectionParams, ResolvedSsh};
use crate::communicator::session::SshClientHandler;

/// Keep-alives sent without reply before the connection is dropped.
const KEEPALIVE_MAX: usize = 3;

/// Build russh client configuration from connection parameters.
///
/// Empty cipher or host key algorithm lists keep the russh defaults. Unknown
/// names are an error.
pub fn build_client_config(params: &ConnectionParams) -> Result<Arc<client::Config>, String> {
    let mut preferred = Preferred::default();

    if !params.ciphers.is_empty() {
        let ciphers = params
            .ciphers
            .iter()
            .map(|name| {
                cipher::Name::try_from(name.as_str())
                    .map_err(|_| format!("Unsupported cipher: {}", name))
            })
            .collect::<Result<Vec<_>, _>>()?;
        preferred.cipher = Cow::Owned(ciphers);
    }

    if !params.host_key_algorithms.is_empty() {
        let algorithms = params
            .host_key_algorithms
            .iter()
            .map(|name| {
                keys::Algorithm::from_str(name)
                    .map_err(|e| format!("Unsupported host key algorithm {}: {}", name, e))
            })
            .collect::<Result<Vec<_>, _>>()?;
        preferred.key = Cow::Owned(algorithms);
    }

    Ok(Arc::new(client::Config {
        inactivity_timeout: params.read_write_timeout,
        keepalive_interval: params.keep_alive,
        keepalive_max: KEEPALIVE_MAX,
        preferred,
        ..Default::default()
    }))
}

/// Connect to `resolved.params` and authenticate with `resolved.methods`.
///
/// The handshake must finish within `params.timeout`.
pub async fn connect_and_authenticate(
    resolved: ResolvedSsh,
) -> Result<client::Handle<SshClientHandler>, String> {
    let ResolvedSsh { params, methods } = resolved;

    let config = build_client_config(&params)?;
    let handler = SshClientHandler::new(params.host.clone());

    let connect_future = client::connect(config, (params.host.as_str(), params.port), handler);

    let mut handle = tokio::time::timeout(params.timeout, connect_future)
        .await
        .map_err(|_| format!("Connection timed out after {:?}", params.timeout))?
        .map_err(|e| format!("Failed to connect: {}", e))?;

    let chain = AuthChain::from_methods(methods);
    let success = chain.authenticate(&mut handle, &params.user).await?;

    if !success {
        warn!(
            "No authentication method succeeded for {}@{}",
            params.user,
            params.address()
        );
        return Err("Authentication failed: no authentication methods succeeded".to_string());
    }

    info!("Authenticated to {}@{}", params.user, params.address());
    Ok(handle)
}
