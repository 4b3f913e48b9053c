#![deny(warnings)]
#![deny(clippy::unwrap_used)]

use std::process::ExitCode;

use communicator::communicator::schema::config_schema;
use communicator::communicator::{
    Config, ProcessEnvironment, connect_and_authenticate, resolve_bastion, resolve_ssh,
};
use dotenv::dotenv;
use tracing::{error, info};

const USAGE: &str = "usage: communicator-check <config.json> [--connect]\n       communicator-check --schema\n\n--connect dials the target directly and refuses bastion or proxy configs.";

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        ["--schema"] => {
            println!("{}", serde_json::to_string_pretty(&config_schema())?);
            Ok(ExitCode::SUCCESS)
        }
        [path] => check(path, false).await,
        [path, "--connect"] => check(path, true).await,
        _ => {
            eprintln!("{}", USAGE);
            Ok(ExitCode::from(2))
        }
    }
}

async fn check(path: &str, connect: bool) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let raw = std::fs::read_to_string(path)?;
    let mut config = Config::from_json(&raw)?;

    let errors = config.prepare();
    if !errors.is_empty() {
        for err in &errors {
            eprintln!("* {}", err);
        }
        error!("{} configuration error(s) in {}", errors.len(), path);
        return Ok(ExitCode::FAILURE);
    }

    let Some(ssh) = config.ssh() else {
        info!(
            "{} communicator is valid; nothing to resolve",
            config.communicator.kind()
        );
        return Ok(ExitCode::SUCCESS);
    };

    let env = ProcessEnvironment;
    let state = serde_json::Map::new();

    if let Some(bastion) = resolve_bastion(ssh, &env)? {
        println!(
            "bastion {}: {}",
            bastion.params.address(),
            bastion.method_names().join(", ")
        );
    }

    let resolved = resolve_ssh(&config, &state, &env)?;
    println!(
        "{}@{}: {}",
        resolved.params.user,
        resolved.params.address(),
        resolved.method_names().join(", ")
    );

    if connect {
        if ssh.has_bastion() || ssh.has_proxy() {
            error!("--connect only dials the target directly; bastion and proxy hops are not opened");
            return Ok(ExitCode::FAILURE);
        }
        connect_and_authenticate(resolved).await?;
        println!("authenticated");
    }

    Ok(ExitCode::SUCCESS)
}
