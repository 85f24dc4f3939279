use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use warden_auth::BuildInfo;
use warden_server::cli::{Cli, Command};
use warden_server::{
    MemoryStore, SecretServer, TokenReader, TokenServer, WardenConfig, app, serve, telemetry,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    telemetry::init(cli.verbose, cli.json_logs)
        .map_err(|e| anyhow::anyhow!(e))
        .context("failed to initialize logging")?;

    let build = BuildInfo::new(env!("CARGO_PKG_VERSION"), option_env!("WARDEN_GIT_REVISION"));
    let config = WardenConfig::load(cli.config.as_deref()).context("failed to load configuration")?;

    match cli.command {
        Command::Secret { address } => {
            let address = address.unwrap_or_else(|| config.secret.address.clone());
            let server = SecretServer::from_config(&config.secret).context("failed to load keys")?;
            serve(&address, app(server.router(), build))
                .await
                .with_context(|| format!("key authority on {address} failed"))?;
        }
        Command::Token { address } => {
            let address = address.unwrap_or_else(|| config.token.address.clone());
            let store = Arc::new(
                MemoryStore::from_config(&config.token.store).context("failed to seed user store")?,
            );
            let server =
                TokenServer::from_config(&config.token, store).context("failed to load signing key")?;
            serve(&address, app(server.router(), build))
                .await
                .with_context(|| format!("token issuer on {address} failed"))?;
        }
        Command::Reader { address } => {
            let address = address.unwrap_or_else(|| config.reader.address.clone());
            let (reader, cache) = TokenReader::from_config(&config.reader)
                .await
                .context("failed to build validater cache")?;
            let served = serve(&address, app(reader.router(), build)).await;
            cache.close().await;
            served.with_context(|| format!("token reader on {address} failed"))?;
        }
        Command::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Command::Version => {
            println!("{build}");
        }
    }

    Ok(())
}
