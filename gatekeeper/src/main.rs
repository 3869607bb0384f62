use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use anyhow::{Context, bail};
use args::{Args, Command};
use clap::Parser;
use config::Config;
use server::{ClaimMap, ServeConfig, TokenCodec};

mod args;
mod logger;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    logger::init(&args);

    let config = args.config()?;

    match &args.command {
        None | Some(Command::Serve) => {
            if let Err(e) = server::serve(serve_config(&args, config)).await {
                log::error!("Server failed to start: {e}");
                std::process::exit(1);
            }
        }
        Some(Command::Token { claims, ttl }) => {
            let token = mint_token(&config, claims, *ttl)?;
            println!("{token}");
        }
    }

    Ok(())
}

fn serve_config(args: &Args, config: Config) -> ServeConfig {
    let listen_address = args
        .listen_address
        .or(config.server.listen_address)
        .unwrap_or(SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(127, 0, 0, 1), 8000)));

    ServeConfig { listen_address, config }
}

fn mint_token(config: &Config, claims: &str, ttl: Option<std::time::Duration>) -> anyhow::Result<String> {
    let Some(token_config) = &config.token else {
        bail!("Minting tokens needs a [token] section in the configuration");
    };

    let claims: ClaimMap = serde_json::from_str(claims).context("--claims must be a JSON object")?;
    let codec = TokenCodec::new(token_config)?;

    Ok(codec.encode(&claims, ttl.unwrap_or(codec.ttl()))?)
}
