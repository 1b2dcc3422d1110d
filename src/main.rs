use std::env;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use log::{error, info};

mod args;
mod auth;
mod backend;
mod card;
mod cardtrack;
mod id;
mod routes;
mod session;
mod time;
mod token;
mod user;
mod validate;

use args::Args;
use backend::Backend;
use cardtrack::CardTrack;
use token::TokenKeys;

#[tokio::main]
async fn main() -> ExitCode {
    pretty_env_logger::formatted_builder()
        .parse_filters(&env::var("RUST_LOG").unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();

    let addr = match args.addr() {
        Ok(addr) => addr,
        Err(e) => {
            error!("invalid address: {e}");
            return ExitCode::FAILURE;
        }
    };

    let Ok(backend) = Backend::new(args.data_dir()).await else {
        error!("couldn't open data in {:?}", args.data_dir());
        return ExitCode::FAILURE;
    };

    let keys = TokenKeys::new(args.jwt_secret(), args.access_ttl(), args.refresh_ttl());
    let sync = Arc::new(CardTrack::new(backend, keys));

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("couldn't listen for ctrl-c: {e}");
        }
        info!("shutting down");
    };

    let server = match warp::serve(routes::routes(sync))
        .try_bind_with_graceful_shutdown(addr, shutdown)
    {
        Ok((addr, server)) => {
            info!("listening on {addr}");
            server
        }
        Err(e) => {
            error!("couldn't bind {addr}: {e}");
            return ExitCode::FAILURE;
        }
    };

    server.await;
    ExitCode::SUCCESS
}
