use anyhow::Result;
use clap::Parser;
use tracing::info;

use broadcast_relay::{
    cli::{Cli, Command},
    client,
    config::RelayConfig,
    listener::Listener,
};

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    match cli.into_command() {
        Command::Serve(args) => {
            let config = RelayConfig::from(args);
            let listener = Listener::bind(&config).await?;
            let addr = listener.local_addr()?;
            info!("relay listening on {}", addr);
            listener.run().await?;
        }
        Command::Client(args) => client::run(args).await?,
    }

    Ok(())
}
