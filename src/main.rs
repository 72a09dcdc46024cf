use anyhow::Result;
use clap::Parser;
use forum_blacklist::{
    app::BlacklistApp,
    cli::Cli,
    config,
    infrastructure::{directories, logging, shutdown},
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = config::load_config()?;
    let paths = directories::ensure_directories(&config.directories)?;
    logging::init_tracing(&config, &paths)?;

    let (shutdown, _) = shutdown::Shutdown::new();
    let _signals = shutdown::install_signal_handlers(shutdown.clone());

    let app = BlacklistApp::initialize(config, paths, shutdown).await?;
    app.run(cli.command).await
}
