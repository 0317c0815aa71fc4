mod cli;

use clap::Parser;
use cli::{Cli, Commands};
use logkeep::config::Config;
use logkeep::observability::init_tracing;
use logkeep::store::{LogStore, perform_cleanup};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();

    let config = Config::load().map_err(|e| format!("Failed to load config: {}", e))?;
    init_tracing(&config.telemetry.log_filter);

    match cli.command {
        Commands::Serve(args) => logkeep::api::run(config, args.address).await?,
        Commands::Usage => {
            let store = LogStore::open(&config.server.data_path)?;
            let usage = store.usage()?;
            println!("{}", serde_json::to_string_pretty(&usage)?);
        }
        Commands::Cleanup(args) => {
            let policy = args.apply(config.retention.clone()).policy();
            info!(?policy, path = %config.server.data_path.display(), "Running cleanup");

            let store = LogStore::open(&config.server.data_path)?;
            let summary = perform_cleanup(&store, &policy);
            store.persist()?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }

    Ok(())
}
