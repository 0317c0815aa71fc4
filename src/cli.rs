use clap::{Parser, Subcommand};
use logkeep::config::RetentionConfig;
use logkeep::humanize::ByteSize;
use std::net::SocketAddr;

#[derive(Parser, Debug)]
#[command(name = "logkeep")]
#[command(about = "Log capture store with retention", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP server
    Serve(ServeArgs),
    /// Print storage usage of the configured store
    Usage,
    /// Run one retention pass against the configured store
    Cleanup(CleanupArgs),
}

#[derive(clap::Args, Debug)]
pub struct ServeArgs {
    /// Address to bind the HTTP server to (defaults to server.bind_addr)
    #[arg(long)]
    pub address: Option<SocketAddr>,
}

/// Overrides for the `[retention]` section of the configuration
#[derive(clap::Args, Debug, Default)]
pub struct CleanupArgs {
    #[arg(long)]
    pub max_age_days: Option<u32>,
    /// Size limit such as `50MB` or `1GiB`
    #[arg(long)]
    pub max_size: Option<ByteSize>,
    #[arg(long)]
    pub max_entries: Option<u64>,
}

impl CleanupArgs {
    pub fn apply(&self, mut retention: RetentionConfig) -> RetentionConfig {
        if let Some(days) = self.max_age_days {
            retention.max_age_days = Some(days);
        }
        if let Some(size) = self.max_size {
            retention.max_size = Some(size);
        }
        if let Some(entries) = self.max_entries {
            retention.max_entries = Some(entries);
        }
        retention
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cleanup_overrides() {
        let cli = Cli::parse_from([
            "logkeep",
            "cleanup",
            "--max-size",
            "10MB",
            "--max-entries",
            "50",
        ]);
        let Commands::Cleanup(args) = cli.command else {
            panic!("expected cleanup command");
        };

        let retention = args.apply(RetentionConfig::default());
        assert_eq!(retention.max_size, Some(ByteSize::mib(10)));
        assert_eq!(retention.max_entries, Some(50));
        assert_eq!(retention.max_age_days, Some(7));
    }

    #[test]
    fn test_serve_address_is_optional() {
        let cli = Cli::parse_from(["logkeep", "serve"]);
        assert!(matches!(cli.command, Commands::Serve(ServeArgs { address: None })));
    }
}
