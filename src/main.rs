mod api;
mod client;
mod commands;
mod config;
mod domain;
mod error;
mod server;
mod transport;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "realityctl",
    version,
    about = "Control plane for VLESS/Reality proxy hosts and node telemetry"
)]
struct Cli {
    /// Path to config file (default: ~/.config/realityctl/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the control-plane daemon (REST + GraphQL)
    Daemon {
        /// HTTP listen address (overrides config)
        #[arg(long)]
        http_addr: Option<String>,

        /// Log level (overrides config)
        #[arg(long)]
        log_level: Option<String>,
    },

    /// Generate x25519 keypairs for Reality inbounds
    Keygen {
        /// Number of keypairs
        #[arg(long, short = 'n', default_value_t = 1)]
        count: usize,

        /// Output format (table or json)
        #[arg(long, default_value = "table")]
        format: String,

        /// Print the public key for an existing private key instead
        #[arg(long, conflicts_with = "count")]
        from_private: Option<String>,
    },

    /// Work with host definitions
    Host {
        #[command(subcommand)]
        command: HostCommands,
    },

    /// Query a realityctl daemon's REST API
    Query {
        /// Daemon address (defaults to daemon.http_addr from config)
        #[arg(long, global = true)]
        url: Option<String>,

        /// Output format (table or json)
        #[arg(long, global = true, default_value = "table")]
        format: String,

        #[command(subcommand)]
        command: commands::query::QueryCommands,
    },
}

#[derive(Subcommand)]
enum HostCommands {
    /// Validate a host definition and show derived SNI and fingerprint
    Check {
        /// YAML file with one host definition
        file: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Daemon {
            http_addr,
            log_level,
        } => commands::daemon::run(http_addr, log_level, cli.config),
        Commands::Keygen {
            count,
            format,
            from_private,
        } => match from_private {
            Some(key) => commands::keygen::derive(&key),
            None => commands::keygen::run(count, &format),
        },
        Commands::Host { command } => match command {
            HostCommands::Check { file } => commands::host::check(&file, cli.config.as_deref()),
        },
        Commands::Query {
            url,
            format,
            command,
        } => commands::query::run(url.as_deref(), cli.config.as_deref(), &format, &command),
    }
}
