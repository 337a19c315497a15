//! rag-query CLI entry point

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rag_query::{
    commands::{
        cmd_channels, cmd_provision, cmd_query, cmd_stats, print_channels,
        print_provision_outcome, print_query_results, print_stats, QueryOptions,
    },
    config::Config,
    lifecycle::Readiness,
    provision::Provisioner,
    server::{self, Services},
};
use std::path::PathBuf;
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "rag-query")]
#[command(version, about = "Read-only semantic search over a pre-built message index", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, env = "RAG_QUERY_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision the index and run the HTTP service (default)
    Serve,

    /// Download, verify and install the index artifact, then exit
    Provision,

    /// Query the index
    Query {
        /// The search query
        query: String,

        /// Maximum number of results
        #[arg(short, long, default_value = "10")]
        limit: usize,

        /// Filter by channel name
        #[arg(long)]
        channel: Option<String>,

        /// Filter by user name
        #[arg(long)]
        user: Option<String>,

        /// Earliest message date (YYYY-MM-DD)
        #[arg(long)]
        start_date: Option<String>,

        /// Latest message date (YYYY-MM-DD)
        #[arg(long)]
        end_date: Option<String>,

        /// Skip thread previews
        #[arg(long)]
        no_thread: bool,
    },

    /// Show index statistics
    Stats,

    /// List indexed channels by message volume
    Channels {
        /// Maximum number of channels
        #[arg(short, long, default_value = "100")]
        limit: usize,

        /// Only channels whose name contains this text
        #[arg(long)]
        name_contains: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration before logging so the configured level applies
    let config = Config::resolve(cli.config.as_deref());

    let default_level = if cli.verbose {
        "debug"
    } else {
        config
            .as_ref()
            .map(|c| c.server.log_level.as_str())
            .unwrap_or("info")
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let registry = tracing_subscriber::registry().with(filter);
    if cli.log_json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }

    let config = config.context("Failed to load configuration")?;

    let command = cli.command.unwrap_or(Commands::Serve);
    if matches!(command, Commands::Serve) {
        return Ok(server::serve(config).await?);
    }

    let readiness = Readiness::new();

    if matches!(command, Commands::Provision) {
        let outcome = cmd_provision(&config, &readiness)
            .await
            .context("Provisioning failed")?;
        if cli.json {
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        } else {
            print_provision_outcome(&outcome, &config);
        }
        return Ok(());
    }

    // Remaining commands read the index, so make sure it is in place
    Provisioner::new(&config)
        .run(&readiness)
        .await
        .context("Provisioning failed")?;
    let services = Services::open(&config)
        .await
        .context("Failed to open index services")?;

    match command {
        Commands::Serve | Commands::Provision => unreachable!(),

        Commands::Query {
            query,
            limit,
            channel,
            user,
            start_date,
            end_date,
            no_thread,
        } => {
            let options = QueryOptions {
                limit,
                channel,
                user,
                start_date,
                end_date,
                include_thread_context: !no_thread,
            };

            let results = cmd_query(&services.searcher, &query, options).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else {
                print_query_results(&results);
            }
        }

        Commands::Stats => {
            let stats = cmd_stats(&services.stats, &readiness).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                print_stats(&stats);
            }
        }

        Commands::Channels {
            limit,
            name_contains,
        } => {
            let channels = cmd_channels(&services.meta, limit, name_contains.as_deref()).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&channels)?);
            } else {
                print_channels(&channels);
            }
        }
    }

    Ok(())
}
