//! Strongbox CLI - inspect repository routing, group resolution and remote aliveness

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod display;
mod error;
mod exit_codes;

#[derive(Parser)]
#[command(name = "strongbox")]
#[command(author = "Strongbox Contributors")]
#[command(version)]
#[command(about = "Routing and resolution for Strongbox artifact repositories", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to <config dir>/strongbox/strongbox.yaml)
    #[arg(short, long, global = true, env = "STRONGBOX_CONFIG")]
    config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Check the configuration for cycles, unknown members and bad patterns
    Validate {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Find which repository serves a path
    Resolve {
        /// Storage id
        storage: String,

        /// Repository id
        repository: String,

        /// Artifact path
        path: String,

        /// Probe remote repositories before resolving
        #[arg(long)]
        probe: bool,

        /// Show the routing decision of each group member
        #[arg(long)]
        explain: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List artifacts visible through a repository
    Search {
        /// Storage id
        storage: String,

        /// Repository id
        repository: String,

        /// Only paths starting with this prefix
        #[arg(long)]
        prefix: Option<String>,

        /// Only paths fully matching this regular expression
        #[arg(long)]
        pattern: Option<String>,

        /// Print only the number of matches
        #[arg(long)]
        count: bool,

        /// Probe remote repositories before searching
        #[arg(long)]
        probe: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show routing rules
    Rules {
        /// Only rules owned by this group repository
        #[arg(long)]
        group: Option<String>,
    },

    /// Probe remote repositories
    Heartbeat {
        /// Probe every remote once and exit
        #[arg(long)]
        once: bool,
    },
}

fn init_tracing(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}

#[tokio::main]
async fn main() {
    // Setup miette for nice error display
    miette::set_panic_hook();

    let cli = Cli::parse();
    init_tracing(cli.debug);

    let config = cli.config.as_deref();
    let result = match cli.command {
        Commands::Validate { json } => commands::validate::run(config, json),

        Commands::Resolve {
            storage,
            repository,
            path,
            probe,
            explain,
            json,
        } => {
            commands::resolve::run(config, &storage, &repository, &path, probe, explain, json)
                .await
        }

        Commands::Search {
            storage,
            repository,
            prefix,
            pattern,
            count,
            probe,
            json,
        } => {
            commands::search::run(
                config,
                &storage,
                &repository,
                prefix.as_deref(),
                pattern.as_deref(),
                count,
                probe,
                json,
            )
            .await
        }

        Commands::Rules { group } => commands::rules::run(config, group.as_deref()),

        Commands::Heartbeat { once } => commands::heartbeat::run(config, once).await,
    };

    match result {
        Ok(()) => std::process::exit(exit_codes::SUCCESS),
        Err(e) => {
            let code = e.exit_code();
            eprintln!("{:?}", miette::Report::new(e));
            std::process::exit(code);
        }
    }
}
