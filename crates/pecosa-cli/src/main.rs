mod commands;
mod context;

use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pecosa", version, about = "La Pecosa terminal client")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Where the backend lives and where local state is kept
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Backend base URL
    #[arg(long, env = "PECOSA_BACKEND_URL", default_value = "http://127.0.0.1:3000", global = true)]
    pub backend: String,

    /// Public API key sent as `apikey`
    #[arg(long, env = "PECOSA_ANON_KEY", global = true)]
    pub anon_key: Option<String>,

    /// Directory holding the session and the offline queue
    #[arg(long, env = "PECOSA_DATA_DIR", default_value = ".pecosa", global = true)]
    pub data_dir: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in and keep the session for later commands
    Login {
        username: String,
        #[arg(long, env = "PECOSA_PASSWORD")]
        password: String,
    },
    /// End the session
    Logout,
    /// Session, connectivity and queue overview
    Status,
    /// Follow a table live
    Watch {
        /// Table to follow (orders, products, categories, customers)
        table: String,
        /// Only rows where `column=value`
        #[arg(long)]
        filter: Option<String>,
        /// Sort by this column
        #[arg(long)]
        order_by: Option<String>,
        /// Sort descending
        #[arg(long, requires = "order_by")]
        desc: bool,
        /// Show at most this many rows
        #[arg(long)]
        limit: Option<usize>,
        /// Seconds between polls
        #[arg(long, default_value_t = 2)]
        interval: u64,
    },
    /// Manage changes waiting to be synced
    Queue {
        #[command(subcommand)]
        command: QueueCommands,
    },
    /// Push queued changes now
    Sync,
    /// Watch connectivity and sync automatically on reconnect
    Monitor {
        /// Seconds between health checks
        #[arg(long, default_value_t = 5)]
        interval: u64,
    },
}

#[derive(Subcommand)]
enum QueueCommands {
    /// Queue a change
    Add {
        table: String,
        /// insert, update or delete
        action: String,
        /// Row id (update, delete)
        #[arg(long)]
        id: Option<String>,
        /// Row data as JSON
        #[arg(long)]
        data: Option<String>,
        /// Table version the change was based on
        #[arg(long)]
        base_version: Option<i64>,
    },
    /// List queued changes
    List,
    /// Drop every queued change
    Clear,
}

#[tokio::main]
async fn main() {
    // A missing .env is fine
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let global = cli.global;

    let result = match cli.command {
        Commands::Login { username, password } => commands::session::login(&global, &username, &password).await,
        Commands::Logout => commands::session::logout(&global).await,
        Commands::Status => commands::session::status(&global).await,
        Commands::Watch {
            table,
            filter,
            order_by,
            desc,
            limit,
            interval,
        } => {
            let options = commands::watch::WatchOptions {
                filter,
                order_by,
                desc,
                limit,
                interval,
            };
            commands::watch::run(&global, &table, options).await
        }
        Commands::Queue { command } => match command {
            QueueCommands::Add {
                table,
                action,
                id,
                data,
                base_version,
            } => commands::queue::add(&global, &table, &action, id, data.as_deref(), base_version).await,
            QueueCommands::List => commands::queue::list(&global).await,
            QueueCommands::Clear => commands::queue::clear(&global).await,
        },
        Commands::Sync => commands::sync::run(&global).await,
        Commands::Monitor { interval } => commands::sync::monitor(&global, interval).await,
    };

    if let Err(e) = result {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}
