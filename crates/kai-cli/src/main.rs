//! kai - consolidate developer/assistant conversations into source changes

mod commands;
mod config;
mod review;
mod session;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use session::SessionStore;

/// kai - turn a conversation into applied file changes
#[derive(Parser, Debug)]
#[command(name = "kai")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start a new session and print its id
    New,

    /// Append a message to a session
    Add {
        #[arg(short, long)]
        session: String,
        /// Message role (user, assistant, system)
        #[arg(short, long, default_value = "user")]
        role: String,
        text: String,
    },

    /// List saved sessions
    Sessions,

    /// Print a session's messages
    Show {
        #[arg(short, long)]
        session: String,
    },

    /// Apply everything since the last consolidation to the working tree
    Consolidate {
        #[arg(short, long)]
        session: String,
        /// Project root (default: current directory)
        #[arg(long)]
        root: Option<PathBuf>,
        /// Review diffs before applying
        #[arg(long)]
        review: bool,
        /// Skip the clean working tree check
        #[arg(long)]
        no_precondition: bool,
        /// Commit the applied changes
        #[arg(long)]
        commit: bool,
    },

    /// Apply a unified diff to one file, repairing it if needed
    Patch {
        #[arg(short, long)]
        session: String,
        /// Target file, relative to the root
        file: String,
        /// File containing the diff
        patch_file: PathBuf,
        #[arg(long)]
        root: Option<PathBuf>,
    },

    /// Initialize config file
    InitConfig,
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("kai=debug,kai_consolidate=debug,kai_ai=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let store = SessionStore::new(SessionStore::default_dir());

    match args.command {
        Command::New => commands::new_session(&store),
        Command::Add {
            session,
            role,
            text,
        } => commands::add_message(&store, &session, &role, &text),
        Command::Sessions => commands::list_sessions(&store),
        Command::Show { session } => commands::show_session(&store, &session),
        Command::Consolidate {
            session,
            root,
            review,
            no_precondition,
            commit,
        } => {
            let options = commands::ConsolidateOptions {
                root,
                review,
                no_precondition,
                commit,
            };
            commands::consolidate(&config::Config::load(), &store, &session, &options).await
        }
        Command::Patch {
            session,
            file,
            patch_file,
            root,
        } => {
            commands::patch(&config::Config::load(), &store, &session, &file, &patch_file, root)
                .await
        }
        Command::InitConfig => {
            let path = config::Config::init()?;
            println!("Config file created at: {}", path.display());
            println!("\nExample config:\n{}", config::example_config());
            Ok(())
        }
    }
}
