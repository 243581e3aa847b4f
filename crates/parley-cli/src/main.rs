//! # parley-cli
//!
//! Command-line interface for Parley.

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use parley_core::Config;

mod commands;
mod output;

/// Application context containing shared state.
pub struct AppContext {
    pub config: Config,
    /// User id for this invocation
    pub user_id: String,
}

/// Parley - conversational sessions with scoped state and event compaction
#[derive(Parser)]
#[command(name = "parley")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// App name (defaults to app.name from config)
    #[arg(short, long, global = true)]
    app: Option<String>,

    /// User id (defaults to app.user_id from config)
    #[arg(short, long, global = true)]
    user: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat interactively with the rule-based agent
    Chat {
        /// Session ID to create or resume
        #[arg(short, long)]
        session: Option<String>,
    },
    /// Run one of the bundled scenarios
    Demo {
        #[command(subcommand)]
        scenario: DemoScenario,
    },
    /// Session management
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Show version information
    Version,
}

#[derive(Subcommand)]
enum DemoScenario {
    /// Four turns with interval 3 / overlap 1, then show the summary event
    Compaction {
        /// Summarize through the generator instead of extractively
        #[arg(long)]
        model_summarizer: bool,
    },
    /// Save user info in one session and read it back from another
    State {
        /// Scope the user info tools write to
        #[arg(long, value_enum, default_value_t = StateScope::User)]
        scope: StateScope,
    },
    /// Call a filtered capability from an in-process tool server
    Capabilities,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum StateScope {
    User,
    Session,
}

#[derive(Subcommand)]
enum SessionAction {
    /// List sessions of the current user
    List {
        /// Maximum sessions to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
    /// Show session events and state
    Show {
        /// Session ID
        id: String,
    },
    /// Delete session
    Delete {
        /// Session ID
        id: String,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Check the configuration for errors and warnings
    Validate,
    /// Show where configuration is read from
    Path,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over the flag
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();

    let mut config = Config::load().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config, using defaults: {}", e);
        Config::default()
    });
    if let Some(app) = cli.app {
        config.app.name = app;
    }
    let user_id = cli.user.unwrap_or_else(|| config.app.user_id.clone());
    let ctx = AppContext { config, user_id };

    match cli.command {
        Commands::Chat { session } => {
            commands::chat::run(&ctx, session).await?;
        }
        Commands::Demo { scenario } => match scenario {
            DemoScenario::Compaction { model_summarizer } => {
                commands::demo::compaction(&ctx, model_summarizer).await?;
            }
            DemoScenario::State { scope } => {
                let scope = match scope {
                    StateScope::User => parley_core::Scope::User,
                    StateScope::Session => parley_core::Scope::Session,
                };
                commands::demo::state(&ctx, scope).await?;
            }
            DemoScenario::Capabilities => {
                commands::demo::capabilities(&ctx).await?;
            }
        },
        Commands::Session { action } => {
            commands::session::handle(action, &ctx).await?;
        }
        Commands::Config { action } => {
            commands::config::handle(action, &ctx)?;
        }
        Commands::Version => {
            println!("parley {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
