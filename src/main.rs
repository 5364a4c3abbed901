//! # planet - project kanban boards from the terminal
//!
//! Each project carries a four-column board (Goal, To Do, In Progress, Done).
//! Task changes are applied locally first and synced to the document store in
//! the background; a sync that fails is reported when the command finishes.
//!
//! ## Quick Start
//!
//! ```bash
//! # Launch a project, seeding tasks from a markdown outline
//! planet launch "Mars rover" --category Software --doc plan.md
//!
//! # Show its board
//! planet board "mars rover"
//!
//! # Add, move and inspect tasks
//! planet add "mars rover" "Pick landing site" --priority high --due "in 3d"
//! planet move "mars rover" "pick landing site" in-progress
//! planet deps "mars rover" "build rover"
//!
//! # Talk to the JSON endpoints directly
//! planet request GET "/projects?uid=demo_user"
//! ```
//!
//! Data is stored in `~/.planet/` as one JSON file per collection. Use
//! `--backend memory` for a throwaway session.

use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use planet_board::session::Session;

mod cli;
mod cmd;

use cli::Cli;
use cmd::Commands;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();

    // Completions need no session
    if let Commands::Completions { shell } = &cli.command {
        cmd::cmd_completions(*shell);
        return;
    }

    let config = cli.config();
    let mut session = match Session::login(config, &cli.user, &cli.password) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Login failed: {}", e.user_message());
            std::process::exit(1);
        }
    };

    if let Err(e) = session.refresh().await {
        eprintln!("Failed to load projects: {}", e.user_message());
        tracing::debug!("{}", e);
        std::process::exit(1);
    }

    cmd::run(&mut session, cli.command).await;
    cmd::finish(session).await;
}
