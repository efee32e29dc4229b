//! Billing desk CLI - back-office operations from the terminal.
//!
//! # Usage
//!
//! ```bash
//! # Who am I signed in as, and with which role?
//! desk whoami
//!
//! # Pending subscription requests (add --all for every status)
//! desk requests
//!
//! # Approve a request
//! desk approve 6f1c0d2e-...
//!
//! # Headline figures
//! desk dashboard
//! ```
//!
//! Every command signs in with `DESK_ADMIN_EMAIL` / `DESK_ADMIN_PASSWORD`,
//! prints its result as JSON on stdout and signs out again. Logs go to
//! stderr.

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "desk")]
#[command(author, version, about = "Billing desk back-office tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the signed-in staff member and role
    Whoami,
    /// List subscription requests (pending only by default)
    Requests {
        /// Include approved and rejected requests
        #[arg(long)]
        all: bool,
    },
    /// List customers
    Customers,
    /// List invoices with billed-customer contact
    Invoices,
    /// Approve a pending subscription request
    Approve {
        /// Request id
        id: String,
    },
    /// Show dashboard figures
    Dashboard,
    /// List staff role records (admin only)
    Admins,
}

#[tokio::main]
async fn main() {
    // Initialize tracing; stdout is reserved for command output
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), commands::CommandError> {
    let session = commands::open_session().await?;

    let result = match cli.command {
        Commands::Whoami => commands::identity::whoami(&session),
        Commands::Requests { all } => commands::records::requests(&session, all).await,
        Commands::Customers => commands::records::customers(&session).await,
        Commands::Invoices => commands::records::invoices(&session).await,
        Commands::Approve { id } => commands::approve::approve(&session, id).await,
        Commands::Dashboard => commands::records::dashboard(&session).await,
        Commands::Admins => commands::identity::admins(&session).await,
    };

    // Sign out even when the command failed
    if let Err(e) = session.end().await {
        tracing::warn!(error = %e, "Sign-out failed");
    }
    result
}
