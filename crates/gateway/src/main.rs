//! API Gateway - HTTP REST API and operator commands.

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gateway_lib::MigrateAction;

#[derive(Parser)]
#[command(name = "gateway")]
#[command(about = "Identity and employer verification gateway")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        #[arg(long, env = "GATEWAY_HOST", default_value = "0.0.0.0")]
        host: String,
        #[arg(long, env = "GATEWAY_PORT", default_value = "3000")]
        port: u16,
    },
    /// Run database migrations
    Migrate {
        #[command(subcommand)]
        action: MigrateCommand,
    },
    /// Create a verified administrator account
    CreateAdmin {
        #[arg(long)]
        email: String,
        #[arg(long, env = "ADMIN_PASSWORD")]
        password: String,
        /// Grant the super administrator role
        #[arg(long = "super")]
        super_admin: bool,
    },
    /// Retry deletes of orphaned identity provider accounts
    Reconcile,
}

#[derive(Subcommand)]
enum MigrateCommand {
    /// Apply all pending migrations
    Up,
    /// Rollback the last migration
    Down,
    /// Show migration status
    Status,
    /// Drop all tables and reapply migrations
    Fresh,
}

impl From<MigrateCommand> for MigrateAction {
    fn from(cmd: MigrateCommand) -> Self {
        match cmd {
            MigrateCommand::Up => MigrateAction::Up,
            MigrateCommand::Down => MigrateAction::Down,
            MigrateCommand::Status => MigrateAction::Status,
            MigrateCommand::Fresh => MigrateAction::Fresh,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { host, port } => {
            gateway_lib::run_server(&host, port).await?;
        }
        Commands::Migrate { action } => {
            gateway_lib::run_migrations(action.into()).await?;
        }
        Commands::CreateAdmin {
            email,
            password,
            super_admin,
        } => {
            let account = gateway_lib::create_admin(&email, &password, super_admin).await?;
            println!("Created {} account {}", account.role, account.email);
        }
        Commands::Reconcile => {
            let report = gateway_lib::reconcile().await?;
            println!(
                "attempted {}, resolved {}, still failing {}",
                report.attempted, report.resolved, report.failed
            );
        }
    }

    Ok(())
}
