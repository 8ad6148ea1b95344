use clap::{Parser, Subcommand};
use confhub::config::AppConfig;
use confhub::domain::{Email, Password, Role};
use confhub::handler::logging::init_logging;
use confhub::repository::sqlx_impl::{
    PgOrderRepository, PgPasswordResetRepository, PgProgramRepository, PgUserRepository,
};
use confhub::services::jwt_service::JwtService;
use confhub::services::naboopay::NabooPayClient;
use confhub::services::order_service::OrderService;
use confhub::services::program_service::ProgramService;
use confhub::services::user_service::{CreateUserRequest, UserService};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

/// Account id recorded as the actor for changes made from the command line.
const CLI_ACTOR_ID: i64 = 0;

#[derive(Parser)]
#[clap(name = "confhub CLI")]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a back-office account. The password must be changed on first login.
    CreateAdmin {
        #[clap(long)]
        email: String,
        #[clap(long)]
        username: String,
        #[clap(long)]
        full_name: String,
        #[clap(long)]
        password: String,
        #[clap(long, default_value = "admin")]
        role: Role,
    },
    SetRole {
        #[clap(long)]
        user_id: i64,
        #[clap(long)]
        role: Role,
    },
    /// Re-read an order's NabooPay transaction and apply its status.
    ReconcileOrder {
        #[clap(long)]
        order: Uuid,
    },
    ListEvents,
    CleanupTokens,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = AppConfig::from_env()?;
    init_logging(config.log_level);

    let pool = PgPool::connect(&config.database_url).await?;

    let user_service = || {
        UserService::new(
            Arc::new(PgUserRepository::new(pool.clone())),
            Arc::new(PgPasswordResetRepository::new(pool.clone())),
            Arc::new(JwtService::new(&config.jwt_secret)),
        )
    };

    match cli.command {
        Commands::CreateAdmin {
            email,
            username,
            full_name,
            password,
            role,
        } => {
            let req = CreateUserRequest {
                email: Email::try_from(email.as_str())?,
                username,
                full_name,
                password: Password::try_from(password.as_str())?,
                role,
            };
            match user_service().create_user(req).await {
                Ok(u) => println!(
                    "Created {} {} (user_id={}, external_id={})",
                    u.role, u.username, u.user_id, u.external_id
                ),
                Err(e) => eprintln!("Error creating user: {}", e),
            }
        }
        Commands::SetRole { user_id, role } => {
            match user_service().set_role(CLI_ACTOR_ID, user_id, role).await {
                Ok(()) => println!("User {} is now {}", user_id, role),
                Err(e) => eprintln!("Error setting role: {}", e),
            }
        }
        Commands::ReconcileOrder { order } => {
            let program_repo = Arc::new(PgProgramRepository::new(pool.clone()));
            let service = OrderService::new(
                Arc::new(PgOrderRepository::new(pool.clone())),
                program_repo,
                Arc::new(NabooPayClient::new(&config.naboopay)?),
                config.public_base_url.clone(),
            );
            match service.reconcile(order).await {
                Ok(outcome) => println!("Order {}: {:?}", order, outcome),
                Err(e) => eprintln!("Reconcile failed: {}", e),
            }
        }
        Commands::ListEvents => {
            let service = ProgramService::new(Arc::new(PgProgramRepository::new(pool.clone())));
            for event in service.list_events(true).await? {
                println!(
                    "{:>4}  {:<32} {}  {}",
                    event.event_id,
                    event.slug,
                    event.starts_at.format("%Y-%m-%d"),
                    if event.is_published { "published" } else { "draft" }
                );
            }
        }
        Commands::CleanupTokens => {
            let removed = user_service().cleanup_expired_tokens().await?;
            println!("Removed {} expired reset tokens", removed);
        }
    }

    Ok(())
}
