use anyhow::Result;
use clap::Parser;
use tracing::info;

use market_service::{api, db};

#[derive(Parser)]
#[command(name = "market-service")]
struct Args {
    #[arg(long, env = "DATABASE_URL", default_value = "market.db")]
    database_url: String,

    #[arg(long, env = "PORT", default_value = "3001")]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    // Run migrations first
    info!("Running database migrations...");
    db::run_migrations(&args.database_url)?;
    info!("Migrations completed successfully");

    let pool = db::connect(&args.database_url).await?;

    let app_state = api::AppState { pool };
    let app = api::create_router(app_state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", args.port)).await?;

    info!("Market service web server started on port {}", args.port);
    info!(
        "Market service ready to accept HTTP requests at http://0.0.0.0:{}",
        args.port
    );

    axum::serve(listener, app).await?;

    Ok(())
}
