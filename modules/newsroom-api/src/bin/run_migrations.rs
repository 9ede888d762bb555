//! Runs pending SQLx migrations against the database. Used as a deploy-time
//! step before starting `newsroom-api`.
use sqlx::postgres::PgPoolOptions;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    println!("Running database migrations...");

    let pool = PgPoolOptions::new().max_connections(2).connect(&database_url).await?;

    sqlx::migrate!("../../migrations").run(&pool).await?;

    println!("Migrations completed successfully.");

    Ok(())
}
