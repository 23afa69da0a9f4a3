use resqnet_server::migrator;
use sea_orm::Database;
use sea_orm_migration::MigratorTrait;

#[tokio::main]
async fn main() {
    // Load .env if present (dotenvy)
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let Some(database_url) = std::env::var("DATABASE_URL").ok().filter(|v| !v.is_empty()) else {
        tracing::error!("DATABASE_URL must be set to run migrations");
        std::process::exit(1);
    };

    let db = match Database::connect(&database_url).await {
        Ok(db) => db,
        Err(e) => {
            tracing::error!("Failed to connect to database: {}", e);
            std::process::exit(1);
        }
    };

    tracing::info!("Applying migrations...");
    if let Err(e) = migrator::Migrator::up(&db, None).await {
        tracing::error!("Failed to run migrations: {}", e);
        std::process::exit(1);
    }
    tracing::info!("Migrations applied");
}
