use engine::{LedgerRepository, LedgerStore, TransactionService};
use migration::{Migrator, MigratorTrait};
use settings::Database;

mod settings;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let settings = settings::Settings::new()?;

    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "beanledger={level},engine={level}",
            level = settings.app.level
        ))
        .init();

    let db = connect_database(&settings.database).await?;

    let store = LedgerStore::open(settings.ledger.directory.as_str(), &settings.ledger.main_file)?;
    let repository = LedgerRepository::open(store, TransactionService::new(), db)?;

    for issue in repository.parse_issues() {
        tracing::warn!(%issue, "ledger parse issue");
    }
    tracing::info!(
        directives = repository.directives().len(),
        transactions = repository.find_all().len(),
        accounts = repository.accounts().len(),
        prices = repository.prices().len(),
        issues = repository.parse_issues().len(),
        "ledger loaded"
    );

    Ok(())
}

async fn connect_database(
    config: &Database,
) -> Result<sea_orm::DatabaseConnection, Box<dyn std::error::Error + Send + Sync>> {
    let url = match config {
        Database::Memory => String::from("sqlite::memory:"),
        Database::Sqlite(path) => format!("sqlite:{path}?mode=rwc"),
    };

    let database = sea_orm::Database::connect(url).await?;
    Migrator::up(&database, None).await?;
    Ok(database)
}
