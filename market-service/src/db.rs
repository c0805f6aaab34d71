use anyhow::Result;
use diesel::{Connection, SqliteConnection};
use diesel_async::pooled_connection::bb8::Pool;
use diesel_async::pooled_connection::{AsyncDieselConnectionManager, ManagerConfig};
use diesel_async::sync_connection_wrapper::SyncConnectionWrapper;
use diesel_async::{AsyncConnection, SimpleAsyncConnection};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use futures::FutureExt;

pub type DbConn = SyncConnectionWrapper<SqliteConnection>;
pub type DbPool = Pool<DbConn>;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

// WAL plus a busy timeout makes concurrent write transactions queue on the
// single writer instead of failing on first contention.
const CONNECTION_PRAGMAS: &str = "\
    PRAGMA busy_timeout = 5000; \
    PRAGMA journal_mode = WAL; \
    PRAGMA synchronous = NORMAL; \
    PRAGMA foreign_keys = ON;";

pub fn run_migrations(database_url: &str) -> Result<()> {
    let mut conn = SqliteConnection::establish(database_url)?;
    conn.run_pending_migrations(MIGRATIONS)
        .map_err(|e| anyhow::anyhow!("Migration error: {}", e))?;
    Ok(())
}

pub async fn connect(database_url: &str) -> Result<DbPool> {
    let mut config = ManagerConfig::default();
    config.custom_setup = Box::new(|url: &str| {
        let url = url.to_owned();
        async move {
            let mut conn = DbConn::establish(&url).await?;
            conn.batch_execute(CONNECTION_PRAGMAS)
                .await
                .map_err(diesel::ConnectionError::CouldntSetupConfiguration)?;
            Ok(conn)
        }
        .boxed()
    });

    let manager = AsyncDieselConnectionManager::<DbConn>::new_with_config(database_url, config);
    let pool = Pool::builder().build(manager).await?;
    Ok(pool)
}
