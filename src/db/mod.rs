pub mod entities;
pub mod schema;
pub mod services;

use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr, RuntimeErr};
use std::time::Duration;

/// Opens the shared connection pool.
pub async fn connect(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    let mut opt = ConnectOptions::new(database_url.to_owned());
    opt.max_connections(10)
        .connect_timeout(Duration::from_secs(10))
        .sqlx_logging(false);
    Database::connect(opt).await
}

/// True when the database rejected the statement because of a unique index.
///
/// The pre-insert existence checks can race with a concurrent request; the
/// loser of that race ends up here.
pub fn is_unique_violation(db_err: &DbErr) -> bool {
    match db_err {
        DbErr::Query(RuntimeErr::SqlxError(sqlx_error_value))
        | DbErr::Exec(RuntimeErr::SqlxError(sqlx_error_value)) => {
            if let sqlx::Error::Database(database_error) = sqlx_error_value {
                return database_error.is_unique_violation();
            }
            false
        }
        _ => false,
    }
}
