/*!
 * Transaction helpers.
 *
 * `with_transaction` keeps the caller's error type instead of flattening it
 * into `DbErr`, so domain errors survive the rollback.
 */

use sea_orm::{
    ConnectionTrait, DatabaseConnection, DatabaseTransaction, DbBackend, DbErr, Statement,
    TransactionError, TransactionTrait,
};
use std::future::Future;
use std::pin::Pin;
use uuid::Uuid;

/// Type alias for boxed future used in transactions
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Execute a function within a database transaction.
///
/// Commits on `Ok`, rolls back on `Err`.
///
/// ```rust,ignore
/// let released = with_transaction(&db, |txn| {
///     Box::pin(async move {
///         let exception = load_open(txn, id).await?;
///         mark_released(txn, &exception).await?;
///         Ok(exception)
///     })
/// })
/// .await?;
/// ```
pub async fn with_transaction<F, T, E>(db: &DatabaseConnection, f: F) -> Result<T, E>
where
    F: for<'a> FnOnce(&'a DatabaseTransaction) -> BoxFuture<'a, Result<T, E>> + Send,
    T: Send,
    E: std::error::Error + From<DbErr> + Send,
{
    db.transaction::<_, T, E>(f).await.map_err(|e| match e {
        TransactionError::Connection(db_err) => E::from(db_err),
        TransactionError::Transaction(err) => err,
    })
}

/// Serialises writers of one tenant for the rest of the transaction.
///
/// Postgres only; other backends rely on the in-process tenant partitioning.
pub async fn lock_tenant<C>(conn: &C, tenant_id: Uuid) -> Result<(), DbErr>
where
    C: ConnectionTrait,
{
    if conn.get_database_backend() != DbBackend::Postgres {
        return Ok(());
    }
    conn.execute(Statement::from_sql_and_values(
        DbBackend::Postgres,
        "SELECT pg_advisory_xact_lock(hashtext($1))",
        [tenant_id.to_string().into()],
    ))
    .await?;
    Ok(())
}
