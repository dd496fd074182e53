use serde_json::Value;
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use super::pool::{ConnectionPool, PooledConnection, Row};
use super::table::BindTable;
use crate::errors::{DbError, PipelineError};
use crate::repository::{Delegate, Repository};

/// One checked-out connection, bound to one transaction.
///
/// Cheap to clone; clones share the connection. Once [`DbSession::release`]
/// has run, every query fails instead of touching a connection that may
/// already belong to another request.
#[derive(Clone)]
pub struct DbSession {
    inner: Arc<Mutex<Option<PooledConnection>>>,
}

impl DbSession {
    #[must_use]
    pub fn new(conn: PooledConnection) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(conn))),
        }
    }

    pub fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, DbError> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| DbError::new("session lock poisoned"))?;
        match guard.as_mut() {
            Some(conn) => conn.query(sql, params),
            None => Err(DbError::new("session already released")),
        }
    }

    pub fn begin(&self) -> Result<(), DbError> {
        self.query("BEGIN", &[]).map(|_| ())
    }

    pub fn commit(&self) -> Result<(), DbError> {
        self.query("COMMIT", &[]).map(|_| ())
    }

    pub fn rollback(&self) -> Result<(), DbError> {
        self.query("ROLLBACK", &[]).map(|_| ())
    }

    /// Return the connection to its pool. Returns `true` only for the call
    /// that actually released it.
    pub fn release(&self) -> bool {
        let conn = match self.inner.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        match conn {
            Some(conn) => {
                conn.release();
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn is_released(&self) -> bool {
        match self.inner.lock() {
            Ok(guard) => guard.is_none(),
            Err(poisoned) => poisoned.into_inner().is_none(),
        }
    }

    /// A table bound to this session.
    #[must_use]
    pub fn table<T: BindTable>(&self) -> T {
        T::bind(self.clone())
    }

    /// A repository façade bound to this session.
    #[must_use]
    pub fn repository<R: Repository>(&self) -> Delegate<R> {
        Delegate::bind(self)
    }
}

impl fmt::Debug for DbSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbSession")
            .field("released", &self.is_released())
            .finish()
    }
}

/// An open transaction over a fresh session.
///
/// Ends exactly one way: [`commit`](Transaction::commit),
/// [`rollback`](Transaction::rollback), or drop. Dropping an unfinished
/// transaction (early return, panic, coroutine cancellation) rolls it back.
/// The connection goes back to the pool in every case.
pub struct Transaction {
    session: DbSession,
    finished: bool,
}

impl Transaction {
    /// Check out a connection (blocking while the pool is exhausted) and `BEGIN`.
    pub fn begin(pool: &dyn ConnectionPool) -> Result<Self, PipelineError> {
        let conn = pool.acquire().map_err(PipelineError::Transaction)?;
        let mut tx = Transaction {
            session: DbSession::new(conn),
            finished: false,
        };
        if let Err(e) = tx.session.begin() {
            tx.finished = true;
            return Err(PipelineError::Transaction(e));
        }
        debug!("Transaction started");
        Ok(tx)
    }

    #[must_use]
    pub fn session(&self) -> &DbSession {
        &self.session
    }

    pub fn commit(mut self) -> Result<(), PipelineError> {
        self.finished = true;
        match self.session.commit() {
            Ok(()) => {
                debug!("Transaction committed");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Commit failed; rolling back");
                if let Err(rollback_err) = self.session.rollback() {
                    warn!(error = %rollback_err, "Rollback after failed commit also failed");
                }
                Err(PipelineError::Transaction(e))
            }
        }
    }

    /// Roll back. Errors are logged, never returned, so they cannot mask the
    /// failure that caused the rollback.
    pub fn rollback(mut self) {
        self.finished = true;
        self.rollback_logged();
    }

    fn rollback_logged(&self) {
        match self.session.rollback() {
            Ok(()) => debug!("Transaction rolled back"),
            Err(e) => warn!(error = %e, "Rollback failed"),
        }
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if !self.finished {
            warn!("Transaction abandoned without commit; rolling back");
            self.rollback_logged();
        }
        self.session.release();
    }
}

/// Run `f` inside a new transaction: commit on `Ok`, roll back on `Err`.
pub fn transaction<T, F>(pool: &dyn ConnectionPool, f: F) -> Result<T, PipelineError>
where
    F: FnOnce(&DbSession) -> Result<T, PipelineError>,
{
    let tx = Transaction::begin(pool)?;
    match f(tx.session()) {
        Ok(value) => {
            tx.commit()?;
            Ok(value)
        }
        Err(e) => {
            tx.rollback();
            Err(e)
        }
    }
}

/// Run `f` on an existing session when there is one, else in a new transaction.
pub fn execute_with_db<T, F>(
    db: Option<&DbSession>,
    pool: &dyn ConnectionPool,
    f: F,
) -> Result<T, PipelineError>
where
    F: FnOnce(&DbSession) -> Result<T, PipelineError>,
{
    match db {
        Some(db) => f(db),
        None => transaction(pool, f),
    }
}
