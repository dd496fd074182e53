use may::sync::mpsc;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::PoolConfig;
use crate::errors::DbError;

/// One result row, column name → value.
pub type Row = Map<String, Value>;

/// A live database connection.
///
/// Statements use `$1`-style positional placeholders. Transaction control is
/// plain SQL (`BEGIN`, `COMMIT`, `ROLLBACK`).
pub trait Connection: Send {
    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>, DbError>;
}

/// Opens new connections for a pool.
pub trait ConnectionFactory: Send + Sync {
    fn connect(&self) -> Result<Box<dyn Connection>, DbError>;
}

/// Process-wide source of connections, shared by every request coroutine.
pub trait ConnectionPool: Send + Sync {
    /// Check out a connection, blocking the calling coroutine until one is free.
    fn acquire(&self) -> Result<PooledConnection, DbError>;
}

type ReleaseFn = Box<dyn FnOnce(Box<dyn Connection>) + Send>;

/// A checked-out connection. Dropping it checks the connection back in, once.
pub struct PooledConnection {
    conn: Option<Box<dyn Connection>>,
    on_release: Option<ReleaseFn>,
}

impl PooledConnection {
    /// Wrap a connection with the callback that returns it to its pool.
    pub fn new<F>(conn: Box<dyn Connection>, on_release: F) -> Self
    where
        F: FnOnce(Box<dyn Connection>) + Send + 'static,
    {
        Self {
            conn: Some(conn),
            on_release: Some(Box::new(on_release)),
        }
    }

    /// A connection that belongs to no pool.
    #[must_use]
    pub fn detached(conn: Box<dyn Connection>) -> Self {
        Self {
            conn: Some(conn),
            on_release: None,
        }
    }

    pub fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>, DbError> {
        match self.conn.as_mut() {
            Some(conn) => conn.query(sql, params),
            None => Err(DbError::new("connection already released")),
        }
    }

    /// Return the connection to its pool now instead of at drop.
    pub fn release(mut self) {
        self.checkin();
    }

    fn checkin(&mut self) {
        if let Some(conn) = self.conn.take() {
            if let Some(on_release) = self.on_release.take() {
                on_release(conn);
            }
        }
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        self.checkin();
    }
}

impl fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("released", &self.conn.is_none())
            .finish()
    }
}

/// Snapshot of pool counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Successful checkouts
    pub acquired: usize,
    /// Checkins
    pub released: usize,
    /// Connections opened through the factory
    pub created: usize,
    /// Pool size
    pub max_connections: usize,
}

impl PoolStats {
    /// Connections currently checked out
    #[must_use]
    pub fn in_use(&self) -> usize {
        self.acquired.saturating_sub(self.released)
    }
}

#[derive(Default)]
struct PoolMetrics {
    acquired: AtomicUsize,
    released: AtomicUsize,
    created: AtomicUsize,
}

/// Bounded pool with lazy connection creation.
///
/// Two `may` channels are shared by all request coroutines. `permits` holds
/// one token per connection the pool may hand out; checkout is a `recv`
/// (which parks the coroutine while the pool is exhausted) and checkin sends
/// the token back. `idle` holds opened connections and is drained before a
/// new connection is opened. A connection is never held by two coroutines at
/// once.
pub struct SessionPool {
    factory: Arc<dyn ConnectionFactory>,
    permits_tx: mpsc::Sender<()>,
    permits_rx: Arc<mpsc::Receiver<()>>,
    idle_tx: mpsc::Sender<Box<dyn Connection>>,
    idle_rx: Arc<mpsc::Receiver<Box<dyn Connection>>>,
    metrics: Arc<PoolMetrics>,
    max_connections: usize,
}

impl SessionPool {
    pub fn new(factory: Arc<dyn ConnectionFactory>, config: &PoolConfig) -> Self {
        let max_connections = config.max_connections.max(1);
        let (permits_tx, permits_rx) = mpsc::channel();
        for _ in 0..max_connections {
            // The receiver is alive, so this cannot fail.
            let _ = permits_tx.send(());
        }
        let (idle_tx, idle_rx) = mpsc::channel();
        info!(max_connections, "Connection pool created");
        Self {
            factory,
            permits_tx,
            permits_rx: Arc::new(permits_rx),
            idle_tx,
            idle_rx: Arc::new(idle_rx),
            metrics: Arc::new(PoolMetrics::default()),
            max_connections,
        }
    }

    #[must_use]
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            acquired: self.metrics.acquired.load(Ordering::Relaxed),
            released: self.metrics.released.load(Ordering::Relaxed),
            created: self.metrics.created.load(Ordering::Relaxed),
            max_connections: self.max_connections,
        }
    }
}

impl ConnectionPool for SessionPool {
    fn acquire(&self) -> Result<PooledConnection, DbError> {
        self.permits_rx
            .recv()
            .map_err(|_| DbError::new("connection pool closed"))?;

        let conn = match self.idle_rx.try_recv() {
            Ok(conn) => conn,
            Err(_) => match self.factory.connect() {
                Ok(conn) => {
                    self.metrics.created.fetch_add(1, Ordering::Relaxed);
                    debug!("Opened new pooled connection");
                    conn
                }
                Err(e) => {
                    // Give the permit back so a later checkout can retry.
                    let _ = self.permits_tx.send(());
                    warn!(error = %e, "Failed to open pooled connection");
                    return Err(e);
                }
            },
        };

        self.metrics.acquired.fetch_add(1, Ordering::Relaxed);
        let idle = self.idle_tx.clone();
        let permits = self.permits_tx.clone();
        let metrics = Arc::clone(&self.metrics);
        Ok(PooledConnection::new(conn, move |conn| {
            metrics.released.fetch_add(1, Ordering::Relaxed);
            // Idle first, so the coroutine woken by the permit finds it.
            if idle.send(conn).is_err() || permits.send(()).is_err() {
                debug!("Connection pool dropped before checkin; closing connection");
            }
        }))
    }
}
