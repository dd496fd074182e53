//! # Database Module
//!
//! Connection pooling, per-request sessions and table access.
//!
//! - [`SessionPool`] hands out connections, parking the requesting coroutine
//!   while all of them are checked out.
//! - [`DbSession`] wraps one checked-out connection for the lifetime of a
//!   transaction; [`Transaction`] guarantees it ends in exactly one `COMMIT` or
//!   `ROLLBACK` and goes back to the pool exactly once.
//! - [`Table`] and [`TableOps`] provide `query`, stored-procedure `call` and
//!   `get`-by-id on top of a session.
//!
//! The driver itself sits behind [`Connection`] / [`ConnectionFactory`], so any
//! synchronous client can be plugged in.

mod pool;
mod session;
mod table;
#[cfg(test)]
pub(crate) mod fakes;
#[cfg(test)]
mod tests;

pub use self::pool::{
    Connection, ConnectionFactory, ConnectionPool, PoolStats, PooledConnection, Row, SessionPool,
};
pub use self::session::{execute_with_db, transaction, DbSession, Transaction};
pub use self::table::{BindTable, Table, TableOps};
