//! # Repository Module
//!
//! A repository pairs domain logic with the table it works on. Handlers ask the
//! session for one with [`DbSession::repository`], and get back a
//! [`Delegate`]: a single façade that behaves as the repository *and* as its
//! table.
//!
//! ## Lookup Order
//!
//! - Repository methods are reached through `Deref` to the repository.
//! - Table capabilities ([`TableOps`]) are routed through the repository's
//!   hooks. A repository that overrides `get`, `query` or `call` wins; one that
//!   does not falls through to the table.
//! - Table-specific methods are one hop away via [`Delegate::table`].
//!
//! A `Delegate` is a plain value: it is not a future and cannot be awaited.
//!
//! ```rust,ignore
//! struct UserRepository { session: DbSession }
//!
//! impl Repository for UserRepository {
//!     type Table = UsersTable;
//!     fn new(session: &DbSession) -> Self {
//!         Self { session: session.clone() }
//!     }
//! }
//!
//! let users = session.repository::<UserRepository>();
//! users.get("u-1")?;          // falls through to UsersTable
//! users.find_active()?;       // UserRepository's own method
//! users.table().by_email(e)?; // UsersTable-specific method
//! ```

use serde_json::Value;
use std::ops::Deref;

use crate::database::{BindTable, DbSession, Row, Table, TableOps};
use crate::errors::DbError;


/// Domain logic bound to a session and a table type.
pub trait Repository: Sized {
    type Table: BindTable;

    fn new(session: &DbSession) -> Self;

    /// Hook for [`TableOps::query`] on the façade.
    fn query(&self, table: &Self::Table, sql: &str, params: &[Value]) -> Result<Vec<Row>, DbError> {
        table.query(sql, params)
    }

    /// Hook for [`TableOps::call`] on the façade.
    fn call(
        &self,
        table: &Self::Table,
        procedure: &str,
        args: &[(&str, Value)],
    ) -> Result<Vec<Row>, DbError> {
        table.call(procedure, args)
    }

    /// Hook for [`TableOps::get`] on the façade.
    fn get(&self, table: &Self::Table, id: &str) -> Result<Option<Row>, DbError> {
        table.get(id)
    }
}

/// Repository + table façade.
pub struct Delegate<R: Repository> {
    repository: R,
    table: R::Table,
}

impl<R: Repository> Delegate<R> {
    /// Construct the repository and its table over the same session.
    pub fn bind(session: &DbSession) -> Self {
        Self {
            repository: R::new(session),
            table: R::Table::bind(session.clone()),
        }
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    pub fn table(&self) -> &R::Table {
        &self.table
    }
}

impl<R: Repository> Deref for Delegate<R> {
    type Target = R;

    fn deref(&self) -> &R {
        &self.repository
    }
}

impl<R: Repository> TableOps for Delegate<R> {
    fn base(&self) -> &Table {
        self.table.base()
    }

    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, DbError> {
        self.repository.query(&self.table, sql, params)
    }

    fn call(&self, procedure: &str, args: &[(&str, Value)]) -> Result<Vec<Row>, DbError> {
        self.repository.call(&self.table, procedure, args)
    }

    fn get(&self, id: &str) -> Result<Option<Row>, DbError> {
        self.repository.get(&self.table, id)
    }
}
