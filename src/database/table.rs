use serde_json::Value;
use std::fmt::Write as _;

use super::pool::Row;
use super::session::DbSession;
use crate::errors::DbError;

/// Table access bound to one session.
#[derive(Debug, Clone)]
pub struct Table {
    session: DbSession,
    name: String,
}

impl Table {
    pub fn new(session: DbSession, name: impl Into<String>) -> Self {
        Self {
            session,
            name: name.into(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn session(&self) -> &DbSession {
        &self.session
    }
}

/// The capability interface of a table.
///
/// Implementors only provide [`base`](TableOps::base); the query methods have
/// defaults that run against the base table's session. A table type adds its
/// own methods alongside, and a [`Delegate`](crate::repository::Delegate)
/// re-routes each of these through its repository.
pub trait TableOps {
    fn base(&self) -> &Table;

    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, DbError> {
        self.base().session.query(sql, params)
    }

    /// Call a stored procedure with named arguments, passed positionally in order.
    fn call(&self, procedure: &str, args: &[(&str, Value)]) -> Result<Vec<Row>, DbError> {
        let sql = procedure_sql(procedure, args.len());
        let params: Vec<Value> = args.iter().map(|(_, v)| v.clone()).collect();
        self.query(&sql, &params)
    }

    /// Fetch one row by its `id` column.
    fn get(&self, id: &str) -> Result<Option<Row>, DbError> {
        let sql = format!(
            "SELECT * FROM {} WHERE \"id\" = $1",
            quote_ident(self.base().name())
        );
        let rows = self.query(&sql, &[Value::String(id.to_string())])?;
        Ok(rows.into_iter().next())
    }
}

impl TableOps for Table {
    fn base(&self) -> &Table {
        self
    }
}

/// Table types that can be constructed from a session.
pub trait BindTable: TableOps + Sized {
    fn bind(session: DbSession) -> Self;
}

fn procedure_sql(procedure: &str, arity: usize) -> String {
    let mut sql = format!("SELECT * FROM {procedure}(");
    for i in 1..=arity {
        if i > 1 {
            sql.push_str(", ");
        }
        let _ = write!(sql, "${i}");
    }
    sql.push(')');
    sql
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
