//! In-memory connections for unit tests.

use super::{Connection, ConnectionFactory, Row};
use crate::errors::DbError;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

type Log = Arc<Mutex<Vec<String>>>;

struct RecordingConn {
    id: usize,
    log: Log,
    fail_on: Option<&'static str>,
}

impl Connection for RecordingConn {
    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>, DbError> {
        self.log.lock().unwrap().push(format!("{}:{}", self.id, sql));
        if self.fail_on == Some(sql) {
            return Err(DbError::with_code("40001", "serialization failure"));
        }
        let mut row = Row::new();
        row.insert("sql".to_string(), json!(sql));
        row.insert("params".to_string(), Value::Array(params.to_vec()));
        Ok(vec![row])
    }
}

pub(crate) struct RecordingFactory {
    log: Log,
    opened: AtomicUsize,
    fail_on: Option<&'static str>,
}

impl RecordingFactory {
    pub(crate) fn new(fail_on: Option<&'static str>) -> Arc<Self> {
        Arc::new(Self {
            log: Arc::new(Mutex::new(Vec::new())),
            opened: AtomicUsize::new(0),
            fail_on,
        })
    }

    pub(crate) fn statements(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

impl ConnectionFactory for RecordingFactory {
    fn connect(&self) -> Result<Box<dyn Connection>, DbError> {
        let id = self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(RecordingConn {
            id,
            log: Arc::clone(&self.log),
            fail_on: self.fail_on,
        }))
    }
}

pub(crate) struct RefusingFactory;

impl ConnectionFactory for RefusingFactory {
    fn connect(&self) -> Result<Box<dyn Connection>, DbError> {
        Err(DbError::with_code("08006", "connection refused"))
    }
}
