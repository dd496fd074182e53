use super::fakes::{RecordingFactory, RefusingFactory};
use super::*;
use crate::config::PoolConfig;
use crate::errors::PipelineError;
use serde_json::json;
use std::sync::Arc;

fn pool(factory: &Arc<RecordingFactory>, max: usize) -> SessionPool {
    SessionPool::new(
        Arc::clone(factory) as Arc<dyn ConnectionFactory>,
        &PoolConfig {
            max_connections: max,
        },
    )
}

#[test]
fn test_pool_reuses_connections_lazily() {
    let factory = RecordingFactory::new(None);
    let pool = pool(&factory, 2);
    assert_eq!(pool.stats().created, 0);

    let a = pool.acquire().unwrap();
    drop(a);
    let b = pool.acquire().unwrap();
    drop(b);

    let stats = pool.stats();
    assert_eq!(stats.created, 1);
    assert_eq!(stats.acquired, 2);
    assert_eq!(stats.released, 2);
    assert_eq!(stats.in_use(), 0);
}

#[test]
fn test_pool_prefers_idle_connection() {
    let factory = RecordingFactory::new(None);
    let pool = pool(&factory, 3);
    let first = pool.acquire().unwrap();
    let _second = pool.acquire().unwrap();
    drop(first);

    let mut third = pool.acquire().unwrap();
    third.query("SELECT 1", &[]).unwrap();

    assert_eq!(pool.stats().created, 2);
    assert_eq!(factory.statements(), vec!["0:SELECT 1"]);
}

#[test]
fn test_pool_blocks_when_exhausted() {
    let factory = RecordingFactory::new(None);
    let pool = Arc::new(pool(&factory, 1));
    let held = pool.acquire().unwrap();

    let waiter_pool = Arc::clone(&pool);
    // SAFETY: test coroutine only touches Send + 'static data
    let waiter = unsafe {
        may::coroutine::spawn(move || {
            let conn = waiter_pool.acquire();
            conn.is_ok()
        })
    };

    std::thread::sleep(std::time::Duration::from_millis(20));
    assert_eq!(pool.stats().acquired, 1);
    drop(held);
    assert!(waiter.join().unwrap());
    assert_eq!(pool.stats().created, 1);
    assert_eq!(pool.stats().in_use(), 0);
}

#[test]
fn test_pool_connect_failure_keeps_slot() {
    let pool = SessionPool::new(
        Arc::new(RefusingFactory),
        &PoolConfig { max_connections: 1 },
    );
    let err = pool.acquire().unwrap_err();
    assert_eq!(err.code.as_deref(), Some("08006"));
    // The slot went back, so a second attempt does not block forever.
    assert!(pool.acquire().is_err());
}

#[test]
fn test_session_release_is_idempotent() {
    let factory = RecordingFactory::new(None);
    let pool = pool(&factory, 1);
    let session = DbSession::new(pool.acquire().unwrap());
    let clone = session.clone();

    assert!(session.release());
    assert!(!clone.release());
    assert!(clone.is_released());
    assert_eq!(pool.stats().released, 1);
    assert!(clone.query("SELECT 1", &[]).is_err());
}

#[test]
fn test_transaction_commits_on_success() {
    let factory = RecordingFactory::new(None);
    let pool = pool(&factory, 1);
    let value = transaction(&pool, |db| {
        db.query("INSERT 1", &[])?;
        Ok(42)
    })
    .unwrap();

    assert_eq!(value, 42);
    assert_eq!(factory.statements(), vec!["0:BEGIN", "0:INSERT 1", "0:COMMIT"]);
    assert_eq!(pool.stats().in_use(), 0);
}

#[test]
fn test_transaction_rolls_back_and_keeps_error() {
    let factory = RecordingFactory::new(None);
    let pool = pool(&factory, 1);
    let err = transaction(&pool, |db| -> Result<(), PipelineError> {
        db.query("INSERT 1", &[])?;
        Err(PipelineError::Conflict("Email taken".to_string()))
    })
    .unwrap_err();

    assert_eq!(err, PipelineError::Conflict("Email taken".to_string()));
    assert_eq!(
        factory.statements(),
        vec!["0:BEGIN", "0:INSERT 1", "0:ROLLBACK"]
    );
    assert_eq!(pool.stats().in_use(), 0);
}

#[test]
fn test_rollback_failure_keeps_handler_error() {
    let factory = RecordingFactory::new(Some("ROLLBACK"));
    let pool = pool(&factory, 1);
    let err = transaction(&pool, |_| -> Result<(), PipelineError> {
        Err(PipelineError::Conflict("Email taken".to_string()))
    })
    .unwrap_err();

    assert_eq!(err, PipelineError::Conflict("Email taken".to_string()));
    assert_eq!(factory.statements(), vec!["0:BEGIN", "0:ROLLBACK"]);
    assert_eq!(pool.stats().in_use(), 0);
    // The connection went back despite the failed rollback.
    assert!(pool.acquire().is_ok());
}

#[test]
fn test_transaction_commit_failure_is_transaction_error() {
    let factory = RecordingFactory::new(Some("COMMIT"));
    let pool = pool(&factory, 1);
    let err = transaction(&pool, |_| Ok(())).unwrap_err();

    assert!(matches!(err, PipelineError::Transaction(ref e) if e.code.as_deref() == Some("40001")));
    assert_eq!(
        factory.statements(),
        vec!["0:BEGIN", "0:COMMIT", "0:ROLLBACK"]
    );
    assert_eq!(pool.stats().in_use(), 0);
}

#[test]
fn test_transaction_begin_failure_releases_without_rollback() {
    let factory = RecordingFactory::new(Some("BEGIN"));
    let pool = pool(&factory, 1);
    let err = transaction(&pool, |_| Ok(())).unwrap_err();

    assert!(matches!(err, PipelineError::Transaction(_)));
    assert_eq!(factory.statements(), vec!["0:BEGIN"]);
    assert_eq!(pool.stats().in_use(), 0);
}

#[test]
fn test_transaction_rolls_back_on_panic() {
    let factory = RecordingFactory::new(None);
    let pool = pool(&factory, 1);
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let _ = transaction(&pool, |_| -> Result<(), PipelineError> {
            panic!("handler blew up");
        });
    }));

    assert!(result.is_err());
    assert_eq!(factory.statements(), vec!["0:BEGIN", "0:ROLLBACK"]);
    assert_eq!(pool.stats().in_use(), 0);
}

#[test]
fn test_execute_with_db_joins_existing_session() {
    let factory = RecordingFactory::new(None);
    let pool = pool(&factory, 1);
    transaction(&pool, |outer| {
        execute_with_db(Some(outer), &pool, |inner| {
            inner.query("UPDATE 1", &[])?;
            Ok(())
        })
    })
    .unwrap();

    assert_eq!(
        factory.statements(),
        vec!["0:BEGIN", "0:UPDATE 1", "0:COMMIT"]
    );
    assert_eq!(pool.stats().acquired, 1);
}

#[test]
fn test_execute_with_db_opens_transaction_when_absent() {
    let factory = RecordingFactory::new(None);
    let pool = pool(&factory, 1);
    execute_with_db(None, &pool, |db| {
        db.query("UPDATE 1", &[])?;
        Ok(())
    })
    .unwrap();

    assert_eq!(
        factory.statements(),
        vec!["0:BEGIN", "0:UPDATE 1", "0:COMMIT"]
    );
}

struct Users(Table);

impl TableOps for Users {
    fn base(&self) -> &Table {
        &self.0
    }
}

impl BindTable for Users {
    fn bind(session: DbSession) -> Self {
        Users(Table::new(session, "users"))
    }
}

#[test]
fn test_table_get_and_call_sql() {
    let factory = RecordingFactory::new(None);
    let pool = pool(&factory, 1);
    let session = DbSession::new(pool.acquire().unwrap());
    let users: Users = session.table();

    let row = users.get("u-1").unwrap().unwrap();
    assert_eq!(row["sql"], "SELECT * FROM \"users\" WHERE \"id\" = $1");
    assert_eq!(row["params"], json!(["u-1"]));

    let rows = users
        .call("create_user", &[("email", json!("a@b.co")), ("name", json!("A"))])
        .unwrap();
    assert_eq!(rows[0]["sql"], "SELECT * FROM create_user($1, $2)");
    assert_eq!(rows[0]["params"], json!(["a@b.co", "A"]));
}
