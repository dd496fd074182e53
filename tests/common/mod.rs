#![allow(dead_code)]

pub mod fake_db {
    use serde_json::{json, Value};
    use stagehand::config::PoolConfig;
    use stagehand::database::{Connection, ConnectionFactory, Row, SessionPool};
    use stagehand::errors::DbError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    type Log = Arc<Mutex<Vec<String>>>;

    struct RecordingConnection {
        log: Log,
    }

    impl Connection for RecordingConnection {
        fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>, DbError> {
            self.log.lock().unwrap().push(sql.to_string());
            let mut row = Row::new();
            row.insert("sql".to_string(), json!(sql));
            row.insert("params".to_string(), Value::Array(params.to_vec()));
            Ok(vec![row])
        }
    }

    /// Records every statement issued on any of its connections.
    #[derive(Default)]
    pub struct RecordingFactory {
        log: Log,
        opened: AtomicUsize,
    }

    impl RecordingFactory {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn statements(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }

        pub fn opened(&self) -> usize {
            self.opened.load(Ordering::SeqCst)
        }
    }

    impl ConnectionFactory for RecordingFactory {
        fn connect(&self) -> Result<Box<dyn Connection>, DbError> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(RecordingConnection {
                log: Arc::clone(&self.log),
            }))
        }
    }

    pub fn pool(factory: &Arc<RecordingFactory>, max_connections: usize) -> Arc<SessionPool> {
        let factory = Arc::clone(factory);
        let factory: Arc<dyn ConnectionFactory> = factory;
        Arc::new(SessionPool::new(factory, &PoolConfig { max_connections }))
    }
}

pub mod tokens {
    use serde_json::{json, Map};
    use stagehand::config::JwtConfig;
    use stagehand::security::JwtKeys;
    use std::sync::Arc;

    pub fn jwt_config() -> JwtConfig {
        JwtConfig {
            access_token_secret: "integration-access".to_string(),
            refresh_token_secret: "integration-refresh".to_string(),
            ..JwtConfig::default()
        }
    }

    pub fn keys() -> Arc<JwtKeys> {
        Arc::new(JwtKeys::new(&jwt_config()))
    }

    pub fn access_token(keys: &JwtKeys, sub: &str) -> String {
        let mut payload = Map::new();
        payload.insert("sub".to_string(), json!(sub));
        keys.generate_access_token(&payload).unwrap()
    }
}

pub mod test_app {
    use super::fake_db::{self, RecordingFactory};
    use super::tokens;
    use stagehand::controller::{Controller, Services};
    use stagehand::database::{ConnectionPool, SessionPool};
    use stagehand::security::{JwtKeys, TokenVerifier};
    use stagehand::App;
    use std::sync::{Arc, Once};

    static MAY_INIT: Once = Once::new();

    /// Configure may coroutines only once per test binary
    pub fn setup_may_runtime() {
        MAY_INIT.call_once(|| {
            may::config().set_stack_size(0x8000);
        });
    }

    pub struct Harness {
        pub app: App,
        pub factory: Arc<RecordingFactory>,
        pub pool: Arc<SessionPool>,
        pub keys: Arc<JwtKeys>,
    }

    /// An app with real HS256 keys and a recording pool, with `controllers` mounted.
    pub fn harness(controllers: &[&dyn Controller]) -> Harness {
        setup_may_runtime();
        let factory = RecordingFactory::new();
        let keys = tokens::keys();
        let pool = fake_db::pool(&factory, 2);
        let verifier: Arc<dyn TokenVerifier> = keys.clone();
        let db: Arc<dyn ConnectionPool> = pool.clone();
        let mut app = App::new(Services::new(verifier, db));
        for controller in controllers {
            app.mount(*controller).unwrap();
        }
        Harness {
            app,
            factory,
            pool,
            keys,
        }
    }
}
