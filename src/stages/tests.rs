use super::*;
use crate::config::PoolConfig;
use crate::context::Context;
use crate::database::fakes::RecordingFactory;
use crate::database::{ConnectionFactory, ConnectionPool, SessionPool};
use crate::errors::PipelineError;
use crate::schema::Descriptor;
use crate::security::{Claims, TokenVerifier};
use crate::server::RawRequest;
use http::Method;
use serde_json::json;
use std::sync::{Arc, Mutex};

struct StaticVerifier;

impl TokenVerifier for StaticVerifier {
    fn verify(&self, token: &str) -> Option<Claims> {
        (token == "good").then(|| json!({"sub": "u1"}))
    }
}

struct RejectAll;

impl TokenVerifier for RejectAll {
    fn verify(&self, _token: &str) -> Option<Claims> {
        None
    }
}

fn handler_ok() -> Arc<dyn Handler> {
    Arc::new(|_ctx: &mut Context| -> Result<(), PipelineError> { Ok(()) })
}

fn post(body: serde_json::Value) -> Context {
    Context::new(RawRequest::new(Method::POST, "/users").with_json_body(body))
}

fn pool(factory: &Arc<RecordingFactory>) -> Arc<SessionPool> {
    Arc::new(SessionPool::new(
        Arc::clone(factory) as Arc<dyn ConnectionFactory>,
        &PoolConfig { max_connections: 2 },
    ))
}

fn recorder(name: &'static str, log: &Arc<Mutex<Vec<String>>>) -> Arc<dyn Stage> {
    let log = Arc::clone(log);
    from_fn(name, move |ctx, next| {
        log.lock().unwrap().push(name.to_string());
        next.run(ctx.extend(name, json!(true))?)
    })
}

#[test]
fn test_stages_run_in_declaration_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let handler_log = Arc::clone(&log);
    let handler: Arc<dyn Handler> = Arc::new(move |ctx: &mut Context| -> Result<(), PipelineError> {
        for key in ["a", "b", "c"] {
            assert_eq!(ctx.extension(key), Some(&json!(true)));
        }
        handler_log.lock().unwrap().push("H".to_string());
        Ok(())
    });
    let pipeline = Pipeline::new(
        vec![recorder("a", &log), recorder("b", &log), recorder("c", &log)],
        handler,
    );

    pipeline.execute(post(json!({}))).unwrap();
    assert_eq!(*log.lock().unwrap(), vec!["a", "b", "c", "H"]);
    assert_eq!(pipeline.stage_names(), vec!["a", "b", "c"]);
}

#[test]
fn test_failure_short_circuits() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let failing = from_fn("deny", |_ctx, _next| {
        Err(PipelineError::Forbidden("nope".to_string()))
    });
    let pipeline = Pipeline::new(vec![recorder("a", &log), failing, recorder("c", &log)], handler_ok());

    let err = pipeline.execute(post(json!({}))).unwrap_err();
    assert_eq!(err, PipelineError::Forbidden("nope".to_string()));
    assert_eq!(*log.lock().unwrap(), vec!["a"]);
}

#[test]
fn test_handler_mutates_response() {
    let handler: Arc<dyn Handler> = Arc::new(|ctx: &mut Context| -> Result<(), PipelineError> {
        ctx.response_mut().send_json(201, json!({"ok": true}));
        Ok(())
    });
    let ctx = Pipeline::new(Vec::new(), handler).execute(post(json!({}))).unwrap();
    assert_eq!(ctx.response().status, 201);
}

#[test]
fn test_body_params_sanitize_and_omit_optional() {
    let stage = ParamsStage::body([
        ("email", Descriptor::email()),
        ("age", Descriptor::optional(Descriptor::number())),
    ]);
    let ctx = Pipeline::new(vec![Arc::new(stage)], handler_ok())
        .execute(post(json!({"email": "a@b.com", "role": "admin"})))
        .unwrap();

    let body = ctx.body().unwrap();
    assert_eq!(body.len(), 1);
    assert_eq!(body["email"], "a@b.com");
}

#[test]
fn test_body_params_errors() {
    let stage = ParamsStage::body([
        ("email", Descriptor::email()),
        ("tags", Descriptor::array_of(Descriptor::string())),
    ]);

    let missing = stage.extract(json!({"email": "a@b.com"}).as_object()).unwrap_err();
    assert_eq!(missing, PipelineError::missing_parameter("tags"));

    let invalid = stage
        .extract(json!({"email": "nope", "tags": []}).as_object())
        .unwrap_err();
    assert_eq!(invalid, PipelineError::invalid_parameter_type("email", "Email"));

    let nested = stage
        .extract(json!({"email": "a@b.com", "tags": ["x", 1]}).as_object())
        .unwrap_err();
    assert_eq!(nested, PipelineError::invalid_parameter_type("tags", "Array<String>"));

    // No body at all: every required field is missing.
    assert_eq!(stage.extract(None).unwrap_err(), PipelineError::missing_parameter("email"));
}

#[test]
fn test_null_counts_as_present() {
    let stage = ParamsStage::body([("age", Descriptor::optional(Descriptor::number()))]);
    let err = stage.extract(json!({"age": null}).as_object()).unwrap_err();
    assert_eq!(err, PipelineError::invalid_parameter_type("age", "Number"));
}

#[test]
fn test_unknown_descriptor_is_config_error() {
    let stage = ParamsStage::body([("when", Descriptor::named("Date"))]);
    let err = stage.extract(json!({"when": "2024-01-01"}).as_object()).unwrap_err();
    assert!(matches!(err, PipelineError::ValidationConfig { ref field, .. } if field == "when"));
    assert_eq!(err.status(), 500);
}

#[test]
fn test_query_params_are_coerced() {
    let stage = ParamsStage::query([
        ("limit", Descriptor::number()),
        ("active", Descriptor::optional(Descriptor::boolean())),
        ("id", Descriptor::array_of(Descriptor::uuid())),
    ]);
    let req = RawRequest::new(
        Method::GET,
        "/users?limit=10&active=true&id=123e4567-e89b-12d3-a456-426614174000&extra=1",
    );
    let ctx = Pipeline::new(vec![Arc::new(stage)], handler_ok())
        .execute(Context::new(req))
        .unwrap();

    let query = ctx.ensure_query().unwrap();
    assert_eq!(query["limit"], json!(10));
    assert_eq!(query["active"], json!(true));
    assert_eq!(query["id"], json!(["123e4567-e89b-12d3-a456-426614174000"]));
    assert!(query.get("extra").is_none());
}

#[test]
fn test_auth_stage() {
    let stage: Arc<dyn Stage> = Arc::new(AuthStage::new(Arc::new(StaticVerifier)));
    let pipeline = Pipeline::new(vec![stage], handler_ok());
    let with_header = |value: &str| {
        Context::new(RawRequest::new(Method::GET, "/me").with_header("Authorization", value))
    };

    let ctx = pipeline.execute(with_header("Bearer good")).unwrap();
    assert_eq!(ctx.ensure_token().unwrap()["sub"], "u1");

    assert!(matches!(
        pipeline.execute(with_header("Bearer bad")),
        Err(PipelineError::Unauthenticated(_))
    ));
    assert!(matches!(
        pipeline.execute(with_header("Basic xyz")),
        Err(PipelineError::MalformedCredential(_))
    ));
    assert!(matches!(
        pipeline.execute(Context::new(RawRequest::new(Method::GET, "/me"))),
        Err(PipelineError::Unauthenticated(_))
    ));
}

#[test]
fn test_auth_stage_keeps_prepass_claims() {
    let stage: Arc<dyn Stage> = Arc::new(AuthStage::new(Arc::new(StaticVerifier)));
    let pipeline = Pipeline::new(vec![stage], handler_ok());
    let ctx = Context::new(
        RawRequest::new(Method::GET, "/me").with_header("Authorization", "Bearer good"),
    )
    .with_token(json!({"sub": "from-prepass"}))
    .unwrap();

    let ctx = pipeline.execute(ctx).unwrap();
    assert_eq!(ctx.token().unwrap()["sub"], "from-prepass");
}

#[test]
fn test_auth_stage_verifies_despite_prepass_claims() {
    let stage: Arc<dyn Stage> = Arc::new(AuthStage::new(Arc::new(RejectAll)));
    let pipeline = Pipeline::new(vec![stage], handler_ok());
    let ctx = Context::new(
        RawRequest::new(Method::GET, "/admin").with_header("Authorization", "Bearer good"),
    )
    .with_token(json!({"sub": "from-prepass"}))
    .unwrap();

    assert_eq!(
        pipeline.execute(ctx).unwrap_err(),
        PipelineError::unauthenticated("Invalid or expired token")
    );
}

#[test]
fn test_malformed_credential_stops_downstream() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let factory = RecordingFactory::new(None);
    let pool = pool(&factory);
    let pipeline = Pipeline::new(
        vec![
            Arc::new(AuthStage::new(Arc::new(StaticVerifier))),
            Arc::new(TransactionStage::new(Arc::clone(&pool) as Arc<dyn ConnectionPool>)),
            recorder("after", &log),
        ],
        handler_ok(),
    );
    let ctx = Context::new(RawRequest::new(Method::GET, "/me").with_header("Authorization", "Basic xyz"));

    assert!(matches!(
        pipeline.execute(ctx),
        Err(PipelineError::MalformedCredential(_))
    ));
    assert!(log.lock().unwrap().is_empty());
    assert!(factory.statements().is_empty());
}

#[test]
fn test_transaction_stage_commits() {
    let factory = RecordingFactory::new(None);
    let pool = pool(&factory);
    let handler: Arc<dyn Handler> = Arc::new(|ctx: &mut Context| -> Result<(), PipelineError> {
        ctx.ensure_db()?.query("INSERT INTO users VALUES ($1)", &[json!("u1")])?;
        Ok(())
    });
    let pipeline = Pipeline::new(
        vec![Arc::new(TransactionStage::new(Arc::clone(&pool) as Arc<dyn ConnectionPool>))],
        handler,
    );

    let ctx = pipeline.execute(post(json!({}))).unwrap();
    assert_eq!(
        factory.statements(),
        vec!["0:BEGIN", "0:INSERT INTO users VALUES ($1)", "0:COMMIT"]
    );
    assert_eq!(pool.stats().in_use(), 0);
    // The session handed to the handler is not usable after the stage ends.
    assert!(ctx.db().unwrap().is_released());
}

#[test]
fn test_transaction_stage_rolls_back_inner_failure() {
    let factory = RecordingFactory::new(None);
    let pool = pool(&factory);
    let params = ParamsStage::body([("email", Descriptor::email())]);
    let pipeline = Pipeline::new(
        vec![
            Arc::new(TransactionStage::new(Arc::clone(&pool) as Arc<dyn ConnectionPool>)),
            Arc::new(params),
        ],
        handler_ok(),
    );

    let err = pipeline.execute(post(json!({"email": "bad"}))).unwrap_err();
    assert_eq!(err, PipelineError::invalid_parameter_type("email", "Email"));
    assert_eq!(factory.statements(), vec!["0:BEGIN", "0:ROLLBACK"]);
    let stats = pool.stats();
    assert_eq!(stats.acquired, 1);
    assert_eq!(stats.released, 1);
}

#[test]
fn test_transaction_stage_rollback_failure_keeps_error() {
    let factory = RecordingFactory::new(Some("ROLLBACK"));
    let pool = pool(&factory);
    let handler: Arc<dyn Handler> = Arc::new(|_ctx: &mut Context| -> Result<(), PipelineError> {
        Err(PipelineError::Conflict("Email taken".to_string()))
    });
    let pipeline = Pipeline::new(
        vec![Arc::new(TransactionStage::new(Arc::clone(&pool) as Arc<dyn ConnectionPool>))],
        handler,
    );

    let err = pipeline.execute(post(json!({}))).unwrap_err();
    assert_eq!(err, PipelineError::Conflict("Email taken".to_string()));
    assert_eq!(factory.statements(), vec!["0:BEGIN", "0:ROLLBACK"]);
    assert_eq!(pool.stats().in_use(), 0);
}

#[test]
fn test_nested_transaction_owns_its_connection() {
    let factory = RecordingFactory::new(None);
    let pool = pool(&factory);
    let tx = || -> Arc<dyn Stage> {
        Arc::new(TransactionStage::new(Arc::clone(&pool) as Arc<dyn ConnectionPool>))
    };
    // Runs on the outer session once the inner scope has ended.
    let after_inner = from_fn("after_inner", |ctx, next| {
        let ctx = next.run(ctx)?;
        ctx.ensure_db()?.query("SELECT outer", &[])?;
        Ok(ctx)
    });
    let handler: Arc<dyn Handler> = Arc::new(|ctx: &mut Context| -> Result<(), PipelineError> {
        ctx.ensure_db()?.query("SELECT inner", &[])?;
        Ok(())
    });

    Pipeline::new(vec![tx(), after_inner, tx()], handler)
        .execute(post(json!({})))
        .unwrap();

    assert_eq!(
        factory.statements(),
        vec![
            "0:BEGIN",
            "1:BEGIN",
            "1:SELECT inner",
            "1:COMMIT",
            "0:SELECT outer",
            "0:COMMIT",
        ]
    );
    let stats = pool.stats();
    assert_eq!(stats.acquired, 2);
    assert_eq!(stats.in_use(), 0);
}

#[test]
fn test_nested_failure_rolls_back_both_scopes() {
    let factory = RecordingFactory::new(None);
    let pool = pool(&factory);
    let tx = || -> Arc<dyn Stage> {
        Arc::new(TransactionStage::new(Arc::clone(&pool) as Arc<dyn ConnectionPool>))
    };
    let handler: Arc<dyn Handler> = Arc::new(|_ctx: &mut Context| -> Result<(), PipelineError> {
        Err(PipelineError::internal("inner failed"))
    });

    let err = Pipeline::new(vec![tx(), tx()], handler)
        .execute(post(json!({})))
        .unwrap_err();

    assert_eq!(err, PipelineError::internal("inner failed"));
    assert_eq!(
        factory.statements(),
        vec!["0:BEGIN", "1:BEGIN", "1:ROLLBACK", "0:ROLLBACK"]
    );
    assert_eq!(pool.stats().in_use(), 0);
}
