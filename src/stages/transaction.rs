use std::sync::Arc;
use tracing::debug;

use super::core::{Next, Stage};
use crate::context::Context;
use crate::database::{ConnectionPool, Transaction};
use crate::errors::PipelineError;

/// Runs the rest of the chain inside one database transaction.
///
/// `COMMIT` when the chain succeeds, `ROLLBACK` when it fails, and the
/// connection goes back to the pool either way. Every instance checks out its
/// own connection. Inside an outer transaction stage the inner session shadows
/// the outer one until the inner scope ends.
pub struct TransactionStage {
    pool: Arc<dyn ConnectionPool>,
}

impl TransactionStage {
    pub fn new(pool: Arc<dyn ConnectionPool>) -> Self {
        Self { pool }
    }
}

impl Stage for TransactionStage {
    fn name(&self) -> &'static str {
        "transaction"
    }

    fn run(&self, ctx: Context, next: Next<'_>) -> Result<Context, PipelineError> {
        let tx = Transaction::begin(self.pool.as_ref())?;
        let (ctx, outer) = ctx.replace_db(Some(tx.session().clone()));
        if outer.is_some() {
            debug!("Opening nested transaction");
        }

        match next.run(ctx) {
            Ok(ctx) => {
                tx.commit()?;
                Ok(match outer {
                    Some(outer) => ctx.replace_db(Some(outer)).0,
                    None => ctx,
                })
            }
            Err(e) => {
                tx.rollback();
                Err(e)
            }
        }
    }
}
